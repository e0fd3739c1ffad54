//! Homoglyph encoding for outgoing text.
//!
//! Cyrillic letters take two bytes in UTF-8, their Latin look-alikes take one.
//! Swapping them shrinks a message on the radio link without changing how it
//! reads on screen.

use std::borrow::Cow;

/// Latin look-alike for a Cyrillic character, if there is one.
#[must_use]
pub fn latin_lookalike(c: char) -> Option<char> {
    let latin = match c {
        // Lowercase
        'а' => 'a',
        'е' => 'e',
        'о' => 'o',
        'р' => 'p',
        'с' => 'c',
        'у' => 'y',
        'х' => 'x',
        'і' => 'i',
        'ј' => 'j',
        'ѕ' => 's',
        'һ' => 'h',
        'ԁ' => 'd',
        'ԛ' => 'q',
        'ԝ' => 'w',
        'ӏ' => 'l',
        // Uppercase
        'А' => 'A',
        'В' => 'B',
        'Е' => 'E',
        'К' => 'K',
        'М' => 'M',
        'Н' => 'H',
        'О' => 'O',
        'Р' => 'P',
        'С' => 'C',
        'Т' => 'T',
        'Х' => 'X',
        'У' => 'Y',
        'І' => 'I',
        'Ј' => 'J',
        'Ѕ' => 'S',
        'Ԛ' => 'Q',
        'Ԝ' => 'W',
        _ => return None,
    };
    Some(latin)
}

/// Replace every Cyrillic character that has a Latin look-alike.
///
/// Returns the input unchanged (borrowed) when there is nothing to replace.
#[must_use]
pub fn encode(text: &str) -> Cow<'_, str> {
    if !text.chars().any(|c| latin_lookalike(c).is_some()) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.chars()
            .map(|c| latin_lookalike(c).unwrap_or(c))
            .collect(),
    )
}

/// Number of UTF-8 bytes [`encode`] saves on `text`.
#[must_use]
pub fn byte_savings(text: &str) -> usize {
    text.len() - encode(text).len()
}

/// Apply [`encode`] only when the setting is on.
#[must_use]
pub fn encode_if(enabled: bool, text: &str) -> Cow<'_, str> {
    if enabled {
        encode(text)
    } else {
        Cow::Borrowed(text)
    }
}
