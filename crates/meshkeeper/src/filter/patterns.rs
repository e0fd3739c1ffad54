//! Compilation of filter words into regex patterns.

use regex::{Regex, RegexBuilder};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::FilterConfig;

/// Marker that turns a filter word into a raw regular expression.
pub const REGEX_PREFIX: &str = "regex:";

/// Maximum number of characters of a message that are inspected.
pub const MAX_INSPECTION_CHARS: usize = 10_000;

/// How a filter word is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WordKind {
    /// Escaped and matched as a whole word.
    Literal,
    /// Compiled as a regular expression as-is.
    Regex,
}

impl WordKind {
    /// Split a stored filter word into its kind and the text to compile.
    #[must_use]
    pub fn classify(word: &str) -> (Self, &str) {
        match word.strip_prefix(REGEX_PREFIX) {
            Some(rest) => (Self::Regex, rest),
            None => (Self::Literal, word),
        }
    }
}

impl std::fmt::Display for WordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal => write!(f, "word"),
            Self::Regex => write!(f, "regex"),
        }
    }
}

/// Why a filter word could not be compiled.
#[derive(Debug, Error)]
pub enum PatternError {
    /// The word (or the part after `regex:`) is empty or whitespace.
    #[error("filter word is blank")]
    Blank,

    /// The regular expression is malformed.
    #[error("invalid regex: {0}")]
    Invalid(#[from] regex::Error),
}

/// A single compiled filter word.
#[derive(Debug, Clone)]
pub struct FilterPattern {
    source: String,
    kind: WordKind,
    regex: Regex,
}

impl FilterPattern {
    /// Compile a stored filter word.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::Blank`] for empty words and
    /// [`PatternError::Invalid`] when a `regex:` entry does not compile.
    pub fn compile(word: &str) -> Result<Self, PatternError> {
        let (kind, body) = WordKind::classify(word);
        if body.trim().is_empty() {
            return Err(PatternError::Blank);
        }

        let expression = match kind {
            WordKind::Regex => body.to_string(),
            WordKind::Literal => format!(r"\b{}\b", regex::escape(body)),
        };

        let regex = RegexBuilder::new(&expression)
            .case_insensitive(true)
            .build()?;

        Ok(Self {
            source: word.to_string(),
            kind,
            regex,
        })
    }

    /// The filter word this pattern was compiled from, prefix included.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// How the word was interpreted.
    #[must_use]
    pub fn kind(&self) -> WordKind {
        self.kind
    }

    /// Check whether the pattern matches anywhere in `text`.
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// The compiled form of a filter word set.
///
/// Always built in one go from the full word set; there is no way to patch
/// an existing matcher.
#[derive(Debug, Clone, Default)]
pub struct CompiledMatcher {
    patterns: Vec<FilterPattern>,
}

impl CompiledMatcher {
    /// Compile every word, dropping the ones that fail.
    pub fn build<'a, I>(words: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let patterns = words
            .into_iter()
            .filter_map(|word| match FilterPattern::compile(word) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(word = %word, error = %e, "Dropping filter word");
                    None
                }
            })
            .collect::<Vec<_>>();

        debug!(count = patterns.len(), "Compiled filter patterns");
        Self { patterns }
    }

    /// Number of usable patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether no pattern survived compilation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The compiled patterns, in word-set order.
    #[must_use]
    pub fn patterns(&self) -> &[FilterPattern] {
        &self.patterns
    }

    /// First pattern that matches anywhere in `text`.
    ///
    /// `text` is inspected as given; callers truncate first.
    #[must_use]
    pub fn find_match(&self, text: &str) -> Option<&FilterPattern> {
        self.patterns.iter().find(|p| p.is_match(text))
    }
}

/// Build a fresh matcher from the configured word set.
#[must_use]
pub fn rebuild_patterns(config: &FilterConfig) -> CompiledMatcher {
    CompiledMatcher::build(config.words.iter().map(String::as_str))
}

/// Cut `text` down to the first [`MAX_INSPECTION_CHARS`] characters.
#[must_use]
pub fn truncate_for_inspection(text: &str) -> &str {
    match text.char_indices().nth(MAX_INSPECTION_CHARS) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
