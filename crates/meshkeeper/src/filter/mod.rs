//! Message content filtering.
//!
//! User-configured filter words are compiled into a [`CompiledMatcher`]:
//!
//! - **Literal words** match whole words, case-insensitively. `spam` hides
//!   "this is SPAM" but not "antispam software".
//! - **`regex:` entries** are compiled as case-insensitive regular
//!   expressions and may match anywhere in the message.
//!
//! Entries that fail to compile are logged and dropped; they never stop the
//! remaining entries from working. Matching inspects at most
//! [`MAX_INSPECTION_CHARS`] characters of each message.
//!
//! # Example
//!
//! ```
//! use meshkeeper::config::FilterConfig;
//! use meshkeeper::filter::MessageFilter;
//!
//! let mut config = FilterConfig::default();
//! config.enabled = true;
//! config.add_word("spam", false);
//! config.add_word(r"test\d+", true);
//!
//! let filter = MessageFilter::from_config(&config);
//! assert!(filter.should_filter("this is spam", false));
//! assert!(filter.should_filter("this is test123", false));
//! assert!(!filter.should_filter("antispam software", false));
//!
//! // A per-conversation override wins over the global switch.
//! assert!(!filter.should_filter("this is spam", true));
//! ```

mod engine;
mod patterns;

pub use engine::{FilterOutcome, MessageFilter, SkipReason};
pub use patterns::{
    rebuild_patterns, truncate_for_inspection, CompiledMatcher, FilterPattern, PatternError,
    WordKind, MAX_INSPECTION_CHARS, REGEX_PREFIX,
};
