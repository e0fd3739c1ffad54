//! The message filter: current matcher plus the global and per-conversation
//! switches.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use super::patterns::{rebuild_patterns, truncate_for_inspection, CompiledMatcher};
use crate::config::FilterConfig;

/// Why a message was not checked against the patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Filtering is switched off globally.
    Disabled,
    /// No usable filter words.
    NoPatterns,
    /// Filtering is switched off for this conversation.
    ConversationExempt,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "filtering is disabled"),
            Self::NoPatterns => write!(f, "no filter words"),
            Self::ConversationExempt => write!(f, "conversation is exempt"),
        }
    }
}

/// Result of checking one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Checked, nothing matched.
    Passed,
    /// Not checked at all.
    Skipped(SkipReason),
    /// A filter word matched; the message should be hidden.
    Filtered {
        /// The filter word that matched, `regex:` prefix included.
        word: String,
    },
}

impl FilterOutcome {
    /// Whether the message should be hidden.
    #[must_use]
    pub fn is_filtered(&self) -> bool {
        matches!(self, Self::Filtered { .. })
    }
}

/// Everything a filter decision reads. Never mutated after construction.
#[derive(Debug, Default)]
struct Snapshot {
    enabled: bool,
    matcher: CompiledMatcher,
    exempt: BTreeSet<String>,
}

/// Shared message filter.
///
/// [`rebuild`](Self::rebuild) compiles a new snapshot off to the side and
/// swaps it in with a single assignment, so readers see either the old or
/// the new word set, never a mix. Readers only hold the lock long enough to
/// clone an `Arc`.
#[derive(Debug, Default)]
pub struct MessageFilter {
    current: RwLock<Arc<Snapshot>>,
}

impl MessageFilter {
    /// A disabled filter with no words.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A filter compiled from `config`.
    #[must_use]
    pub fn from_config(config: &FilterConfig) -> Self {
        let filter = Self::new();
        filter.rebuild(config);
        filter
    }

    /// Recompile from `config` and replace the current snapshot.
    ///
    /// Must be called after every change to the filter configuration.
    pub fn rebuild(&self, config: &FilterConfig) {
        let snapshot = Arc::new(Snapshot {
            enabled: config.enabled,
            matcher: rebuild_patterns(config),
            exempt: config.disabled_conversations.clone(),
        });
        *self.current.write() = snapshot;
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    /// Whether filtering is globally enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.snapshot().enabled
    }

    /// Number of usable compiled patterns.
    #[must_use]
    pub fn pattern_count(&self) -> usize {
        self.snapshot().matcher.len()
    }

    /// Whether `contact_key` has filtering switched off.
    #[must_use]
    pub fn is_exempt(&self, contact_key: &str) -> bool {
        self.snapshot().exempt.contains(contact_key)
    }

    /// Check a message and explain the decision.
    #[must_use]
    pub fn check(&self, message: &str, conversation_disabled: bool) -> FilterOutcome {
        let snapshot = self.snapshot();

        if !snapshot.enabled {
            return FilterOutcome::Skipped(SkipReason::Disabled);
        }
        if snapshot.matcher.is_empty() {
            return FilterOutcome::Skipped(SkipReason::NoPatterns);
        }
        if conversation_disabled {
            return FilterOutcome::Skipped(SkipReason::ConversationExempt);
        }

        let text = truncate_for_inspection(message);
        match snapshot.matcher.find_match(text) {
            Some(pattern) => {
                trace!(word = %pattern.source(), "Message matched filter word");
                FilterOutcome::Filtered {
                    word: pattern.source().to_string(),
                }
            }
            None => FilterOutcome::Passed,
        }
    }

    /// Whether `message` should be hidden.
    #[must_use]
    pub fn should_filter(&self, message: &str, conversation_disabled: bool) -> bool {
        self.check(message, conversation_disabled).is_filtered()
    }

    /// Like [`check`](Self::check), resolving the per-conversation override
    /// from the configured exempt contacts.
    #[must_use]
    pub fn check_for(&self, message: &str, contact_key: &str) -> FilterOutcome {
        let exempt = self.is_exempt(contact_key);
        self.check(message, exempt)
    }

    /// Whether `message` should be hidden in the conversation `contact_key`.
    #[must_use]
    pub fn should_filter_for(&self, message: &str, contact_key: &str) -> bool {
        self.check_for(message, contact_key).is_filtered()
    }
}
