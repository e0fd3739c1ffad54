//! Configuration management for meshkeeper.
//!
//! Loaded with figment from defaults, a TOML file and environment variables.
//! Mutating CLI commands write the file back with [`Config::save_to`].

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::filter::{FilterPattern, PatternError, WordKind, REGEX_PREFIX};
use crate::homoglyph;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "meshkeeper";

/// Default number of per-device databases kept on disk.
pub const DEFAULT_CACHE_LIMIT: usize = 3;

/// Smallest accepted cache limit.
pub const MIN_CACHE_LIMIT: usize = 1;

/// Largest accepted cache limit.
pub const MAX_CACHE_LIMIT: usize = 10;

/// Application configuration.
///
/// Sources, highest precedence first:
/// 1. Environment variables prefixed with `MESHKEEPER_`, with `__` between
///    section and key (`MESHKEEPER_STORAGE__CACHE_LIMIT=5`)
/// 2. TOML config file at `~/.config/meshkeeper/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device database storage.
    pub storage: StorageConfig,
    /// Message filter.
    pub filter: FilterConfig,
    /// Outgoing message handling.
    pub messages: MessagesConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the device databases.
    /// Defaults to `~/.local/share/meshkeeper`
    pub data_dir: Option<PathBuf>,
    /// How many per-device databases to keep before evicting the least
    /// recently used ones.
    pub cache_limit: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            cache_limit: DEFAULT_CACHE_LIMIT,
        }
    }
}

/// Message filter configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Global on/off switch.
    pub enabled: bool,
    /// Filter words. Entries starting with `regex:` are regular expressions.
    pub words: BTreeSet<String>,
    /// Contact keys for which filtering is switched off.
    pub disabled_conversations: BTreeSet<String>,
}

impl FilterConfig {
    /// Add a filter word, trimmed. Returns `false` for blank or duplicate
    /// input.
    pub fn add_word(&mut self, word: &str, as_regex: bool) -> bool {
        let word = word.trim();
        if word.is_empty() {
            return false;
        }
        let stored = if as_regex && !word.starts_with(REGEX_PREFIX) {
            format!("{REGEX_PREFIX}{word}")
        } else {
            word.to_string()
        };
        self.words.insert(stored)
    }

    /// Remove a filter word. `word` may be the stored form or the bare
    /// pattern of a `regex:` entry.
    pub fn remove_word(&mut self, word: &str) -> bool {
        self.words.remove(word) || self.words.remove(&format!("{REGEX_PREFIX}{word}"))
    }

    /// Flip a word between literal and regex. Returns the new stored form,
    /// or `None` if the word is not configured.
    pub fn toggle_regex(&mut self, word: &str) -> Option<String> {
        let stored = if self.words.contains(word) {
            word.to_string()
        } else {
            let prefixed = format!("{REGEX_PREFIX}{word}");
            if !self.words.contains(&prefixed) {
                return None;
            }
            prefixed
        };

        self.words.remove(&stored);
        let toggled = match WordKind::classify(&stored) {
            (WordKind::Regex, body) => body.to_string(),
            (WordKind::Literal, body) => format!("{REGEX_PREFIX}{body}"),
        };
        self.words.insert(toggled.clone());
        Some(toggled)
    }

    /// Switch filtering off for a conversation.
    pub fn exempt(&mut self, contact_key: &str) -> bool {
        self.disabled_conversations.insert(contact_key.to_string())
    }

    /// Switch filtering back on for a conversation.
    pub fn unexempt(&mut self, contact_key: &str) -> bool {
        self.disabled_conversations.remove(contact_key)
    }

    /// Words that will be dropped at compile time, with the reason.
    #[must_use]
    pub fn invalid_words(&self) -> Vec<(String, PatternError)> {
        self.words
            .iter()
            .filter_map(|w| FilterPattern::compile(w).err().map(|e| (w.clone(), e)))
            .collect()
    }
}

/// Outgoing message configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagesConfig {
    /// Replace Cyrillic characters with Latin look-alikes before sending.
    pub homoglyph_encoding: bool,
}

impl MessagesConfig {
    /// Text as it goes out on the radio.
    #[must_use]
    pub fn prepare_outgoing<'a>(&self, text: &'a str) -> Cow<'a, str> {
        homoglyph::encode_if(self.homoglyph_encoding, text)
    }
}

impl Config {
    /// Load configuration from the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);
        debug!("Loading configuration from {}", config_file.display());

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("MESHKEEPER_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let body = toml::to_string_pretty(self).map_err(|e| Error::ConfigSave {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        std::fs::write(path, body).map_err(|e| Error::ConfigSave {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// Filter words that fail to compile are only warned about; the filter
    /// drops them at runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache limit is out of range.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_CACHE_LIMIT..=MAX_CACHE_LIMIT).contains(&self.storage.cache_limit) {
            return Err(Error::config_validation(format!(
                "cache_limit must be between {MIN_CACHE_LIMIT} and {MAX_CACHE_LIMIT}, got {}",
                self.storage.cache_limit
            )));
        }

        for (word, err) in self.filter.invalid_words() {
            warn!(word = %word, error = %err, "Filter word will be ignored");
        }

        Ok(())
    }

    /// Get the data directory, resolving the default if not set.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }
}
