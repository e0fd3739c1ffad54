//! CLI command definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Filter word management and testing.
#[derive(Debug, Subcommand)]
pub enum FilterCommand {
    /// Check whether a message would be hidden
    Check {
        /// The message text
        message: String,

        /// Conversation the message arrives in
        #[arg(long, value_name = "KEY")]
        contact: Option<String>,
    },

    /// List filter words and settings
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Add a filter word
    Add {
        /// Word or regular expression
        word: String,

        /// Treat the word as a regular expression
        #[arg(short, long)]
        regex: bool,
    },

    /// Remove a filter word
    Remove {
        /// Word to remove, with or without the `regex:` prefix
        word: String,
    },

    /// Switch a word between literal and regular expression
    ToggleRegex {
        /// Word to convert
        word: String,
    },

    /// Turn filtering on
    Enable,

    /// Turn filtering off
    Disable,

    /// Turn filtering off for one conversation
    Exempt {
        /// Conversation contact key
        key: String,
    },

    /// Turn filtering back on for one conversation
    Unexempt {
        /// Conversation contact key
        key: String,
    },
}

impl FilterCommand {
    /// Whether the command changes the configuration file.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::Check { .. } | Self::List { .. })
    }
}

/// Device database commands.
#[derive(Debug, Subcommand)]
pub enum DbCommand {
    /// Activate the database for a radio address
    Switch {
        /// Radio address; omit for the default database
        address: Option<String>,
    },

    /// List database files
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the newest messages of a conversation
    Messages {
        /// Radio address; omit for the default database
        #[arg(short, long, value_name = "ADDR")]
        device: Option<String>,

        /// Conversation contact key
        #[arg(long, value_name = "KEY", default_value = "0^all")]
        contact: String,

        /// Maximum number of messages
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,

        /// Include messages hidden by the filter
        #[arg(short, long)]
        all: bool,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Store an incoming message in the device database.
#[derive(Debug, Args)]
pub struct IngestCommand {
    /// Address of the radio that received the message
    #[arg(short, long, value_name = "ADDR")]
    pub device: Option<String>,

    /// Conversation contact key
    #[arg(long, value_name = "KEY", default_value = "0^all")]
    pub contact: String,

    /// Sender id
    #[arg(short, long, value_name = "NAME", default_value = "unknown")]
    pub from: String,

    /// The message text
    pub message: String,
}

/// Store an outgoing message in the device database.
#[derive(Debug, Args)]
pub struct SendCommand {
    /// Address of the radio sending the message
    #[arg(short, long, value_name = "ADDR")]
    pub device: Option<String>,

    /// Conversation contact key
    #[arg(long, value_name = "KEY", default_value = "0^all")]
    pub contact: String,

    /// The message text
    pub message: String,
}

/// Preview homoglyph encoding of outgoing text.
#[derive(Debug, Args)]
pub struct EncodeCommand {
    /// Text to encode
    pub text: String,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
