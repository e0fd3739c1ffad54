//! Command-line interface for meshkeeper.
//!
//! This module provides the CLI structure for the `meshkeep` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, DbCommand, EncodeCommand, FilterCommand, IngestCommand, SendCommand,
};

/// meshkeep - Message filtering and per-device storage for Meshtastic
///
/// Tests and manages filter words, switches between per-radio node
/// databases and stores incoming messages.
#[derive(Debug, Parser)]
#[command(name = "meshkeep")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for info, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage and test filter words
    #[command(subcommand)]
    Filter(FilterCommand),

    /// Manage per-device databases
    #[command(subcommand)]
    Db(DbCommand),

    /// Filter and store an incoming message
    Ingest(IngestCommand),

    /// Store an outgoing message, homoglyph-encoded if enabled
    Send(SendCommand),

    /// Preview homoglyph encoding
    Encode(EncodeCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        crate::logging::Verbosity::from_flags(self.quiet, self.verbose)
    }
}
