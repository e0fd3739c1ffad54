//! `meshkeeper` - message filtering and per-device storage for Meshtastic
//! clients.
//!
//! The library has two independent halves. The [`filter`] module decides
//! whether an incoming text message should be hidden, based on a list of
//! user-defined words and regular expressions. The [`database`] module keeps
//! one node database per connected radio and bounds how many of them stay on
//! disk.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod homoglyph;
pub mod logging;
pub mod storage;

pub use config::Config;
pub use database::DatabaseManager;
pub use error::{Error, Result};
pub use filter::{FilterOutcome, MessageFilter};
pub use logging::init_logging;
pub use storage::NodeDatabase;
