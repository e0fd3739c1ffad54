//! Per-device database lifecycle.
//!
//! Every radio the client connects to gets its own node database, named
//! after a short hash of the radio's address. [`DatabaseManager`] opens the
//! database for the selected radio, removes the single database used before
//! per-device storage existed, and keeps the number of per-device databases
//! on disk bounded by deleting the least recently used ones.
//!
//! The legacy and default databases are never counted or evicted.

mod eviction;
mod manager;

pub use eviction::{cleanup_legacy, is_reserved, select_eviction_victims, LegacyCleanup};
pub use manager::{DatabaseInfo, DatabaseManager, SharedDatabase};

/// Prefix shared by all database file names.
pub const DB_PREFIX: &str = "meshtastic_database";

/// The database used before per-device storage.
pub const LEGACY_DB_NAME: &str = DB_PREFIX;

/// The database used while no radio is selected.
pub const DEFAULT_DB_NAME: &str = "meshtastic_database_default";

/// Hex characters of the address hash kept in a database name.
const HASH_LEN: usize = 10;

/// Canonical form of a radio address: upper case, colons removed.
#[must_use]
pub fn normalize_address(address: &str) -> String {
    address.trim().to_uppercase().replace(':', "")
}

/// Database name for `address`, or the default name when there is none.
#[must_use]
pub fn build_db_name(address: Option<&str>) -> String {
    match address.map(str::trim).filter(|a| !a.is_empty()) {
        None => DEFAULT_DB_NAME.to_string(),
        Some(address) => {
            let hash = blake3::hash(normalize_address(address).as_bytes()).to_hex();
            format!("{DB_PREFIX}_{}", &hash.as_str()[..HASH_LEN])
        }
    }
}

/// Address safe for logs: first and last two characters.
#[must_use]
pub fn anonymize_address(address: Option<&str>) -> String {
    let Some(address) = address else {
        return "none".to_string();
    };
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 4 {
        return "…".to_string();
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}…{tail}")
}

/// Database name safe for logs. Reserved names are shown in full.
#[must_use]
pub fn anonymize_db_name(name: &str) -> String {
    if is_reserved(name) {
        return name.to_string();
    }
    let keep = DB_PREFIX.len() + 1 + 3;
    match name.char_indices().nth(keep) {
        Some((idx, _)) => format!("{}…", &name[..idx]),
        None => name.to_string(),
    }
}
