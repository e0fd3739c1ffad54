//! Eviction selection and legacy cleanup.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::storage::{DatabaseFiles, ManagerPrefs};

use super::{DEFAULT_DB_NAME, LEGACY_DB_NAME};

/// Whether `name` is excluded from capacity accounting.
#[must_use]
pub fn is_reserved(name: &str) -> bool {
    name == LEGACY_DB_NAME || name == DEFAULT_DB_NAME
}

/// Pick the databases to delete so that at most `limit` per-device databases
/// remain, oldest first.
///
/// Reserved names are ignored and `active` is never chosen. Names missing
/// from `last_used` count as never used. Equal timestamps keep input order.
#[must_use]
pub fn select_eviction_victims(
    all_names: &[String],
    active: &str,
    limit: usize,
    last_used: &HashMap<String, i64>,
) -> Vec<String> {
    let counted: Vec<&String> = all_names.iter().filter(|n| !is_reserved(n)).collect();
    if counted.len() <= limit {
        return Vec::new();
    }
    let excess = counted.len() - limit;

    let mut candidates: Vec<&String> = counted.into_iter().filter(|n| *n != active).collect();
    candidates.sort_by_key(|n| last_used.get(*n).copied().unwrap_or(0));

    candidates.into_iter().take(excess).cloned().collect()
}

/// Result of a legacy cleanup attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyCleanup {
    /// Cleanup already ran on an earlier switch.
    AlreadyDone,
    /// No legacy database was present.
    NothingToClean,
    /// The legacy database was deleted.
    Deleted,
}

/// Delete the legacy database once per installation.
///
/// The persisted flag is set after a successful deletion or when there is
/// nothing to delete. On failure it stays unset so a later call retries.
/// `prefs` is only locked to read and write the flag, never across the
/// file deletion.
///
/// # Errors
///
/// Returns an error if the flag store fails or the file cannot be deleted.
pub fn cleanup_legacy(
    files: &dyn DatabaseFiles,
    prefs: &Mutex<ManagerPrefs>,
) -> Result<LegacyCleanup> {
    if prefs.lock().legacy_cleaned()? {
        return Ok(LegacyCleanup::AlreadyDone);
    }

    if !files.exists(LEGACY_DB_NAME) {
        debug!("No legacy database present");
        prefs.lock().set_legacy_cleaned()?;
        return Ok(LegacyCleanup::NothingToClean);
    }

    files
        .delete_database(LEGACY_DB_NAME)
        .map_err(|source| Error::DatabaseDelete {
            name: LEGACY_DB_NAME.to_string(),
            source,
        })?;
    prefs.lock().set_legacy_cleaned()?;
    info!("Removed legacy database");
    Ok(LegacyCleanup::Deleted)
}
