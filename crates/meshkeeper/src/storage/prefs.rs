//! Persistent bookkeeping for the database manager.
//!
//! Stored in its own small `SQLite` file next to the device databases so that
//! it survives switching and eviction.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::{Error, Result};

use super::schema::CREATE_PREFS_TABLE;

/// File name of the preference store inside the data directory.
pub const PREFS_FILE_NAME: &str = "db-manager-prefs.sqlite";

const LAST_USED_PREFIX: &str = "db_last_used:";
const LEGACY_CLEANED_KEY: &str = "legacy_db_cleaned";

/// Key-value preference store.
#[derive(Debug)]
pub struct ManagerPrefs {
    conn: Connection,
}

impl ManagerPrefs {
    /// Open or create the store in `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or store cannot be created.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir).map_err(|source| Error::DirectoryCreate {
            path: data_dir.to_path_buf(),
            source,
        })?;

        let path = data_dir.join(PREFS_FILE_NAME);
        debug!("Opening manager prefs at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;
        conn.execute(CREATE_PREFS_TABLE, [])?;
        Ok(Self { conn })
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        conn.execute(CREATE_PREFS_TABLE, [])?;
        Ok(Self { conn })
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM prefs WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO prefs (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Last time database `name` was made active, epoch milliseconds.
    ///
    /// Unparsable values read as absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn last_used(&self, name: &str) -> Result<Option<i64>> {
        let value = self.get(&format!("{LAST_USED_PREFIX}{name}"))?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    /// Record that database `name` was made active at `timestamp_ms`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn set_last_used(&self, name: &str, timestamp_ms: i64) -> Result<()> {
        self.set(
            &format!("{LAST_USED_PREFIX}{name}"),
            &timestamp_ms.to_string(),
        )
    }

    /// Forget the last-used time of database `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn remove_last_used(&self, name: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM prefs WHERE key = ?1",
            [format!("{LAST_USED_PREFIX}{name}")],
        )?;
        Ok(())
    }

    /// Whether the legacy database has been dealt with.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn legacy_cleaned(&self) -> Result<bool> {
        Ok(self.get(LEGACY_CLEANED_KEY)?.as_deref() == Some("true"))
    }

    /// Mark the legacy database as dealt with.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn set_legacy_cleaned(&self) -> Result<()> {
        self.set(LEGACY_CLEANED_KEY, "true")
    }
}
