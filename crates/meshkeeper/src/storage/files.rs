//! File system access for device databases.

use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::trace;

/// Suffixes of the files `SQLite` keeps next to a database.
pub const SIDECAR_SUFFIXES: &[&str] = &["-wal", "-shm", "-journal"];

/// The file operations the database manager needs.
pub trait DatabaseFiles: Debug + Send + Sync {
    /// Path of the main file for database `name`.
    fn path_for(&self, name: &str) -> PathBuf;

    /// Names of existing databases starting with `prefix`, sidecars
    /// excluded, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    fn list_database_names(&self, prefix: &str) -> io::Result<Vec<String>>;

    /// Whether the main file for `name` exists.
    fn exists(&self, name: &str) -> bool;

    /// Delete the database and its sidecars. Returns whether the main file
    /// existed.
    ///
    /// # Errors
    ///
    /// Returns the first error other than "not found".
    fn delete_database(&self, name: &str) -> io::Result<bool>;

    /// Modification time of the main file in epoch milliseconds.
    fn last_modified_ms(&self, name: &str) -> Option<i64>;
}

/// Databases stored as plain files in one directory.
#[derive(Debug, Clone)]
pub struct DatabaseDir {
    root: PathBuf,
}

impl DatabaseDir {
    /// Use `root` as the database directory. Nothing is created until a
    /// database is opened.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The database directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn is_sidecar(name: &str) -> bool {
    SIDECAR_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

fn remove_if_present(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

impl DatabaseFiles for DatabaseDir {
    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn list_database_names(&self, prefix: &str) -> io::Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with(prefix) && !is_sidecar(&name) {
                names.push(name);
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn exists(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }

    fn delete_database(&self, name: &str) -> io::Result<bool> {
        let main = self.path_for(name);
        let existed = remove_if_present(&main)?;
        for suffix in SIDECAR_SUFFIXES {
            let sidecar = self.root.join(format!("{name}{suffix}"));
            if remove_if_present(&sidecar)? {
                trace!("Removed {}", sidecar.display());
            }
        }
        Ok(existed)
    }

    fn last_modified_ms(&self, name: &str) -> Option<i64> {
        let modified = std::fs::metadata(self.path_for(name))
            .and_then(|m| m.modified())
            .ok()?;
        Some(DateTime::<Utc>::from(modified).timestamp_millis())
    }
}
