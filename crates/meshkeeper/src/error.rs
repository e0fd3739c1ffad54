//! Error types for meshkeeper.
//!
//! Filter compilation problems never show up here: a bad filter word is
//! logged and dropped where it is compiled. These variants cover storage,
//! configuration and background housekeeping.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by meshkeeper operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- device databases ---
    /// A node database or the preference store could not be opened.
    #[error("cannot open database {path}: {source}")]
    DatabaseOpen {
        /// File that was being opened.
        path: PathBuf,
        /// Error reported by `SQLite`.
        #[source]
        source: rusqlite::Error,
    },

    /// A statement against an open database failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// The schema could not be brought to the supported version.
    #[error("schema migration failed: {message}")]
    DatabaseMigration {
        /// What went wrong.
        message: String,
    },

    /// A device database or one of its sidecar files could not be removed.
    #[error("cannot delete database {name}: {source}")]
    DatabaseDelete {
        /// Name of the database.
        name: String,
        /// File system error.
        #[source]
        source: std::io::Error,
    },

    // --- configuration ---
    /// The configuration sources could not be merged or parsed.
    #[error("cannot load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// A configuration value is out of range.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Which value and why.
        message: String,
    },

    /// The configuration file could not be written back.
    #[error("cannot save configuration to {path}: {message}")]
    ConfigSave {
        /// Destination file.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    // --- file system ---
    /// Reading the database directory or another file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The data or configuration directory could not be created.
    #[error("cannot create directory {path}: {source}")]
    DirectoryCreate {
        /// Directory that was being created.
        path: PathBuf,
        /// File system error.
        #[source]
        source: std::io::Error,
    },

    // --- output ---
    /// JSON output could not be produced.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // --- runtime ---
    /// A blocking or background task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A state that should be unreachable.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias for meshkeeper operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Shorthand for [`Error::Internal`].
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Shorthand for [`Error::ConfigValidation`].
    #[must_use]
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Check if this error came from the file system and is worth retrying
    /// on a later lifecycle event.
    #[must_use]
    pub fn is_transient_io(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::DatabaseDelete { .. } | Self::DirectoryCreate { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::NodeDatabase;

    #[test]
    fn test_config_validation_message() {
        let err = Error::config_validation("cache_limit must be between 1 and 10");
        assert_eq!(
            err.to_string(),
            "invalid configuration: cache_limit must be between 1 and 10"
        );
        assert!(!err.is_transient_io());
    }

    #[test]
    fn test_database_delete_is_transient() {
        let err = Error::DatabaseDelete {
            name: "meshtastic_database_0123456789".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "busy"),
        };
        let msg = err.to_string();
        assert!(msg.contains("meshtastic_database_0123456789"));
        assert!(msg.contains("busy"));
        assert!(err.is_transient_io());
    }

    #[test]
    fn test_internal_is_not_transient() {
        let err = Error::internal("no active database after switch");
        assert_eq!(
            err.to_string(),
            "internal error: no active database after switch"
        );
        assert!(!err.is_transient_io());
    }

    #[test]
    fn test_opening_a_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = NodeDatabase::open(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            Error::DatabaseOpen { .. } | Error::DatabaseQuery(_)
        ));
    }

    #[test]
    fn test_malformed_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[filter]\nenabled = \"sometimes\"\n").unwrap();

        let err = Config::load_from(Some(path)).unwrap_err();
        assert!(matches!(err, Error::ConfigLoad(_)));
        assert!(err.to_string().starts_with("cannot load configuration"));
    }

    #[test]
    fn test_config_save_message() {
        let err = Error::ConfigSave {
            path: PathBuf::from("/etc/meshkeeper/config.toml"),
            message: "read-only file system".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/etc/meshkeeper/config.toml"));
        assert!(msg.contains("read-only"));
    }

    #[tokio::test]
    async fn test_panicking_task_maps_to_task_error() {
        let join = tokio::task::spawn_blocking(|| panic!("housekeeping exploded")).await;
        let err: Error = join.unwrap_err().into();
        assert!(matches!(err, Error::Task(_)));
    }
}
