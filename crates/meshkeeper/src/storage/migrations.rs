//! Node database schema versioning.
//!
//! The version lives in the `metadata` table. Each step in [`MIGRATIONS`]
//! moves the schema up by one version and must be safe to run against a
//! database created from the current base schema.

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::{Error, Result};

use super::schema::SCHEMA_STATEMENTS;

/// Schema version written by this build.
pub const CURRENT_VERSION: i32 = 2;

const VERSION_KEY: &str = "schema_version";

type Migration = fn(&Connection) -> Result<()>;

/// Upgrade steps, indexed by the version they produce.
const MIGRATIONS: &[(i32, Migration)] = &[
    (1, base_schema as Migration),
    (2, add_filtered_flag as Migration),
];

/// Create missing tables and upgrade the schema to [`CURRENT_VERSION`].
///
/// # Errors
///
/// Returns an error if a statement fails or the database was written by a
/// newer build.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        conn.execute(statement, [])?;
    }

    let stored = schema_version(conn)?;
    if stored > CURRENT_VERSION {
        return Err(Error::DatabaseMigration {
            message: format!("schema version {stored} is newer than {CURRENT_VERSION}"),
        });
    }

    for (version, step) in MIGRATIONS.iter().filter(|(v, _)| *v > stored) {
        step(conn)?;
        store_schema_version(conn, *version)?;
        if stored > 0 {
            info!(version, "Upgraded node database schema");
        }
    }
    Ok(())
}

/// Stored schema version, 0 when none is recorded.
fn schema_version(conn: &Connection) -> Result<i32> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match value {
        None => Ok(0),
        Some(value) => value.parse().map_err(|_| Error::DatabaseMigration {
            message: format!("unreadable schema version {value:?}"),
        }),
    }
}

fn store_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO metadata (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (VERSION_KEY, version.to_string()),
    )?;
    Ok(())
}

/// Version 1 is the base schema itself.
fn base_schema(_conn: &Connection) -> Result<()> {
    Ok(())
}

/// Version 2: messages remember whether the filter hid them.
fn add_filtered_flag(conn: &Connection) -> Result<()> {
    let present: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM pragma_table_info('messages') WHERE name = 'filtered'",
        [],
        |row| row.get(0),
    )?;
    if !present {
        conn.execute(
            "ALTER TABLE messages ADD COLUMN filtered INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    fn tables(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn test_fresh_database_gets_all_tables() {
        let conn = memory();
        initialize_schema(&conn).unwrap();

        let names = tables(&conn);
        for expected in ["messages", "metadata", "nodes"] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
        assert_eq!(schema_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_reopening_is_harmless() {
        let conn = memory();
        initialize_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO messages (contact_key, sender, body, received_at) VALUES ('0^all', '!1', 'hi', 1)",
            [],
        )
        .unwrap();
        initialize_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_version_one_database_gains_filtered_flag() {
        let conn = memory();
        conn.execute_batch(
            r"
            CREATE TABLE metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL);
            CREATE TABLE messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                contact_key TEXT NOT NULL,
                sender TEXT NOT NULL,
                body TEXT NOT NULL,
                received_at INTEGER NOT NULL
            );
            INSERT INTO metadata (key, value) VALUES ('schema_version', '1');
            INSERT INTO messages (contact_key, sender, body, received_at)
                VALUES ('0^all', '!1234', 'hello', 1);
            ",
        )
        .unwrap();

        initialize_schema(&conn).unwrap();

        let filtered: bool = conn
            .query_row("SELECT filtered FROM messages", [], |row| row.get(0))
            .unwrap();
        assert!(!filtered);
        assert_eq!(schema_version(&conn).unwrap(), 2);
    }

    #[test]
    fn test_newer_database_is_refused() {
        let conn = memory();
        initialize_schema(&conn).unwrap();
        store_schema_version(&conn, CURRENT_VERSION + 1).unwrap();

        let err = initialize_schema(&conn).unwrap_err();
        assert!(err.to_string().contains("is newer than"));
    }

    #[test]
    fn test_garbage_version_is_reported() {
        let conn = memory();
        initialize_schema(&conn).unwrap();
        conn.execute("UPDATE metadata SET value = 'two' WHERE key = 'schema_version'", [])
            .unwrap();

        let err = schema_version(&conn).unwrap_err();
        assert!(err.to_string().contains("unreadable schema version"));
    }

    #[test]
    fn test_steps_are_contiguous() {
        let versions: Vec<i32> = MIGRATIONS.iter().map(|(v, _)| *v).collect();
        let expected: Vec<i32> = (1..=CURRENT_VERSION).collect();
        assert_eq!(versions, expected);
    }
}
