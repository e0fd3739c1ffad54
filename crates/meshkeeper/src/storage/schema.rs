//! `SQLite` schema definitions.

/// Known nodes of the mesh as seen by one device.
pub const CREATE_NODES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS nodes (
    num INTEGER PRIMARY KEY,
    user_id TEXT NOT NULL,
    long_name TEXT NOT NULL,
    short_name TEXT NOT NULL,
    last_heard INTEGER NOT NULL DEFAULT 0
)
";

/// Text messages received through one device.
pub const CREATE_MESSAGES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    contact_key TEXT NOT NULL,
    sender TEXT NOT NULL,
    body TEXT NOT NULL,
    received_at INTEGER NOT NULL,
    filtered INTEGER NOT NULL DEFAULT 0
)
";

/// Conversation lookups, newest first.
pub const CREATE_MESSAGES_CONTACT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_messages_contact ON messages(contact_key, received_at DESC)
";

/// Key-value metadata, including the schema version.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All node database statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_NODES_TABLE,
    CREATE_MESSAGES_TABLE,
    CREATE_MESSAGES_CONTACT_INDEX,
    CREATE_METADATA_TABLE,
];

/// Preference store table backing the database manager.
pub const CREATE_PREFS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS prefs (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.trim().is_empty());
        }
    }

    #[test]
    fn test_messages_table_has_filtered_flag() {
        assert!(CREATE_MESSAGES_TABLE.contains("filtered INTEGER NOT NULL"));
        assert!(CREATE_MESSAGES_TABLE.contains("contact_key TEXT NOT NULL"));
    }

    #[test]
    fn test_statements_apply_cleanly() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        for stmt in SCHEMA_STATEMENTS {
            conn.execute(stmt, []).unwrap();
        }
        conn.execute(CREATE_PREFS_TABLE, []).unwrap();
    }
}
