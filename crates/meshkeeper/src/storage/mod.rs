//! Storage layer for meshkeeper.
//!
//! Each radio gets its own `SQLite` database ([`NodeDatabase`]) holding the
//! nodes and messages seen through that radio. [`DatabaseDir`] maps database
//! names onto files and [`ManagerPrefs`] persists the bookkeeping the
//! database manager needs across runs.

pub mod files;
pub mod migrations;
pub mod prefs;
pub mod schema;

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

pub use files::{DatabaseDir, DatabaseFiles};
pub use prefs::ManagerPrefs;

/// Sender id stored for messages sent from this device.
pub const LOCAL_SENDER: &str = "^local";

/// A node of the mesh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Node number.
    pub num: u32,
    /// User id, e.g. `!a1b2c3d4`.
    pub user_id: String,
    /// Long display name.
    pub long_name: String,
    /// Short display name.
    pub short_name: String,
    /// Last time the node was heard, epoch seconds.
    pub last_heard: i64,
}

/// A stored text message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Row id.
    pub id: i64,
    /// Conversation the message belongs to.
    pub contact_key: String,
    /// Sender id.
    pub sender: String,
    /// Message text.
    pub body: String,
    /// Receive time, epoch milliseconds.
    pub received_at: i64,
    /// Whether the message filter hid this message.
    pub filtered: bool,
}

/// Per-device node database.
#[derive(Debug)]
pub struct NodeDatabase {
    path: PathBuf,
    conn: Connection,
}

impl NodeDatabase {
    /// Open or create the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created or
    /// schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening node database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Node database ready at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or update a node.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn upsert_node(&self, node: &Node) -> Result<()> {
        self.conn.execute(
            r"
            INSERT INTO nodes (num, user_id, long_name, short_name, last_heard)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(num) DO UPDATE SET
                user_id = excluded.user_id,
                long_name = excluded.long_name,
                short_name = excluded.short_name,
                last_heard = MAX(nodes.last_heard, excluded.last_heard)
            ",
            params![
                node.num,
                node.user_id,
                node.long_name,
                node.short_name,
                node.last_heard
            ],
        )?;
        Ok(())
    }

    /// Look up a node by number.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_node(&self, num: u32) -> Result<Option<Node>> {
        let node = self
            .conn
            .query_row(
                "SELECT num, user_id, long_name, short_name, last_heard FROM nodes WHERE num = ?1",
                [num],
                |row| {
                    Ok(Node {
                        num: row.get(0)?,
                        user_id: row.get(1)?,
                        long_name: row.get(2)?,
                        short_name: row.get(3)?,
                        last_heard: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(node)
    }

    /// Record that the node with `user_id` (`!` followed by its hex node
    /// number) was heard at `heard_at` epoch seconds.
    ///
    /// Unknown nodes are created with placeholder names derived from the
    /// node number; known nodes keep their names. Returns `None` for sender
    /// ids that are not node ids.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn record_heard(&self, user_id: &str, heard_at: i64) -> Result<Option<Node>> {
        let Some(num) = parse_node_num(user_id) else {
            return Ok(None);
        };

        let node = match self.get_node(num)? {
            Some(known) => Node {
                last_heard: known.last_heard.max(heard_at),
                ..known
            },
            None => {
                let suffix = format!("{num:08x}");
                let short_name = suffix[4..].to_string();
                Node {
                    num,
                    user_id: format!("!{suffix}"),
                    long_name: format!("Meshtastic {short_name}"),
                    short_name,
                    last_heard: heard_at,
                }
            }
        };
        self.upsert_node(&node)?;
        Ok(Some(node))
    }

    /// Number of known nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn node_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Store a received message and return its row id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_message(
        &self,
        contact_key: &str,
        sender: &str,
        body: &str,
        received_at: i64,
        filtered: bool,
    ) -> Result<i64> {
        self.conn.execute(
            r"
            INSERT INTO messages (contact_key, sender, body, received_at, filtered)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![contact_key, sender, body, received_at, filtered],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Newest messages of a conversation, optionally including the ones the
    /// filter hid.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn recent_messages(
        &self,
        contact_key: &str,
        limit: usize,
        include_filtered: bool,
    ) -> Result<Vec<StoredMessage>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, contact_key, sender, body, received_at, filtered
            FROM messages
            WHERE contact_key = ?1 AND (?2 OR filtered = 0)
            ORDER BY received_at DESC, id DESC
            LIMIT ?3
            ",
        )?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let messages = stmt
            .query_map(params![contact_key, include_filtered, limit_i64], |row| {
                Ok(StoredMessage {
                    id: row.get(0)?,
                    contact_key: row.get(1)?,
                    sender: row.get(2)?,
                    body: row.get(3)?,
                    received_at: row.get(4)?,
                    filtered: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(messages)
    }

    /// Total number of stored messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn message_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Node number of a `!xxxxxxxx` user id.
fn parse_node_num(user_id: &str) -> Option<u32> {
    let hex = user_id.strip_prefix('!')?;
    if hex.is_empty() || hex.len() > 8 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}
