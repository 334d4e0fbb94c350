//! Durable conversation history.
//!
//! A single-file SQLite database holds two-party conversations and their
//! messages. A conversation is keyed by the unordered pair of
//! (name, directory) endpoints; the pair is normalized on insert so both
//! directions land in one row. Messages are never deduplicated: operator
//! retries are kept as history.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::paths;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS conversations (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_a         TEXT NOT NULL,
    dir_a           TEXT NOT NULL,
    agent_b         TEXT NOT NULL,
    dir_b           TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    last_message_at TEXT NOT NULL,
    UNIQUE (agent_a, dir_a, agent_b, dir_b)
);
CREATE TABLE IF NOT EXISTS messages (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
    sender          TEXT NOT NULL,
    sender_dir      TEXT NOT NULL,
    receiver        TEXT NOT NULL,
    receiver_dir    TEXT NOT NULL,
    body            TEXT NOT NULL,
    sent_at         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_conversation
    ON messages (conversation_id, sent_at);
";

/// One side of a conversation: a registered name and its directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub name: String,
    pub dir: String,
}

impl Endpoint {
    pub fn new(name: &str, dir: &Path) -> Self {
        Self {
            name: name.to_string(),
            dir: dir.to_string_lossy().into_owned(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: i64,
    pub endpoint_a: Endpoint,
    pub endpoint_b: Endpoint,
    pub created_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub sender: Endpoint,
    pub receiver: Endpoint,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// The conversation store. One write connection per process; the retention
/// sweep runs once at open, inside its own write transaction.
pub struct History {
    conn: Connection,
}

impl History {
    pub fn open(config: &Config) -> Result<Self> {
        Self::open_at(&paths::history_db_path()?, config.retention_days)
    }

    pub fn open_at(path: &Path, retention_days: u32) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        }

        let conn =
            Connection::open(path).map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;

        let history = Self { conn };
        history.sweep(retention_days)?;
        Ok(history)
    }

    /// Record one delivered message: find or create the conversation for
    /// the normalized endpoint pair, bump its `last_message_at`, and insert
    /// the message. One transaction.
    pub fn log(&mut self, sender: &Endpoint, receiver: &Endpoint, body: &str) -> Result<i64> {
        let (a, b) = normalize(sender, receiver);
        let now = Utc::now();

        let tx = self.conn.transaction()?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM conversations
                 WHERE agent_a = ?1 AND dir_a = ?2 AND agent_b = ?3 AND dir_b = ?4",
                params![a.name, a.dir, b.name, b.dir],
                |row| row.get(0),
            )
            .optional()?;

        let conversation_id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE conversations SET last_message_at = ?1 WHERE id = ?2",
                    params![now, id],
                )?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO conversations
                         (agent_a, dir_a, agent_b, dir_b, created_at, last_message_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                    params![a.name, a.dir, b.name, b.dir, now],
                )?;
                tx.last_insert_rowid()
            }
        };

        tx.execute(
            "INSERT INTO messages
                 (conversation_id, sender, sender_dir, receiver, receiver_dir, body, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                conversation_id,
                sender.name,
                sender.dir,
                receiver.name,
                receiver.dir,
                body,
                now
            ],
        )?;
        let message_id = tx.last_insert_rowid();
        tx.commit()?;

        debug!(conversation_id, message_id, "history: message recorded");
        Ok(message_id)
    }

    /// Conversations, most recently active first.
    pub fn list_conversations(&self, limit: u32) -> Result<Vec<Conversation>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, agent_a, dir_a, agent_b, dir_b, created_at, last_message_at
             FROM conversations
             ORDER BY last_message_at DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(Conversation {
                id: row.get(0)?,
                endpoint_a: Endpoint {
                    name: row.get(1)?,
                    dir: row.get(2)?,
                },
                endpoint_b: Endpoint {
                    name: row.get(3)?,
                    dir: row.get(4)?,
                },
                created_at: row.get(5)?,
                last_message_at: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    /// A conversation's messages in chronological order; wall-clock ties
    /// break on the surrogate id.
    pub fn get_messages(&self, conversation_id: i64) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, conversation_id, sender, sender_dir, receiver, receiver_dir, body, sent_at
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY sent_at, id",
        )?;
        let rows = stmt.query_map(params![conversation_id], |row| {
            Ok(Message {
                id: row.get(0)?,
                conversation_id: row.get(1)?,
                sender: Endpoint {
                    name: row.get(2)?,
                    dir: row.get(3)?,
                },
                receiver: Endpoint {
                    name: row.get(4)?,
                    dir: row.get(5)?,
                },
                body: row.get(6)?,
                sent_at: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    /// Delete a conversation and, via the cascade, its messages.
    pub fn delete_conversation(&mut self, id: i64) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(())
    }

    /// Prune messages older than the horizon. Conversation rows stay: the
    /// relationship outlives its transcript.
    fn sweep(&self, retention_days: u32) -> Result<()> {
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        let pruned = self
            .conn
            .execute("DELETE FROM messages WHERE sent_at < ?1", params![cutoff])?;
        if pruned > 0 {
            info!(pruned, retention_days, "history: retention sweep");
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn raw(&self) -> &Connection {
        &self.conn
    }
}

/// Normalize an endpoint pair: sort by (name, dir) so (A,B) and (B,A)
/// address the same conversation row.
fn normalize<'a>(x: &'a Endpoint, y: &'a Endpoint) -> (&'a Endpoint, &'a Endpoint) {
    if (&x.name, &x.dir) <= (&y.name, &y.dir) {
        (x, y)
    } else {
        (y, x)
    }
}
