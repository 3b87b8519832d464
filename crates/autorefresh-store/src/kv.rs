use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::{db::init_db, error::Result};

const CHANGE_CAPACITY: usize = 64;

/// Emitted after a key was written or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub key: String,
}

/// Durable JSON document store with change notifications.
///
/// Writes return their error; callers decide whether to escalate or log and
/// carry on. A missing key is `Ok(None)`, never an error.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Full overwrite of the document under `key`.
    fn set(&self, key: &str, value: &Value) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Receive a [`StoreChange`] for every successful `set` / `remove`.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// [`KeyValueStore`] backed by the SQLite `kv` table.
pub struct SqliteKv {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<StoreChange>,
}

impl SqliteKv {
    /// Wrap an open connection, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Ok(Self {
            conn: Mutex::new(conn),
            changes,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn notify(&self, key: &str) {
        // No subscribers is fine.
        let _ = self.changes.send(StoreChange {
            key: key.to_string(),
        });
    }
}

impl KeyValueStore for SqliteKv {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let conn = self.conn.lock().unwrap();
        let raw: Option<String> = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        let text = serde_json::to_string(value)?;
        let now = Utc::now().to_rfc3339();
        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                updated_at = excluded.updated_at",
                rusqlite::params![key, text, now],
            )?;
        }
        debug!(key, bytes = text.len(), "document saved");
        self.notify(key);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let n = {
            let conn = self.conn.lock().unwrap();
            conn.execute("DELETE FROM kv WHERE key = ?1", [key])?
        };
        if n > 0 {
            debug!(key, "document removed");
            self.notify(key);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_key_is_none() {
        let kv = SqliteKv::open_in_memory().unwrap();
        assert!(kv.get("timers").unwrap().is_none());
    }

    #[test]
    fn set_overwrites_whole_document() {
        let kv = SqliteKv::open_in_memory().unwrap();
        kv.set("timers", &json!([{"tabId": 1}, {"tabId": 2}])).unwrap();
        kv.set("timers", &json!([{"tabId": 3}])).unwrap();
        assert_eq!(kv.get("timers").unwrap(), Some(json!([{"tabId": 3}])));
    }

    #[test]
    fn writes_emit_change_notifications() {
        let kv = SqliteKv::open_in_memory().unwrap();
        let mut rx = kv.subscribe();

        kv.set("timerStats", &json!({})).unwrap();
        kv.remove("timerStats").unwrap();
        // Removing an absent key is silent.
        kv.remove("timerStats").unwrap();

        assert_eq!(rx.try_recv().unwrap().key, "timerStats");
        assert_eq!(rx.try_recv().unwrap().key, "timerStats");
        assert!(rx.try_recv().is_err());
        assert!(kv.get("timerStats").unwrap().is_none());
    }
}
