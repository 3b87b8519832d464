use rusqlite::Connection;

use crate::error::Result;

/// Initialise the key-value schema in `conn`. Safe to call on every startup.
///
/// Each row holds one JSON document (`timers`, `timerStats`, ...). Values are
/// stored as text so the database can be inspected with the sqlite3 shell.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS kv (
            key         TEXT    NOT NULL PRIMARY KEY,
            value       TEXT    NOT NULL,   -- JSON document
            updated_at  TEXT    NOT NULL    -- ISO-8601
        ) STRICT;
        ",
    )?;
    Ok(())
}
