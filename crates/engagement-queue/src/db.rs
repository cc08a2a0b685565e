use rusqlite::Connection;

use crate::error::Result;

/// Initialise the message queue table. Safe to call on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS message_queue (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id             TEXT NOT NULL,
            message_type        TEXT NOT NULL,
            message_key         TEXT NOT NULL,
            message_params      TEXT NOT NULL,
            destination         TEXT NOT NULL,
            destination_address TEXT NOT NULL,
            idempotency_key     TEXT NOT NULL UNIQUE,
            status              TEXT NOT NULL,
            attempts            INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL,
            scheduled_at        TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_message_queue_pending
            ON message_queue(status, scheduled_at);",
    )?;
    Ok(())
}
