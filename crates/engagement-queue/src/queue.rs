use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use engagement_core::{Clock, Destination, UserId};
use rusqlite::{Connection, Row};
use serde_json::Value as Json;
use tracing::instrument;

use crate::error::{QueueError, Result};
use crate::types::{idempotency_key, MessageRow, MessageStatus, MessageType};

/// Thread-safe message queue. `enqueue` is idempotent against a deterministic
/// (user, type, day) key; the queue itself never sends anything — it is
/// drained by an external sender that this crate treats as a black box.
pub struct MessageQueue {
    db: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl MessageQueue {
    pub fn new(conn: Connection, clock: Arc<dyn Clock>) -> Self {
        Self {
            db: Mutex::new(conn),
            clock,
        }
    }

    /// Enqueue a message. Returns `Ok(true)` if a new row was queued, or
    /// `Ok(false)` if the idempotency key already existed (a same-day
    /// duplicate collapses silently — this is success, not an error).
    #[instrument(skip(self, params), fields(user_id = %user_id, message_type = %message_type))]
    pub fn enqueue(
        &self,
        user_id: &UserId,
        message_type: MessageType,
        message_key: &str,
        params: Json,
        destination: Destination,
        destination_address: &str,
    ) -> Result<bool> {
        let now = self.clock.now();
        let key = idempotency_key(user_id, message_type, now);
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute(
            "INSERT OR IGNORE INTO message_queue
                (user_id, message_type, message_key, message_params, destination,
                 destination_address, idempotency_key, status, attempts, created_at, scheduled_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', 0, ?8, ?8)",
            rusqlite::params![
                user_id.as_str(),
                message_type.to_string(),
                message_key,
                params.to_string(),
                destination.to_string(),
                destination_address,
                key,
                fmt(now),
            ],
        )?;
        Ok(rows_changed > 0)
    }

    /// Rows still awaiting delivery, oldest first, for the external sender.
    #[instrument(skip(self))]
    pub fn pending(&self, limit: i64) -> Result<Vec<MessageRow>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT user_id, message_type, message_key, message_params, destination,
                    destination_address, idempotency_key, status, attempts, created_at, scheduled_at
             FROM message_queue
             WHERE status = 'pending'
             ORDER BY scheduled_at ASC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![limit], row_to_message)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }
        Ok(out)
    }

    /// Update a row's status by idempotency key (the sender's unit of work).
    #[instrument(skip(self), fields(idempotency_key, status = %status))]
    pub fn mark_status(&self, idempotency_key: &str, status: MessageStatus) -> Result<()> {
        let db = self.db.lock().unwrap();
        let increment_attempts = matches!(status, MessageStatus::Failed);
        if increment_attempts {
            db.execute(
                "UPDATE message_queue SET status = ?1, attempts = attempts + 1 WHERE idempotency_key = ?2",
                rusqlite::params![status.to_string(), idempotency_key],
            )?;
        } else {
            db.execute(
                "UPDATE message_queue SET status = ?1 WHERE idempotency_key = ?2",
                rusqlite::params![status.to_string(), idempotency_key],
            )?;
        }
        Ok(())
    }
}

fn fmt(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

fn parse_dt(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| QueueError::MalformedRow(e.to_string()))
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Result<MessageRow>> {
    let user_id: String = row.get(0)?;
    let message_type: String = row.get(1)?;
    let message_key: String = row.get(2)?;
    let message_params: String = row.get(3)?;
    let destination: String = row.get(4)?;
    let destination_address: String = row.get(5)?;
    let idempotency_key: String = row.get(6)?;
    let status: String = row.get(7)?;
    let attempts: i64 = row.get(8)?;
    let created_at: String = row.get(9)?;
    let scheduled_at: String = row.get(10)?;

    Ok((|| {
        Ok(MessageRow {
            user_id: UserId::from(user_id),
            message_type: MessageType::from_str(&message_type)
                .map_err(QueueError::MalformedRow)?,
            message_key,
            message_params: serde_json::from_str(&message_params)
                .unwrap_or(serde_json::Value::Null),
            destination: parse_destination(&destination)?,
            destination_address,
            idempotency_key,
            status: MessageStatus::from_str(&status).map_err(QueueError::MalformedRow)?,
            attempts: attempts as u32,
            created_at: parse_dt(&created_at)?,
            scheduled_at: parse_dt(&scheduled_at)?,
        })
    })())
}

fn parse_destination(s: &str) -> Result<Destination> {
    match s {
        "individual" => Ok(Destination::Individual),
        "group" => Ok(Destination::Group),
        other => Err(QueueError::MalformedRow(format!(
            "unknown destination: {other}"
        ))),
    }
}
