use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use engagement_core::{Clock, EngagementState, UserId};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::instrument;

use crate::error::{Result, StoreError};
use crate::types::{
    AggregateStats, EngagementRow, StatePatch, TimestampPatch, TransitionLogRow, UpdateOutcome,
};

/// Thread-safe store for per-user engagement rows and the transition log.
///
/// Wraps a single SQLite connection in a `Mutex`. A `Clock` is injected
/// rather than calling `Utc::now()` directly so tests can move time
/// deterministically (see the 48-hour goodbye-timeout scenario in
/// `engagement-scheduler`'s daily job tests, and the wall-clock/DB-clock
/// mismatch note this resolves).
pub struct EngagementStore {
    db: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl EngagementStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection, clock: Arc<dyn Clock>) -> Self {
        Self {
            db: Mutex::new(conn),
            clock,
        }
    }

    /// Read a row by user id. `None` if no row exists yet.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn get(&self, user_id: &UserId) -> Result<Option<EngagementRow>> {
        let db = self.db.lock().unwrap();
        let row = db
            .query_row(SELECT_BY_USER_ID, rusqlite::params![user_id.as_str()], row_to_engagement)
            .optional()?;
        row.transpose()
    }

    /// Create a row with defaults `{state: active, last_activity_at: now}`.
    ///
    /// Idempotent: a concurrent-create collision (`INSERT OR IGNORE`) is
    /// resolved by reading the winning row back, never surfaced as an error.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn create(&self, user_id: &UserId) -> Result<EngagementRow> {
        let now = fmt(self.clock.now());
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR IGNORE INTO engagement_state
                (user_id, state, last_activity_at, created_at, updated_at)
             VALUES (?1, 'active', ?2, ?2, ?2)",
            rusqlite::params![user_id.as_str(), now],
        )?;
        let row = db
            .query_row(SELECT_BY_USER_ID, rusqlite::params![user_id.as_str()], row_to_engagement)?;
        row
    }

    /// Apply `patch` only if the row's current `updated_at` still matches
    /// `expected_updated_at` (the optimistic-lock token). Returns
    /// `UpdateOutcome::Conflict` — not an error — when the token is stale.
    #[instrument(skip(self, patch), fields(user_id = %user_id))]
    pub fn conditional_update(
        &self,
        user_id: &UserId,
        expected_updated_at: DateTime<Utc>,
        patch: &StatePatch,
    ) -> Result<UpdateOutcome> {
        let now = fmt(self.clock.now());
        let expected = fmt(expected_updated_at);

        let mut sets = vec!["updated_at = ?".to_string()];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now.clone())];

        if let Some(state) = patch.state {
            sets.push("state = ?".to_string());
            params.push(Box::new(state.to_string()));
        }
        if let Some(activity) = patch.last_activity_at {
            sets.push("last_activity_at = ?".to_string());
            params.push(Box::new(fmt(activity)));
        }
        push_timestamp_patch(&mut sets, &mut params, "goodbye_sent_at", patch.goodbye_sent_at);
        push_timestamp_patch(
            &mut sets,
            &mut params,
            "goodbye_expires_at",
            patch.goodbye_expires_at,
        );
        push_timestamp_patch(&mut sets, &mut params, "remind_at", patch.remind_at);

        let sql = format!(
            "UPDATE engagement_state SET {} WHERE user_id = ? AND updated_at = ?",
            sets.join(", ")
        );
        params.push(Box::new(user_id.as_str().to_string()));
        params.push(Box::new(expected));

        let db = self.db.lock().unwrap();
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|b| b.as_ref()).collect();
        let rows_changed = db.execute(&sql, param_refs.as_slice())?;

        if rows_changed == 0 {
            return Ok(UpdateOutcome::Conflict);
        }

        let row = db
            .query_row(SELECT_BY_USER_ID, rusqlite::params![user_id.as_str()], row_to_engagement)?;
        Ok(UpdateOutcome::Updated(row?))
    }

    /// Unconditionally bump `last_activity_at = now`. Per §4.5/§9, this
    /// intentionally races the conditional state update — losing an
    /// activity timestamp is a smaller defect than blocking a transition.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn touch_activity(&self, user_id: &UserId) -> Result<()> {
        let now = fmt(self.clock.now());
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute(
            "UPDATE engagement_state SET last_activity_at = ?1 WHERE user_id = ?2",
            rusqlite::params![now, user_id.as_str()],
        )?;
        if rows_changed == 0 {
            return Err(StoreError::NotFound {
                user_id: user_id.to_string(),
            });
        }
        Ok(())
    }

    /// Append an immutable transition log row. Failure here is non-fatal to
    /// the caller — the state update has already committed; callers should
    /// log and continue rather than propagate.
    #[instrument(skip(self, row), fields(user_id = %row.user_id))]
    pub fn append_transition_log(&self, row: &TransitionLogRow) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO transition_log
                (id, user_id, from_state, to_state, trigger, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                row.id,
                row.user_id.as_str(),
                row.from_state.to_string(),
                row.to_state.to_string(),
                row.trigger,
                row.metadata.to_string(),
                fmt(row.created_at),
            ],
        )?;
        Ok(())
    }

    /// Users in `active` whose `last_activity_at` is older than `threshold`.
    #[instrument(skip(self))]
    pub fn inactive_cohort(
        &self,
        threshold: chrono::Duration,
        limit: i64,
    ) -> Result<Vec<EngagementRow>> {
        let cutoff = fmt(self.clock.now() - threshold);
        self.cohort_by(
            "SELECT user_id, state, last_activity_at, goodbye_sent_at, \
             goodbye_expires_at, remind_at, created_at, updated_at FROM engagement_state \
             WHERE state = 'active' AND last_activity_at < ?1 LIMIT ?2",
            rusqlite::params![cutoff, limit],
        )
    }

    /// Users in `goodbye_sent` whose `goodbye_expires_at` has passed.
    #[instrument(skip(self))]
    pub fn expired_goodbye_cohort(&self, limit: i64) -> Result<Vec<EngagementRow>> {
        let now = fmt(self.clock.now());
        self.cohort_by(
            "SELECT user_id, state, last_activity_at, goodbye_sent_at, \
             goodbye_expires_at, remind_at, created_at, updated_at FROM engagement_state \
             WHERE state = 'goodbye_sent' AND goodbye_expires_at < ?1 LIMIT ?2",
            rusqlite::params![now, limit],
        )
    }

    /// Users in `remind_later` whose `remind_at` has passed.
    #[instrument(skip(self))]
    pub fn due_reminder_cohort(&self, limit: i64) -> Result<Vec<EngagementRow>> {
        let now = fmt(self.clock.now());
        self.cohort_by(
            "SELECT user_id, state, last_activity_at, goodbye_sent_at, \
             goodbye_expires_at, remind_at, created_at, updated_at FROM engagement_state \
             WHERE state = 'remind_later' AND remind_at < ?1 LIMIT ?2",
            rusqlite::params![now, limit],
        )
    }

    fn cohort_by(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<EngagementRow>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(sql)?;
        let rows = stmt.query_map(params, row_to_engagement)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }
        Ok(out)
    }

    /// Transition history for a user, newest first, limited. `before_id`
    /// pages beyond the default newest-N by excluding that id and anything
    /// newer than it (ids are UUIDv7, so lexical order tracks creation order).
    #[instrument(skip(self), fields(user_id = %user_id, limit))]
    pub fn transition_history(
        &self,
        user_id: &UserId,
        limit: usize,
        before_id: Option<&str>,
    ) -> Result<Vec<TransitionLogRow>> {
        let db = self.db.lock().unwrap();
        let rows = match before_id {
            None => {
                let mut stmt = db.prepare(
                    "SELECT id, user_id, from_state, to_state, trigger, metadata, created_at
                     FROM transition_log
                     WHERE user_id = ?1
                     ORDER BY created_at DESC
                     LIMIT ?2",
                )?;
                let mapped = stmt.query_map(
                    rusqlite::params![user_id.as_str(), limit as i64],
                    row_to_log,
                )?;
                mapped.collect::<std::result::Result<Vec<_>, _>>()?
            }
            Some(cursor) => {
                let mut stmt = db.prepare(
                    "SELECT id, user_id, from_state, to_state, trigger, metadata, created_at
                     FROM transition_log
                     WHERE user_id = ?1 AND id < ?2
                     ORDER BY created_at DESC
                     LIMIT ?3",
                )?;
                let mapped = stmt.query_map(
                    rusqlite::params![user_id.as_str(), cursor, limit as i64],
                    row_to_log,
                )?;
                mapped.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Timestamp the daily driver last completed a run, if any.
    #[instrument(skip(self))]
    pub fn last_driver_run(&self) -> Result<Option<DateTime<Utc>>> {
        let db = self.db.lock().unwrap();
        let at: Option<String> = db
            .query_row(
                "SELECT completed_at FROM driver_runs WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        at.map(|s| parse_dt(&s, "driver", "completed_at")).transpose()
    }

    /// Stamp the daily driver's completion time, replacing any prior stamp.
    #[instrument(skip(self))]
    pub fn record_driver_run(&self, at: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO driver_runs (id, completed_at) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET completed_at = excluded.completed_at",
            rusqlite::params![fmt(at)],
        )?;
        Ok(())
    }

    /// Aggregate statistics over `[from, to)`: counts by trigger, the
    /// response-type distribution, the unprompted-return count, and the
    /// mean `days_inactive` recorded in transition metadata.
    #[instrument(skip(self))]
    pub fn aggregate_stats(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<AggregateStats> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT trigger, metadata FROM transition_log
             WHERE created_at >= ?1 AND created_at < ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![fmt(from), fmt(to)], |row| {
            let trigger: String = row.get(0)?;
            let metadata: String = row.get(1)?;
            Ok((trigger, metadata))
        })?;

        let mut stats = AggregateStats::default();
        let mut days_inactive_sum: f64 = 0.0;
        let mut days_inactive_count: i64 = 0;

        for entry in rows {
            let (trigger, metadata_str) = entry?;
            stats.total_transitions += 1;
            *stats.by_trigger.entry(trigger).or_insert(0) += 1;

            let metadata: serde_json::Value = serde_json::from_str(&metadata_str)
                .unwrap_or(serde_json::Value::Null);

            if let Some(rt) = metadata.get("response_type").and_then(|v| v.as_str()) {
                *stats
                    .response_type_distribution
                    .entry(rt.to_string())
                    .or_insert(0) += 1;
            }
            if metadata
                .get("unprompted_return")
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
            {
                stats.unprompted_return_count += 1;
            }
            if let Some(days) = metadata.get("days_inactive").and_then(|v| v.as_f64()) {
                days_inactive_sum += days;
                days_inactive_count += 1;
            }
        }

        if days_inactive_count > 0 {
            stats.mean_days_inactive = days_inactive_sum / days_inactive_count as f64;
        }

        Ok(stats)
    }
}

fn push_timestamp_patch(
    sets: &mut Vec<String>,
    params: &mut Vec<Box<dyn rusqlite::ToSql>>,
    column: &str,
    patch: TimestampPatch,
) {
    match patch {
        TimestampPatch::Unchanged => {}
        TimestampPatch::Clear => {
            sets.push(format!("{column} = NULL"));
        }
        TimestampPatch::Set(at) => {
            sets.push(format!("{column} = ?"));
            params.push(Box::new(fmt(at)));
        }
    }
}

fn fmt(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

fn parse_dt(s: &str, user_id: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::MalformedRow {
            user_id: user_id.to_string(),
            reason: format!("{field}: {e}"),
        })
}

fn parse_opt_dt(s: Option<String>, user_id: &str, field: &str) -> Result<Option<DateTime<Utc>>> {
    s.map(|s| parse_dt(&s, user_id, field)).transpose()
}

const SELECT_BY_USER_ID: &str = "SELECT user_id, state, last_activity_at, goodbye_sent_at, \
     goodbye_expires_at, remind_at, created_at, updated_at FROM engagement_state WHERE user_id = ?1";

fn row_to_engagement(row: &Row<'_>) -> rusqlite::Result<Result<EngagementRow>> {
    let user_id: String = row.get(0)?;
    let state_str: String = row.get(1)?;
    let last_activity_at: String = row.get(2)?;
    let goodbye_sent_at: Option<String> = row.get(3)?;
    let goodbye_expires_at: Option<String> = row.get(4)?;
    let remind_at: Option<String> = row.get(5)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;

    Ok((|| {
        let state = EngagementState::from_str(&state_str).map_err(|e| StoreError::MalformedRow {
            user_id: user_id.clone(),
            reason: e,
        })?;
        Ok(EngagementRow {
            user_id: UserId::from(user_id.clone()),
            state,
            last_activity_at: parse_dt(&last_activity_at, &user_id, "last_activity_at")?,
            goodbye_sent_at: parse_opt_dt(goodbye_sent_at, &user_id, "goodbye_sent_at")?,
            goodbye_expires_at: parse_opt_dt(goodbye_expires_at, &user_id, "goodbye_expires_at")?,
            remind_at: parse_opt_dt(remind_at, &user_id, "remind_at")?,
            created_at: parse_dt(&created_at, &user_id, "created_at")?,
            updated_at: parse_dt(&updated_at, &user_id, "updated_at")?,
        })
    })())
}

fn row_to_log(row: &Row<'_>) -> rusqlite::Result<Result<TransitionLogRow>> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let from_state: String = row.get(2)?;
    let to_state: String = row.get(3)?;
    let trigger: String = row.get(4)?;
    let metadata: String = row.get(5)?;
    let created_at: String = row.get(6)?;

    Ok((|| {
        Ok(TransitionLogRow {
            id,
            user_id: UserId::from(user_id.clone()),
            from_state: EngagementState::from_str(&from_state).map_err(|e| {
                StoreError::MalformedRow {
                    user_id: user_id.clone(),
                    reason: e,
                }
            })?,
            to_state: EngagementState::from_str(&to_state).map_err(|e| StoreError::MalformedRow {
                user_id: user_id.clone(),
                reason: e,
            })?,
            trigger,
            metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
            created_at: parse_dt(&created_at, &user_id, "created_at")?,
        })
    })())
}
