use rusqlite::Connection;

use crate::error::Result;

/// Initialise the engagement-state and transition-log tables and their
/// indexes. Safe to call on every startup — uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS engagement_state (
            user_id            TEXT PRIMARY KEY,
            state              TEXT NOT NULL,
            last_activity_at   TEXT NOT NULL,
            goodbye_sent_at    TEXT,
            goodbye_expires_at TEXT,
            remind_at          TEXT,
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL
        );
        -- drives the inactivity sweep cohort query
        CREATE INDEX IF NOT EXISTS idx_engagement_last_activity
            ON engagement_state(state, last_activity_at);
        -- drives the goodbye-timeout sweep cohort query
        CREATE INDEX IF NOT EXISTS idx_engagement_goodbye_expires
            ON engagement_state(state, goodbye_expires_at);
        -- drives the due-reminder sweep cohort query
        CREATE INDEX IF NOT EXISTS idx_engagement_remind_at
            ON engagement_state(state, remind_at);

        CREATE TABLE IF NOT EXISTS transition_log (
            id         TEXT PRIMARY KEY,
            user_id    TEXT NOT NULL,
            from_state TEXT NOT NULL,
            to_state   TEXT NOT NULL,
            trigger    TEXT NOT NULL,
            metadata   TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_transition_log_user
            ON transition_log(user_id, created_at DESC);

        -- single-row table the daily driver stamps on completion, so a
        -- fresh process can detect a skipped run (mirrors the teacher's
        -- jobs.last_run column, generalized to the whole batch job rather
        -- than one job row per user).
        CREATE TABLE IF NOT EXISTS driver_runs (
            id           INTEGER PRIMARY KEY CHECK (id = 1),
            completed_at TEXT NOT NULL
        );",
    )?;
    Ok(())
}
