use chrono::{DateTime, Utc};
use engagement_core::{EngagementState, UserId};
use serde_json::Value as Json;

/// A persisted engagement row. `updated_at` doubles as the optimistic-lock
/// token: a conditional update succeeds only if it still matches the value
/// read here.
#[derive(Debug, Clone, PartialEq)]
pub struct EngagementRow {
    pub user_id: UserId,
    pub state: EngagementState,
    pub last_activity_at: DateTime<Utc>,
    pub goodbye_sent_at: Option<DateTime<Utc>>,
    pub goodbye_expires_at: Option<DateTime<Utc>>,
    pub remind_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A timestamp field's target value in a state patch. `Unchanged` leaves the
/// column alone; `Clear` sets it `NULL`; `Set` writes the given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampPatch {
    #[default]
    Unchanged,
    Clear,
    Set(DateTime<Utc>),
}

/// The partial row computed by the Transition Engine (§4.3 step 3) for a
/// single conditional update. `state` and `last_activity_at` are themselves
/// patches so callers are not forced to restate values they don't touch.
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
    pub state: Option<EngagementState>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub goodbye_sent_at: TimestampPatch,
    pub goodbye_expires_at: TimestampPatch,
    pub remind_at: TimestampPatch,
}

/// Outcome of a conditional update: either the optimistic token still
/// matched and the row committed, or someone else won the race.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Updated(EngagementRow),
    Conflict,
}

/// An immutable entry in the append-only transition log.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionLogRow {
    pub id: String,
    pub user_id: UserId,
    pub from_state: EngagementState,
    pub to_state: EngagementState,
    pub trigger: String,
    pub metadata: Json,
    pub created_at: DateTime<Utc>,
}

/// Aggregate statistics over a date range, per §4.2's cohort-query contract.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateStats {
    pub total_transitions: i64,
    pub by_trigger: std::collections::HashMap<String, i64>,
    pub response_type_distribution: std::collections::HashMap<String, i64>,
    pub unprompted_return_count: i64,
    pub mean_days_inactive: f64,
}
