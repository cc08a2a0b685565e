use std::sync::Arc;

use chrono::{DateTime, Utc};
use engagement_core::{
    Clock, EngagementConfig, EngagementState, SideEffect, Trigger, UserId, UserProfile,
};
use engagement_queue::{MessageQueue, MessageType};
use engagement_store::{EngagementRow, EngagementStore, StatePatch, TimestampPatch, TransitionLogRow, UpdateOutcome};
use serde_json::{Map, Value as Json};
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::analytics::{emit_swallowing_errors, AnalyticsEvent, AnalyticsSink};

/// Outcome of a single `transition` call. Never an `Err` — every failure
/// mode the algorithm defines (invalid transition, lost race, store error)
/// is reported through `success`/`error` per spec.md §4.3.
#[derive(Debug, Clone, Default)]
pub struct TransitionResult {
    pub success: bool,
    pub previous_state: Option<EngagementState>,
    pub new_state: Option<EngagementState>,
    pub transition_id: Option<String>,
    pub error: Option<String>,
    pub side_effects: Vec<SideEffect>,
}

impl TransitionResult {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Validates, applies, logs, and fires side effects for a single
/// user/trigger transition (C3).
pub struct TransitionEngine {
    store: Arc<EngagementStore>,
    queue: Arc<MessageQueue>,
    analytics: Arc<dyn AnalyticsSink>,
    config: EngagementConfig,
    clock: Arc<dyn Clock>,
}

impl TransitionEngine {
    pub fn new(
        store: Arc<EngagementStore>,
        queue: Arc<MessageQueue>,
        analytics: Arc<dyn AnalyticsSink>,
        config: EngagementConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            queue,
            analytics,
            config,
            clock,
        }
    }

    /// Run the transition algorithm of spec.md §4.3 for `user_id` under
    /// `trigger`. `extra_metadata` is merged additively and cannot override
    /// the computed `response_type` / `days_inactive` keys.
    #[instrument(skip(self, extra_metadata, profile), fields(user_id = %user_id, trigger = %trigger))]
    pub async fn transition(
        &self,
        user_id: &UserId,
        trigger: Trigger,
        extra_metadata: Option<Map<String, Json>>,
        profile: &UserProfile,
    ) -> TransitionResult {
        // Step 1: read the current row, handling the absent-row cases.
        let row = match self.store.get(user_id) {
            Ok(Some(row)) => row,
            Ok(None) => {
                if trigger == Trigger::UserMessage {
                    return match self.store.create(user_id) {
                        Ok(row) => TransitionResult {
                            success: true,
                            previous_state: Some(row.state),
                            new_state: Some(row.state),
                            transition_id: None,
                            error: None,
                            side_effects: vec![SideEffect::InitializedNewUser],
                        },
                        Err(e) => TransitionResult::failure(format!("store error: {e}")),
                    };
                }
                return TransitionResult::failure(format!(
                    "no engagement state record for user {user_id}"
                ));
            }
            Err(e) => return TransitionResult::failure(format!("store error: {e}")),
        };

        // Step 2: validate against the closed state graph.
        let Some(edge) = engagement_graph::lookup(row.state, trigger) else {
            warn!(from = %row.state, trigger = %trigger, "invalid transition rejected");
            return TransitionResult::failure(format!(
                "Invalid transition: {} + {}",
                row.state, trigger
            ));
        };

        let now = self.clock.now();

        // Step 3: timestamp patch implied by the target state.
        let patch = self.timestamp_patch(edge.to, now);

        // Step 4: metadata.
        let metadata = self.build_metadata(&row, trigger, edge.to, now, extra_metadata);

        // Step 5: the atomic commit point.
        let outcome = match self.store.conditional_update(user_id, row.updated_at, &patch) {
            Ok(outcome) => outcome,
            Err(e) => return TransitionResult::failure(format!("store error: {e}")),
        };

        if matches!(outcome, UpdateOutcome::Conflict) {
            return TransitionResult::failure("modified by another process");
        }

        // Step 6: append the transition log row. Best effort.
        let transition_id = Uuid::now_v7().to_string();
        let log_row = TransitionLogRow {
            id: transition_id.clone(),
            user_id: user_id.clone(),
            from_state: row.state,
            to_state: edge.to,
            trigger: trigger.to_string(),
            metadata: Json::Object(metadata.clone()),
            created_at: now,
        };
        if let Err(e) = self.store.append_transition_log(&log_row) {
            error!(error = %e, "transition log append failed, swallowed");
        }

        // Step 7: fire-and-forget analytics.
        self.emit_analytics(row.state, edge.to, trigger, &metadata, profile);

        // Step 8: state-entry side effects.
        if edge.side_effects.contains(&SideEffect::GoodbyeTimerStarted) {
            self.enqueue_goodbye(user_id, profile);
        }
        // `no_message_sent_by_design` (goodbye_timeout) enqueues nothing by
        // contract; `reminder_scheduled`, entering `help_flow`/`active`/
        // `dormant` never enqueue from this engine either.

        TransitionResult {
            success: true,
            previous_state: Some(row.state),
            new_state: Some(edge.to),
            transition_id: Some(transition_id),
            error: None,
            side_effects: edge.side_effects.to_vec(),
        }
    }

    fn timestamp_patch(&self, to: EngagementState, now: DateTime<Utc>) -> StatePatch {
        match to {
            EngagementState::GoodbyeSent => StatePatch {
                state: Some(to),
                goodbye_sent_at: TimestampPatch::Set(now),
                goodbye_expires_at: TimestampPatch::Set(now + self.config.goodbye_timeout()),
                ..Default::default()
            },
            EngagementState::RemindLater => StatePatch {
                state: Some(to),
                remind_at: TimestampPatch::Set(now + self.config.remind_later()),
                ..Default::default()
            },
            EngagementState::Active => StatePatch {
                state: Some(to),
                last_activity_at: Some(now),
                goodbye_sent_at: TimestampPatch::Clear,
                goodbye_expires_at: TimestampPatch::Clear,
                remind_at: TimestampPatch::Clear,
                ..Default::default()
            },
            EngagementState::Dormant => StatePatch {
                state: Some(to),
                goodbye_sent_at: TimestampPatch::Clear,
                goodbye_expires_at: TimestampPatch::Clear,
                remind_at: TimestampPatch::Clear,
                ..Default::default()
            },
            EngagementState::HelpFlow => StatePatch {
                state: Some(to),
                ..Default::default()
            },
        }
    }

    fn build_metadata(
        &self,
        row: &EngagementRow,
        trigger: Trigger,
        to: EngagementState,
        now: DateTime<Utc>,
        extra_metadata: Option<Map<String, Json>>,
    ) -> Map<String, Json> {
        let mut metadata = Map::new();

        let days_inactive = days_between(now, row.last_activity_at);
        metadata.insert("days_inactive".to_string(), Json::from(days_inactive));

        if let Some(response_type) = trigger.response_type() {
            metadata.insert(
                "response_type".to_string(),
                Json::from(response_type.to_string()),
            );
            let hours_waited = row
                .goodbye_sent_at
                .map(|at| hours_between(now, at))
                .unwrap_or(0);
            metadata.insert("hours_waited".to_string(), Json::from(hours_waited));
            metadata.insert(
                "days_since_goodbye".to_string(),
                Json::from(hours_waited / 24),
            );
        }

        if trigger == Trigger::UserMessage
            && row.state == EngagementState::Dormant
            && to == EngagementState::Active
            && days_inactive >= self.config.unprompted_return_threshold().num_days()
        {
            metadata.insert("unprompted_return".to_string(), Json::from(true));
        }

        metadata.insert(
            "trigger_source".to_string(),
            Json::from(trigger.source().to_string()),
        );

        if let Some(extra) = extra_metadata {
            for (key, value) in extra {
                if key == "response_type" || key == "days_inactive" {
                    continue;
                }
                metadata.insert(key, value);
            }
        }

        metadata
    }

    fn emit_analytics(
        &self,
        from: EngagementState,
        to: EngagementState,
        trigger: Trigger,
        metadata: &Map<String, Json>,
        profile: &UserProfile,
    ) {
        let days_inactive = metadata
            .get("days_inactive")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let response_type = trigger.response_type();
        let unprompted_return = metadata
            .get("unprompted_return")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let analytics = self.analytics.clone();
        let state_changed = AnalyticsEvent::StateChanged {
            from,
            to,
            trigger,
            days_inactive,
            response_type,
            unprompted_return,
            preferred_destination: profile.preferred_destination,
        };
        tokio::spawn(async move {
            emit_swallowing_errors(analytics.as_ref(), state_changed).await;
        });

        if let Some(response_type) = response_type {
            let hours_waited = metadata.get("hours_waited").and_then(|v| v.as_i64()).unwrap_or(0);
            let days_since_goodbye = metadata
                .get("days_since_goodbye")
                .and_then(|v| v.as_i64())
                .unwrap_or(0);
            let analytics = self.analytics.clone();
            let event = AnalyticsEvent::GoodbyeResponse {
                response_type,
                days_since_goodbye,
                hours_waited,
                from,
                to,
            };
            tokio::spawn(async move {
                emit_swallowing_errors(analytics.as_ref(), event).await;
            });
        }

        if unprompted_return {
            let analytics = self.analytics.clone();
            let event = AnalyticsEvent::UnpromptedReturn {
                days_inactive,
                previous_state: from,
            };
            tokio::spawn(async move {
                emit_swallowing_errors(analytics.as_ref(), event).await;
            });
        }
    }

    fn enqueue_goodbye(&self, user_id: &UserId, profile: &UserProfile) {
        let params = serde_json::json!({ "locale": profile.preferred_language });
        if let Err(e) = self.queue.enqueue(
            user_id,
            MessageType::Goodbye,
            "goodbye.default",
            params,
            profile.preferred_destination,
            &profile.destination_address,
        ) {
            error!(error = %e, "goodbye enqueue failed, swallowed");
        }
    }
}

fn days_between(now: DateTime<Utc>, past: DateTime<Utc>) -> i64 {
    let secs = (now - past).num_seconds();
    if secs <= 0 {
        0
    } else {
        secs / 86_400
    }
}

fn hours_between(now: DateTime<Utc>, past: DateTime<Utc>) -> i64 {
    let secs = (now - past).num_seconds();
    if secs <= 0 {
        0
    } else {
        secs / 3_600
    }
}
