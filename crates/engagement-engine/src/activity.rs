use std::sync::Arc;

use engagement_core::{Clock, Destination, EngagementState, Trigger, UserId, UserProfile};
use engagement_store::EngagementStore;
use serde_json::Map;
use tracing::{error, instrument};

use crate::engine::TransitionEngine;

/// Inbound-message context passed to `check_and_record_activity`.
#[derive(Debug, Clone)]
pub struct ActivityContext {
    pub is_group: bool,
    pub group_address: Option<String>,
    pub message_text: String,
    pub is_goodbye_response: bool,
}

/// Result of processing one inbound message through the Activity Tracker.
#[derive(Debug, Clone)]
pub struct ActivityOutcome {
    pub is_first_message: bool,
    pub user_id: UserId,
    pub preferred_destination: Destination,
    pub engagement_state: EngagementState,
    pub reactivated: bool,
    pub previous_state: Option<EngagementState>,
}

/// Per-inbound-message entry point (C5): initializes new users, updates
/// activity, and triggers auto-reactivation. On the hot path for every
/// inbound message — must stay far under the store's own latency budget.
pub struct ActivityTracker {
    store: Arc<EngagementStore>,
    engine: Arc<TransitionEngine>,
    clock: Arc<dyn Clock>,
}

impl ActivityTracker {
    pub fn new(store: Arc<EngagementStore>, engine: Arc<TransitionEngine>, clock: Arc<dyn Clock>) -> Self {
        Self { store, engine, clock }
    }

    #[instrument(skip(self, context, profile), fields(user_id = %user_id))]
    pub async fn check_and_record_activity(
        &self,
        user_id: &UserId,
        context: ActivityContext,
        profile: &UserProfile,
    ) -> ActivityOutcome {
        let preferred_destination = if context.is_group {
            Destination::Group
        } else {
            Destination::Individual
        };

        // Step 2: read or create. A concurrent-create collision is not an
        // error — the other writer won and we simply observe its row.
        let row = match self.store.get(user_id) {
            Ok(Some(row)) => row,
            Ok(None) => match self.store.create(user_id) {
                Ok(row) => {
                    return ActivityOutcome {
                        is_first_message: true,
                        user_id: user_id.clone(),
                        preferred_destination,
                        engagement_state: row.state,
                        reactivated: false,
                        previous_state: None,
                    };
                }
                Err(e) => {
                    error!(error = %e, "store create failed during activity tracking");
                    return ActivityOutcome {
                        is_first_message: false,
                        user_id: user_id.clone(),
                        preferred_destination,
                        engagement_state: EngagementState::Active,
                        reactivated: false,
                        previous_state: None,
                    };
                }
            },
            Err(e) => {
                error!(error = %e, "store read failed during activity tracking, degrading to absent");
                match self.store.create(user_id) {
                    Ok(row) => {
                        return ActivityOutcome {
                            is_first_message: true,
                            user_id: user_id.clone(),
                            preferred_destination,
                            engagement_state: row.state,
                            reactivated: false,
                            previous_state: None,
                        };
                    }
                    Err(e) => {
                        error!(error = %e, "store create failed recovering from read error");
                        return ActivityOutcome {
                            is_first_message: false,
                            user_id: user_id.clone(),
                            preferred_destination,
                            engagement_state: EngagementState::Active,
                            reactivated: false,
                            previous_state: None,
                        };
                    }
                }
            }
        };

        // Step 3: unconditional activity write — intentionally races the
        // conditional state update performed below (§4.5, §9).
        if let Err(e) = self.store.touch_activity(user_id) {
            error!(error = %e, "activity touch failed, swallowed");
        }

        let previous_state = row.state;
        let mut reactivated = false;
        let mut engagement_state = row.state;

        // Step 4: auto-reactivation.
        if previous_state == EngagementState::Dormant {
            let days_inactive = days_between(self.clock.now(), row.last_activity_at);
            let mut metadata = Map::new();
            metadata.insert(
                "unprompted_return".to_string(),
                serde_json::Value::Bool(days_inactive >= 3),
            );
            metadata.insert("days_inactive".to_string(), serde_json::Value::from(days_inactive));
            metadata.insert(
                "reactivation_source".to_string(),
                serde_json::Value::from("user_message"),
            );
            let result = self
                .engine
                .transition(user_id, Trigger::UserMessage, Some(metadata), profile)
                .await;
            if result.success {
                reactivated = true;
                engagement_state = EngagementState::Active;
            }
        } else if previous_state == EngagementState::GoodbyeSent && !context.is_goodbye_response {
            let days_inactive = days_between(self.clock.now(), row.last_activity_at);
            let mut metadata = Map::new();
            metadata.insert(
                "reactivation_source".to_string(),
                serde_json::Value::from("non_response_message"),
            );
            metadata.insert("days_inactive".to_string(), serde_json::Value::from(days_inactive));
            let result = self
                .engine
                .transition(user_id, Trigger::UserMessage, Some(metadata), profile)
                .await;
            if result.success {
                reactivated = true;
                engagement_state = EngagementState::Active;
            }
        }
        // previous_state = goodbye_sent && is_goodbye_response: no auto-reactivation —
        // the caller dispatches to the goodbye-response handler instead.

        ActivityOutcome {
            is_first_message: false,
            user_id: user_id.clone(),
            preferred_destination,
            engagement_state,
            reactivated,
            previous_state: Some(previous_state),
        }
    }
}

fn days_between(now: chrono::DateTime<chrono::Utc>, past: chrono::DateTime<chrono::Utc>) -> i64 {
    let secs = (now - past).num_seconds();
    if secs <= 0 {
        0
    } else {
        secs / 86_400
    }
}
