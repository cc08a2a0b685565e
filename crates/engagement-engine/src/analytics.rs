use async_trait::async_trait;
use engagement_core::{Destination, EngagementState, ResponseType, Trigger};
use tracing::error;

/// Events fired by the Transition Engine. Always `StateChanged`; the others
/// are conditional per §4.3's analytics-emission rules.
#[derive(Debug, Clone)]
pub enum AnalyticsEvent {
    StateChanged {
        from: EngagementState,
        to: EngagementState,
        trigger: Trigger,
        days_inactive: i64,
        response_type: Option<ResponseType>,
        unprompted_return: bool,
        preferred_destination: Destination,
    },
    GoodbyeResponse {
        response_type: ResponseType,
        days_since_goodbye: i64,
        hours_waited: i64,
        from: EngagementState,
        to: EngagementState,
    },
    UnpromptedReturn {
        days_inactive: i64,
        previous_state: EngagementState,
    },
}

/// Fire-and-forget metric emission. Implementations must never be allowed to
/// affect the outcome of a transition — the engine swallows every error this
/// trait can produce and only logs it.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn emit(&self, event: AnalyticsEvent) -> Result<(), String>;
}

/// Emits nothing. Useful as a default or in tests that don't assert on
/// analytics traffic.
#[derive(Debug, Default)]
pub struct NullAnalyticsSink;

#[async_trait]
impl AnalyticsSink for NullAnalyticsSink {
    async fn emit(&self, _event: AnalyticsEvent) -> Result<(), String> {
        Ok(())
    }
}

/// Emit `event` on `sink` without blocking the caller and without letting a
/// failure propagate. Mirrors the fire-and-forget dispatch the rest of this
/// codebase uses for side effects that must never undo a committed write.
pub async fn emit_swallowing_errors(sink: &(dyn AnalyticsSink), event: AnalyticsEvent) {
    if let Err(e) = sink.emit(event).await {
        error!(error = %e, "analytics emission failed, swallowed");
    }
}
