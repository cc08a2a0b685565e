//! `engagement-engine` — the Transition Engine (C3) and Activity Tracker
//! (C5), plus the analytics sink and goodbye-response classifier they share.

pub mod activity;
pub mod analytics;
pub mod engine;
pub mod response;

pub use activity::{ActivityContext, ActivityOutcome, ActivityTracker};
pub use analytics::{AnalyticsEvent, AnalyticsSink, NullAnalyticsSink};
pub use engine::{TransitionEngine, TransitionResult};
pub use response::classify_goodbye_response;
