//! `engagement-core` — shared types, configuration, and the injectable clock
//! used across the engagement state-machine and scheduler subsystem.

pub mod clock;
pub mod config;
pub mod error;
pub mod telemetry;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::EngagementConfig;
pub use error::{CoreError, Result};
pub use types::{
    Destination, EngagementState, ResponseType, SideEffect, Trigger, TriggerSource, UserId,
    UserProfile,
};
