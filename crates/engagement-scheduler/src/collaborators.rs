use async_trait::async_trait;
use engagement_core::{UserId, UserProfile};

use crate::error::SchedulerError;

/// Read-only fetch of the opt-out/profile fields the engine consumes but
/// never writes (§6's "Opt-out source"). A real implementation reads from
/// whatever owns user accounts; this crate only ever calls it.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn get_profile(&self, user_id: &UserId) -> Option<UserProfile>;
}

/// Summary returned by a drain of the external message sender. Errors are
/// non-fatal to the driver (§4.6 step 4, §7 taxonomy item 8).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderSummary {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Drains the message queue. Treated as a black box per §6 — the driver
/// ignores the sender's own error reporting when aggregating its job result.
#[async_trait]
pub trait Sender: Send + Sync {
    async fn drain(&self) -> Result<SenderSummary, SchedulerError>;
}
