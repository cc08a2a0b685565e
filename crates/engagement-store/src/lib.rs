//! `engagement-store` — SQLite-backed persistence for engagement rows and
//! the append-only transition log (C2).

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use db::init_db;
pub use error::{Result, StoreError};
pub use store::EngagementStore;
pub use types::{
    AggregateStats, EngagementRow, StatePatch, TimestampPatch, TransitionLogRow, UpdateOutcome,
};
