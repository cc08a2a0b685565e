//! `engagement-queue` — idempotent message queue (C4).

pub mod db;
pub mod error;
pub mod queue;
pub mod types;

pub use db::init_db;
pub use error::{QueueError, Result};
pub use queue::MessageQueue;
pub use types::{idempotency_key, MessageRow, MessageStatus, MessageType};
