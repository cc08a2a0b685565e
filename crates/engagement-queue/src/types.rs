use std::fmt;

use chrono::{DateTime, Utc};
use engagement_core::{Destination, UserId};
use serde_json::Value as Json;

/// Message type vocabulary used by the core. Only `Goodbye` is emitted by
/// the Transition Engine; the others exist so the same queue can be shared
/// with sibling drivers (weekly review, onboarding) outside this crate's
/// scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Goodbye,
    Reminder,
    WeeklyReview,
    Welcome,
    TierUnlock,
    HelpRestart,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageType::Goodbye => "goodbye",
            MessageType::Reminder => "reminder",
            MessageType::WeeklyReview => "weekly_review",
            MessageType::Welcome => "welcome",
            MessageType::TierUnlock => "tier_unlock",
            MessageType::HelpRestart => "help_restart",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "goodbye" => Ok(MessageType::Goodbye),
            "reminder" => Ok(MessageType::Reminder),
            "weekly_review" => Ok(MessageType::WeeklyReview),
            "welcome" => Ok(MessageType::Welcome),
            "tier_unlock" => Ok(MessageType::TierUnlock),
            "help_restart" => Ok(MessageType::HelpRestart),
            other => Err(format!("unknown message type: {other}")),
        }
    }
}

/// Lifecycle state of a queued message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Pending,
    Sent,
    Failed,
    Cancelled,
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Sent => "sent",
            MessageStatus::Failed => "failed",
            MessageStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MessageStatus::Pending),
            "sent" => Ok(MessageStatus::Sent),
            "failed" => Ok(MessageStatus::Failed),
            "cancelled" => Ok(MessageStatus::Cancelled),
            other => Err(format!("unknown message status: {other}")),
        }
    }
}

/// A row in the message queue, drained by an external sender (out of scope
/// for this crate — it is treated as a black box per spec.md §6).
#[derive(Debug, Clone)]
pub struct MessageRow {
    pub user_id: UserId,
    pub message_type: MessageType,
    pub message_key: String,
    pub message_params: Json,
    pub destination: Destination,
    pub destination_address: String,
    pub idempotency_key: String,
    pub status: MessageStatus,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
}

/// Compute the deterministic idempotency key for (user, type, calendar day).
/// Two enqueues for the same user/type on the same UTC day collapse to one
/// row via the queue's `UNIQUE` constraint.
pub fn idempotency_key(user_id: &UserId, message_type: MessageType, at: DateTime<Utc>) -> String {
    format!("{}:{}:{}", user_id.as_str(), message_type, at.format("%Y-%m-%d"))
}
