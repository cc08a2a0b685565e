use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque user identifier. Never parsed or interpreted by this crate —
/// callers own the identity scheme (channel account, internal account id, …).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One of the five stable conditions of a user with respect to re-engagement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementState {
    Active,
    GoodbyeSent,
    HelpFlow,
    RemindLater,
    Dormant,
}

impl fmt::Display for EngagementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngagementState::Active => "active",
            EngagementState::GoodbyeSent => "goodbye_sent",
            EngagementState::HelpFlow => "help_flow",
            EngagementState::RemindLater => "remind_later",
            EngagementState::Dormant => "dormant",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for EngagementState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EngagementState::Active),
            "goodbye_sent" => Ok(EngagementState::GoodbyeSent),
            "help_flow" => Ok(EngagementState::HelpFlow),
            "remind_later" => Ok(EngagementState::RemindLater),
            "dormant" => Ok(EngagementState::Dormant),
            other => Err(format!("unknown engagement state: {other}")),
        }
    }
}

/// A named event that may cause a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    UserMessage,
    Inactivity14d,
    GoodbyeResponse1,
    GoodbyeResponse2,
    GoodbyeResponse3,
    GoodbyeTimeout,
    ReminderDue,
}

impl Trigger {
    /// True for the three `goodbye_response_N` variants.
    pub fn is_goodbye_response(&self) -> bool {
        matches!(
            self,
            Trigger::GoodbyeResponse1 | Trigger::GoodbyeResponse2 | Trigger::GoodbyeResponse3
        )
    }

    /// True for the goodbye-variant triggers that carry a `response_type`
    /// in transition metadata (the three responses plus the timeout).
    pub fn is_goodbye_variant(&self) -> bool {
        self.is_goodbye_response() || matches!(self, Trigger::GoodbyeTimeout)
    }

    /// §4.3 step 4: `trigger_source` is `scheduler` for these three, `user_message` otherwise.
    pub fn source(&self) -> TriggerSource {
        match self {
            Trigger::Inactivity14d | Trigger::GoodbyeTimeout | Trigger::ReminderDue => {
                TriggerSource::Scheduler
            }
            _ => TriggerSource::UserMessage,
        }
    }

    /// Maps a goodbye-variant trigger to its analytics `response_type`. `None` for
    /// triggers with no goodbye-response semantics.
    pub fn response_type(&self) -> Option<ResponseType> {
        match self {
            Trigger::GoodbyeResponse1 => Some(ResponseType::Confused),
            Trigger::GoodbyeResponse2 => Some(ResponseType::Busy),
            Trigger::GoodbyeResponse3 => Some(ResponseType::AllGood),
            Trigger::GoodbyeTimeout => Some(ResponseType::Timeout),
            _ => None,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Trigger::UserMessage => "user_message",
            Trigger::Inactivity14d => "inactivity_14d",
            Trigger::GoodbyeResponse1 => "goodbye_response_1",
            Trigger::GoodbyeResponse2 => "goodbye_response_2",
            Trigger::GoodbyeResponse3 => "goodbye_response_3",
            Trigger::GoodbyeTimeout => "goodbye_timeout",
            Trigger::ReminderDue => "reminder_due",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Trigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_message" => Ok(Trigger::UserMessage),
            "inactivity_14d" => Ok(Trigger::Inactivity14d),
            "goodbye_response_1" => Ok(Trigger::GoodbyeResponse1),
            "goodbye_response_2" => Ok(Trigger::GoodbyeResponse2),
            "goodbye_response_3" => Ok(Trigger::GoodbyeResponse3),
            "goodbye_timeout" => Ok(Trigger::GoodbyeTimeout),
            "reminder_due" => Ok(Trigger::ReminderDue),
            other => Err(format!("unknown trigger: {other}")),
        }
    }
}

/// Analytics-level classification of an exit from `goodbye_sent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Confused,
    Busy,
    AllGood,
    Timeout,
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResponseType::Confused => "confused",
            ResponseType::Busy => "busy",
            ResponseType::AllGood => "all_good",
            ResponseType::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

/// Where a transition originated — drives `metadata.trigger_source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    UserMessage,
    Scheduler,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriggerSource::UserMessage => "user_message",
            TriggerSource::Scheduler => "scheduler",
        };
        write!(f, "{s}")
    }
}

/// Whether proactive messages for a user are addressed to an individual chat
/// or an authorized group chat. Supplied by the opt-out/profile source — the
/// core never decides this, only carries it through to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Individual,
    Group,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Destination::Individual => "individual",
            Destination::Group => "group",
        };
        write!(f, "{s}")
    }
}

/// Side-effect tags the State Graph associates with an edge, consumed by the
/// Transition Engine to decide what to do after the row commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    GoodbyeTimerStarted,
    ReminderScheduled,
    ReactivatedUser,
    NoMessageSentByDesign,
    InitializedNewUser,
}

impl fmt::Display for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SideEffect::GoodbyeTimerStarted => "goodbye_timer_started",
            SideEffect::ReminderScheduled => "reminder_scheduled",
            SideEffect::ReactivatedUser => "reactivated_user",
            SideEffect::NoMessageSentByDesign => "no_message_sent_by_design",
            SideEffect::InitializedNewUser => "initialized_new_user",
        };
        write!(f, "{s}")
    }
}

/// Read-only profile fields the core consumes but never writes (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub reengagement_opt_out: bool,
    pub onboarding_tips_enabled: bool,
    pub preferred_language: String,
    pub preferred_destination: Destination,
    pub destination_address: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn state_roundtrips_through_display_and_fromstr() {
        for s in [
            EngagementState::Active,
            EngagementState::GoodbyeSent,
            EngagementState::HelpFlow,
            EngagementState::RemindLater,
            EngagementState::Dormant,
        ] {
            assert_eq!(EngagementState::from_str(&s.to_string()).unwrap(), s);
        }
    }

    #[test]
    fn trigger_roundtrips_through_display_and_fromstr() {
        for t in [
            Trigger::UserMessage,
            Trigger::Inactivity14d,
            Trigger::GoodbyeResponse1,
            Trigger::GoodbyeResponse2,
            Trigger::GoodbyeResponse3,
            Trigger::GoodbyeTimeout,
            Trigger::ReminderDue,
        ] {
            assert_eq!(Trigger::from_str(&t.to_string()).unwrap(), t);
        }
    }

    #[test]
    fn trigger_source_matches_spec_table() {
        assert_eq!(Trigger::Inactivity14d.source(), TriggerSource::Scheduler);
        assert_eq!(Trigger::GoodbyeTimeout.source(), TriggerSource::Scheduler);
        assert_eq!(Trigger::ReminderDue.source(), TriggerSource::Scheduler);
        assert_eq!(Trigger::UserMessage.source(), TriggerSource::UserMessage);
        assert_eq!(
            Trigger::GoodbyeResponse1.source(),
            TriggerSource::UserMessage
        );
    }

    #[test]
    fn response_type_mapping_matches_glossary() {
        assert_eq!(
            Trigger::GoodbyeResponse1.response_type(),
            Some(ResponseType::Confused)
        );
        assert_eq!(
            Trigger::GoodbyeResponse2.response_type(),
            Some(ResponseType::Busy)
        );
        assert_eq!(
            Trigger::GoodbyeResponse3.response_type(),
            Some(ResponseType::AllGood)
        );
        assert_eq!(
            Trigger::GoodbyeTimeout.response_type(),
            Some(ResponseType::Timeout)
        );
        assert_eq!(Trigger::UserMessage.response_type(), None);
    }
}
