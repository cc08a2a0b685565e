//! `engagement-graph` — the closed state graph (C1).
//!
//! A total function `(state, trigger) -> state?` plus the side-effect tags
//! each edge carries. The graph holds no state of its own and performs no
//! I/O; the Transition Engine (`engagement-engine`) is the only caller.

use engagement_core::{EngagementState as State, SideEffect, Trigger};

/// Result of a successful graph lookup: the destination state and the
/// side-effect tags the Transition Engine should act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub to: State,
    pub side_effects: &'static [SideEffect],
}

/// Look up the edge for `(from, trigger)`. Returns `None` when the pair is
/// not one of the ten valid combinations in spec.md §4.1 — callers must
/// reject this as an invalid transition, never persisting anything.
pub fn lookup(from: State, trigger: Trigger) -> Option<Edge> {
    use State::*;
    use Trigger::*;

    match (from, trigger) {
        (Active, Inactivity14d) => Some(Edge {
            to: GoodbyeSent,
            side_effects: &[SideEffect::GoodbyeTimerStarted],
        }),
        (GoodbyeSent, UserMessage) => Some(Edge {
            to: Active,
            side_effects: &[SideEffect::ReactivatedUser],
        }),
        (GoodbyeSent, GoodbyeResponse1) => Some(Edge {
            to: HelpFlow,
            side_effects: &[],
        }),
        (GoodbyeSent, GoodbyeResponse2) => Some(Edge {
            to: RemindLater,
            side_effects: &[SideEffect::ReminderScheduled],
        }),
        (GoodbyeSent, GoodbyeResponse3) => Some(Edge {
            to: Dormant,
            side_effects: &[],
        }),
        (GoodbyeSent, GoodbyeTimeout) => Some(Edge {
            to: Dormant,
            side_effects: &[SideEffect::NoMessageSentByDesign],
        }),
        (HelpFlow, UserMessage) => Some(Edge {
            to: Active,
            side_effects: &[SideEffect::ReactivatedUser],
        }),
        (RemindLater, UserMessage) => Some(Edge {
            to: Active,
            side_effects: &[SideEffect::ReactivatedUser],
        }),
        (RemindLater, ReminderDue) => Some(Edge {
            to: Dormant,
            side_effects: &[],
        }),
        (Dormant, UserMessage) => Some(Edge {
            to: Active,
            side_effects: &[SideEffect::ReactivatedUser],
        }),
        _ => None,
    }
}

/// All ten valid edges, for exhaustiveness tests and documentation/tooling.
pub const VALID_EDGES: &[(State, Trigger)] = &[
    (State::Active, Trigger::Inactivity14d),
    (State::GoodbyeSent, Trigger::UserMessage),
    (State::GoodbyeSent, Trigger::GoodbyeResponse1),
    (State::GoodbyeSent, Trigger::GoodbyeResponse2),
    (State::GoodbyeSent, Trigger::GoodbyeResponse3),
    (State::GoodbyeSent, Trigger::GoodbyeTimeout),
    (State::HelpFlow, Trigger::UserMessage),
    (State::RemindLater, Trigger::UserMessage),
    (State::RemindLater, Trigger::ReminderDue),
    (State::Dormant, Trigger::UserMessage),
];

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [State; 5] = [
        State::Active,
        State::GoodbyeSent,
        State::HelpFlow,
        State::RemindLater,
        State::Dormant,
    ];

    const ALL_TRIGGERS: [Trigger; 7] = [
        Trigger::UserMessage,
        Trigger::Inactivity14d,
        Trigger::GoodbyeResponse1,
        Trigger::GoodbyeResponse2,
        Trigger::GoodbyeResponse3,
        Trigger::GoodbyeTimeout,
        Trigger::ReminderDue,
    ];

    #[test]
    fn every_listed_valid_edge_resolves() {
        for &(from, trigger) in VALID_EDGES {
            assert!(
                lookup(from, trigger).is_some(),
                "expected {from} + {trigger} to be a valid edge"
            );
        }
    }

    #[test]
    fn exactly_ten_edges_are_valid_across_the_full_cross_product() {
        let mut found = 0;
        for &from in &ALL_STATES {
            for &trigger in &ALL_TRIGGERS {
                if lookup(from, trigger).is_some() {
                    found += 1;
                }
            }
        }
        assert_eq!(found, 10);
        assert_eq!(VALID_EDGES.len(), 10);
    }

    #[test]
    fn goodbye_timeout_is_tagged_silent() {
        let edge = lookup(State::GoodbyeSent, Trigger::GoodbyeTimeout).unwrap();
        assert_eq!(edge.to, State::Dormant);
        assert!(edge
            .side_effects
            .contains(&SideEffect::NoMessageSentByDesign));
    }

    #[test]
    fn entering_active_is_tagged_reactivated_except_initialization() {
        // Every edge in the graph that lands on Active is a genuine
        // reactivation — initialization is handled outside the graph (C3
        // step 1), so the graph itself has no "create" edge to special-case.
        for &from in &[State::GoodbyeSent, State::HelpFlow, State::RemindLater, State::Dormant] {
            let edge = lookup(from, Trigger::UserMessage).unwrap();
            assert_eq!(edge.to, State::Active);
            assert!(edge.side_effects.contains(&SideEffect::ReactivatedUser));
        }
    }

    #[test]
    fn invalid_combinations_return_none() {
        assert!(lookup(State::Active, Trigger::GoodbyeTimeout).is_none());
        assert!(lookup(State::Active, Trigger::ReminderDue).is_none());
        assert!(lookup(State::Dormant, Trigger::Inactivity14d).is_none());
        assert!(lookup(State::HelpFlow, Trigger::GoodbyeResponse1).is_none());
        assert!(lookup(State::Active, Trigger::GoodbyeResponse1).is_none());
    }
}
