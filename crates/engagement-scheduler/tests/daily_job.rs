use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use engagement_core::{Destination, EngagementConfig, FixedClock, UserId, UserProfile};
use engagement_engine::{NullAnalyticsSink, TransitionEngine};
use engagement_queue::MessageQueue;
use engagement_scheduler::{DailyDriver, ProfileSource, SchedulerError, Sender, SenderSummary};
use engagement_store::{EngagementStore, StatePatch, TimestampPatch};
use rusqlite::Connection;

struct FixedProfileSource {
    opt_out: bool,
}

#[async_trait]
impl ProfileSource for FixedProfileSource {
    async fn get_profile(&self, user_id: &UserId) -> Option<UserProfile> {
        Some(UserProfile {
            reengagement_opt_out: self.opt_out,
            onboarding_tips_enabled: true,
            preferred_language: "en".to_string(),
            preferred_destination: Destination::Individual,
            destination_address: user_id.to_string(),
        })
    }
}

struct NoopSender;

#[async_trait]
impl Sender for NoopSender {
    async fn drain(&self) -> Result<SenderSummary, SchedulerError> {
        Ok(SenderSummary::default())
    }
}

fn dt(s: &str) -> chrono::DateTime<Utc> {
    Utc.datetime_from_str(s, "%Y-%m-%dT%H:%M:%SZ").unwrap()
}

fn build(
    clock_at: chrono::DateTime<Utc>,
    opt_out: bool,
) -> (
    Arc<EngagementStore>,
    Arc<TransitionEngine>,
    Arc<FixedClock>,
    DailyDriver,
    Arc<MessageQueue>,
) {
    let store_conn = Connection::open_in_memory().unwrap();
    engagement_store::init_db(&store_conn).unwrap();
    let queue_conn = Connection::open_in_memory().unwrap();
    engagement_queue::init_db(&queue_conn).unwrap();

    let clock = Arc::new(FixedClock::new(clock_at));
    let store = Arc::new(EngagementStore::new(store_conn, clock.clone()));
    let queue = Arc::new(MessageQueue::new(queue_conn, clock.clone()));
    let engine = Arc::new(TransitionEngine::new(
        store.clone(),
        queue.clone(),
        Arc::new(NullAnalyticsSink),
        EngagementConfig::default(),
        clock.clone(),
    ));
    let profiles = Arc::new(FixedProfileSource { opt_out });
    let sender = Arc::new(NoopSender);
    let driver = DailyDriver::new(
        store.clone(),
        engine.clone(),
        profiles,
        sender,
        EngagementConfig::default(),
        clock.clone(),
    );
    (store, engine, clock, driver, queue)
}

#[tokio::test]
async fn scenario_1_inactivity_boundary_sends_goodbye_once() {
    let (store, _engine, clock, driver, _queue) = build(dt("2025-01-15T00:00:00Z"), false);
    let user = UserId::from("u1");
    let row = store.create(&user).unwrap();
    store
        .conditional_update(
            &user,
            row.updated_at,
            &StatePatch {
                last_activity_at: Some(dt("2024-12-31T00:00:00Z")),
                ..Default::default()
            },
        )
        .unwrap();

    let result = driver.run_daily_job().await;
    assert_eq!(result.succeeded, 1);
    assert_eq!(result.failed, 0);

    let after = store.get(&user).unwrap().unwrap();
    assert_eq!(after.state, engagement_core::EngagementState::GoodbyeSent);

    // Re-run the next day: already transitioned out of `active`, no-op.
    clock.advance(chrono::Duration::days(1));
    let result2 = driver.run_daily_job().await;
    assert_eq!(result2.succeeded, 0);
    assert_eq!(result2.processed, 0);

    let still = store.get(&user).unwrap().unwrap();
    assert_eq!(still.state, engagement_core::EngagementState::GoodbyeSent);
}

#[tokio::test]
async fn scenario_2_below_threshold_makes_no_change() {
    let (store, _engine, _clock, driver, _queue) = build(dt("2025-01-15T00:00:00Z"), false);
    let user = UserId::from("u1");
    let row = store.create(&user).unwrap();
    store
        .conditional_update(
            &user,
            row.updated_at,
            &StatePatch {
                last_activity_at: Some(dt("2025-01-02T00:00:00Z")),
                ..Default::default()
            },
        )
        .unwrap();

    let result = driver.run_daily_job().await;
    assert_eq!(result.processed, 0);

    let after = store.get(&user).unwrap().unwrap();
    assert_eq!(after.state, engagement_core::EngagementState::Active);
}

#[tokio::test]
async fn scenario_3_48h_timeout_sends_no_message() {
    let (store, _engine, _clock, driver, _queue) = build(dt("2025-01-15T00:00:00Z"), false);
    let user = UserId::from("u1");
    let row = store.create(&user).unwrap();
    store
        .conditional_update(
            &user,
            row.updated_at,
            &StatePatch {
                state: Some(engagement_core::EngagementState::GoodbyeSent),
                last_activity_at: Some(dt("2024-12-28T00:00:00Z")),
                goodbye_sent_at: TimestampPatch::Set(dt("2025-01-13T00:00:00Z")),
                goodbye_expires_at: TimestampPatch::Set(dt("2025-01-14T23:59:59Z")),
                ..Default::default()
            },
        )
        .unwrap();

    let result = driver.run_daily_job().await;
    assert_eq!(result.succeeded, 1);

    let after = store.get(&user).unwrap().unwrap();
    assert_eq!(after.state, engagement_core::EngagementState::Dormant);

    let history = store.transition_history(&user, 5, None).unwrap();
    assert_eq!(history[0].trigger, "goodbye_timeout");
    assert_eq!(history[0].metadata["response_type"], "timeout");
    assert!(history[0].metadata["hours_waited"].as_i64().unwrap() >= 48);
}

#[tokio::test]
async fn a_stale_previous_run_is_flagged_missed() {
    let (store, _engine, clock, driver, _queue) = build(dt("2025-01-15T00:00:00Z"), false);
    store.record_driver_run(dt("2025-01-10T00:00:00Z")).unwrap();

    let result = driver.run_daily_job().await;
    assert!(result.missed_previous_run);

    // Running again right after: the just-recorded stamp is fresh.
    clock.advance(chrono::Duration::hours(1));
    let result2 = driver.run_daily_job().await;
    assert!(!result2.missed_previous_run);
}

#[tokio::test]
async fn scenario_6_opted_out_user_is_skipped() {
    let (store, _engine, _clock, driver, _queue) = build(dt("2025-01-15T00:00:00Z"), true);
    let user = UserId::from("u1");
    let row = store.create(&user).unwrap();
    store
        .conditional_update(
            &user,
            row.updated_at,
            &StatePatch {
                last_activity_at: Some(dt("2024-12-16T00:00:00Z")),
                ..Default::default()
            },
        )
        .unwrap();

    let result = driver.run_daily_job().await;
    assert_eq!(result.skipped, 1);
    assert_eq!(result.processed, 0);

    let after = store.get(&user).unwrap().unwrap();
    assert_eq!(after.state, engagement_core::EngagementState::Active);
}

#[tokio::test]
async fn busy_response_then_reminder_sweep_matches_scenario_5() {
    let (store, engine, clock, driver, _queue) = build(dt("2025-01-15T00:00:00Z"), false);
    let user = UserId::from("u1");
    let row = store.create(&user).unwrap();
    store
        .conditional_update(
            &user,
            row.updated_at,
            &StatePatch {
                state: Some(engagement_core::EngagementState::GoodbyeSent),
                goodbye_sent_at: TimestampPatch::Set(dt("2025-01-10T00:00:00Z")),
                goodbye_expires_at: TimestampPatch::Set(dt("2025-01-12T00:00:00Z")),
                ..Default::default()
            },
        )
        .unwrap();

    let profile = UserProfile {
        reengagement_opt_out: false,
        onboarding_tips_enabled: true,
        preferred_language: "en".to_string(),
        preferred_destination: Destination::Individual,
        destination_address: user.to_string(),
    };

    let outcome = engine
        .transition(&user, engagement_core::Trigger::GoodbyeResponse2, None, &profile)
        .await;
    assert!(outcome.success);
    let after = store.get(&user).unwrap().unwrap();
    assert_eq!(after.state, engagement_core::EngagementState::RemindLater);
    assert!(after.remind_at.is_some());

    // 13 days later: job makes no change.
    clock.advance(chrono::Duration::days(13));
    let mid_run = driver.run_daily_job().await;
    assert_eq!(mid_run.processed, 0);

    // 14 days + 1 second later: transitions to dormant with no message.
    clock.advance(chrono::Duration::days(1) + chrono::Duration::seconds(1));
    let final_run = driver.run_daily_job().await;
    assert_eq!(final_run.succeeded, 1);
    let dormant = store.get(&user).unwrap().unwrap();
    assert_eq!(dormant.state, engagement_core::EngagementState::Dormant);
}

#[tokio::test]
async fn message_queue_never_sees_a_goodbye_timeout_enqueue() {
    let (store, engine, _clock, _driver, queue) = build(dt("2025-01-15T00:00:00Z"), false);
    let user = UserId::from("u1");
    let row = store.create(&user).unwrap();
    store
        .conditional_update(
            &user,
            row.updated_at,
            &StatePatch {
                state: Some(engagement_core::EngagementState::GoodbyeSent),
                goodbye_sent_at: TimestampPatch::Set(dt("2025-01-13T00:00:00Z")),
                goodbye_expires_at: TimestampPatch::Set(dt("2025-01-14T00:00:00Z")),
                ..Default::default()
            },
        )
        .unwrap();

    let profile = UserProfile {
        reengagement_opt_out: false,
        onboarding_tips_enabled: true,
        preferred_language: "en".to_string(),
        preferred_destination: Destination::Individual,
        destination_address: user.to_string(),
    };
    let outcome = engine
        .transition(&user, engagement_core::Trigger::GoodbyeTimeout, None, &profile)
        .await;
    assert!(outcome.success);
    assert!(outcome.side_effects.contains(&engagement_core::SideEffect::NoMessageSentByDesign));
    assert_eq!(queue.pending(10).unwrap().len(), 0);
}
