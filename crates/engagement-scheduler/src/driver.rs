use std::sync::Arc;
use std::time::Instant;

use engagement_core::{Clock, EngagementConfig, Trigger, UserId, UserProfile};
use engagement_engine::TransitionEngine;
use engagement_store::EngagementStore;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::collaborators::{ProfileSource, Sender};

/// One page of a cohort sweep. Tens of thousands of users is the nominal
/// target budget (spec.md §4.6); a single run processes at most this many
/// per cohort, which keeps the implementation simple and bounds worst-case
/// runtime without repaging into a cohort a prior page failed to shrink.
const COHORT_PAGE_SIZE: i64 = 10_000;

/// One user's failure inside a sweep, captured so the loop can continue.
#[derive(Debug, Clone)]
pub struct JobError {
    pub user_id: UserId,
    pub error: String,
}

/// Result of one `run_daily_job` invocation (§4.6).
#[derive(Debug, Clone, Default)]
pub struct DailyJobResult {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub duration_ms: u64,
    pub errors: Vec<JobError>,
    /// Set when the gap since the previous recorded run exceeds twice the
    /// configured `expected_run_interval` — observability only, mirrors the
    /// teacher's `mark_missed_on_startup` (§3's supplemented feature).
    pub missed_previous_run: bool,
}

fn default_profile(user_id: &UserId) -> UserProfile {
    warn!(user_id = %user_id, "no profile found, using non-opted-out default");
    UserProfile {
        reengagement_opt_out: false,
        onboarding_tips_enabled: false,
        preferred_language: "en".to_string(),
        preferred_destination: engagement_core::Destination::Individual,
        destination_address: user_id.to_string(),
    }
}

/// Batch job scanning the three cohorts and draining the message queue
/// (C6). Every phase isolates per-user failures into `errors[]` rather than
/// aborting the run.
pub struct DailyDriver {
    store: Arc<EngagementStore>,
    engine: Arc<TransitionEngine>,
    profiles: Arc<dyn ProfileSource>,
    sender: Arc<dyn Sender>,
    config: EngagementConfig,
    clock: Arc<dyn Clock>,
}

impl DailyDriver {
    pub fn new(
        store: Arc<EngagementStore>,
        engine: Arc<TransitionEngine>,
        profiles: Arc<dyn ProfileSource>,
        sender: Arc<dyn Sender>,
        config: EngagementConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            engine,
            profiles,
            sender,
            config,
            clock,
        }
    }

    /// Compare the gap since the last recorded run against twice the
    /// configured cadence; anything wider is flagged as a likely missed run.
    fn check_missed_run(&self, result: &mut DailyJobResult) {
        match self.store.last_driver_run() {
            Ok(Some(last)) => {
                let gap = self.clock.now() - last;
                if gap > self.config.expected_run_interval() * 2 {
                    warn!(gap_secs = gap.num_seconds(), "daily driver run appears to have been missed");
                    result.missed_previous_run = true;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "could not read last driver run timestamp"),
        }
    }

    /// Run the job to completion with no cancellation support.
    pub async fn run_daily_job(&self) -> DailyJobResult {
        let (_tx, rx) = watch::channel(false);
        self.run_daily_job_cancellable(rx).await
    }

    /// Run the job, checking `cancel` between users. Cancellation never
    /// interrupts a user mid-transition (§4.6's "Cancellation and timeouts").
    #[instrument(skip(self, cancel))]
    pub async fn run_daily_job_cancellable(&self, mut cancel: watch::Receiver<bool>) -> DailyJobResult {
        let started = Instant::now();
        let mut result = DailyJobResult::default();

        info!("daily driver starting");
        self.check_missed_run(&mut result);

        // Phase 1: inactivity sweep.
        if let Ok(cohort) = self.store.inactive_cohort(self.config.inactivity_threshold(), COHORT_PAGE_SIZE) {
            for row in cohort {
                if *cancel.borrow_and_update() {
                    info!("daily driver cancelled during inactivity sweep");
                    result.duration_ms = started.elapsed().as_millis() as u64;
                    return result;
                }
                let profile = self
                    .profiles
                    .get_profile(&row.user_id)
                    .await
                    .unwrap_or_else(|| default_profile(&row.user_id));
                if profile.reengagement_opt_out {
                    result.skipped += 1;
                    continue;
                }
                self.invoke(&row.user_id, Trigger::Inactivity14d, &profile, &mut result)
                    .await;
            }
        } else {
            warn!("inactivity cohort query failed");
        }

        // Phase 2: goodbye timeout sweep. Opt-out is not consulted.
        if let Ok(cohort) = self.store.expired_goodbye_cohort(COHORT_PAGE_SIZE) {
            for row in cohort {
                if *cancel.borrow_and_update() {
                    info!("daily driver cancelled during goodbye timeout sweep");
                    result.duration_ms = started.elapsed().as_millis() as u64;
                    return result;
                }
                let profile = self
                    .profiles
                    .get_profile(&row.user_id)
                    .await
                    .unwrap_or_else(|| default_profile(&row.user_id));
                self.invoke(&row.user_id, Trigger::GoodbyeTimeout, &profile, &mut result)
                    .await;
            }
        } else {
            warn!("expired-goodbye cohort query failed");
        }

        // Phase 3: reminder sweep.
        if let Ok(cohort) = self.store.due_reminder_cohort(COHORT_PAGE_SIZE) {
            for row in cohort {
                if *cancel.borrow_and_update() {
                    info!("daily driver cancelled during reminder sweep");
                    result.duration_ms = started.elapsed().as_millis() as u64;
                    return result;
                }
                let profile = self
                    .profiles
                    .get_profile(&row.user_id)
                    .await
                    .unwrap_or_else(|| default_profile(&row.user_id));
                self.invoke(&row.user_id, Trigger::ReminderDue, &profile, &mut result)
                    .await;
            }
        } else {
            warn!("due-reminder cohort query failed");
        }

        // Phase 4: queue drain. Sender failures are logged, never fatal.
        match self.sender.drain().await {
            Ok(summary) => info!(
                processed = summary.processed,
                succeeded = summary.succeeded,
                failed = summary.failed,
                "sender drain completed"
            ),
            Err(e) => warn!(error = %e, "sender drain failed, swallowed"),
        }

        if let Err(e) = self.store.record_driver_run(self.clock.now()) {
            warn!(error = %e, "failed to stamp daily driver completion, swallowed");
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            processed = result.processed,
            succeeded = result.succeeded,
            failed = result.failed,
            skipped = result.skipped,
            duration_ms = result.duration_ms,
            "daily driver finished"
        );
        result
    }

    async fn invoke(
        &self,
        user_id: &UserId,
        trigger: Trigger,
        profile: &UserProfile,
        result: &mut DailyJobResult,
    ) {
        let outcome = self.engine.transition(user_id, trigger, None, profile).await;
        result.processed += 1;
        if outcome.success {
            result.succeeded += 1;
        } else {
            result.failed += 1;
            result.errors.push(JobError {
                user_id: user_id.clone(),
                error: outcome.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
    }
}
