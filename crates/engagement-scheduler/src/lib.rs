//! `engagement-scheduler` — the Daily Driver (C6): a batch job scanning the
//! three cohorts and draining the message queue once per run.

pub mod collaborators;
pub mod driver;
pub mod error;

pub use collaborators::{ProfileSource, Sender, SenderSummary};
pub use driver::{DailyDriver, DailyJobResult, JobError};
pub use error::{Result, SchedulerError};
