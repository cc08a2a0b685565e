use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("sender drain failed: {0}")]
    Sender(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
