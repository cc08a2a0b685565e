use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("malformed queue row: {0}")]
    MalformedRow(String),
}

pub type Result<T> = std::result::Result<T, QueueError>;
