use thiserror::Error;

/// Errors that can occur against the engagement state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No engagement row exists for the given user.
    #[error("no engagement state record for user {user_id}")]
    NotFound { user_id: String },

    /// A stored column held a value this crate doesn't know how to parse
    /// (a corrupted or hand-edited row, never produced by this crate itself).
    #[error("malformed row for user {user_id}: {reason}")]
    MalformedRow { user_id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
