//! Error taxonomy. Submission errors (`DuplicateId`, `InvalidField`) and
//! fatal store errors (`SchemaMismatch`) are reported synchronously to
//! the caller; transient store errors (`StoreBusy`, and any underlying
//! busy/locked `sqlx::Error`) are handled internally by retrying — a
//! claim treats one as a miss, a settlement retries until it succeeds —
//! and should rarely escape to a caller at all.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job id \"{0}\" already exists")]
    DuplicateId(String),

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("store is busy, try again")]
    StoreBusy,

    #[error("store schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

impl QueueError {
    /// True for the class of errors a claim/settle retry loop should
    /// treat as transient — a write conflict or busy store, not a real
    /// failure.
    pub fn is_transient(&self) -> bool {
        match self {
            QueueError::StoreBusy => true,
            QueueError::Store(e) => is_busy(e),
            _ => false,
        }
    }
}

fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .map(|c| c == "5" || c == "6") // SQLITE_BUSY / SQLITE_LOCKED
            .unwrap_or(false),
        _ => false,
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
