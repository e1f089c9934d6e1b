//! Shared error taxonomy and result alias
//!
//! Every component surfaces one of four error kinds, and the server layers
//! map them uniformly: HTTP status codes for synchronous callers, an `error`
//! event scoped to the initiating subscriber on the real-time path.

use thiserror::Error;

use crate::store::StoreError;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, AppError>;

/// Application-level error taxonomy
#[derive(Debug, Error)]
pub enum AppError {
    /// A referenced folder, item or entity does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Empty or malformed input (e.g. a patch with no fields)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An operation observed an unexpected state, e.g. a containment cycle
    /// or a row that vanished mid-transaction. Surfaced, never swallowed.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backing store aborted a transaction; all contained writes were
    /// rolled back.
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

impl AppError {
    /// Machine-readable kind, used in structured error payloads
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "notFound",
            AppError::InvalidArgument(_) => "invalidArgument",
            AppError::Conflict(_) => "conflict",
            AppError::Store(_) => "storeFailure",
        }
    }

    /// HTTP status code equivalent for synchronous callers
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::NotFound(_) => 404,
            AppError::InvalidArgument(_) => 400,
            AppError::Conflict(_) => 409,
            AppError::Store(_) => 500,
        }
    }
}
