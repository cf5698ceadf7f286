use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures reported by a [`crate::DocumentStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document {path} not found")]
    NotFound { path: String },

    #[error("store lock poisoned during {0}")]
    LockPoisoned(&'static str),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("document encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("document {path} is malformed: {reason}")]
    Malformed { path: String, reason: String },
}
