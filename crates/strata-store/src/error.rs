use thiserror::Error;

/// Result type used by `strata-store`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors produced by backing store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("properties error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("node not found: {0}")]
    NotFound(String),

    #[error("not a folder: {0}")]
    NotAFolder(String),

    #[error("invalid store path: {0}")]
    InvalidPath(String),
}
