use thiserror::Error;

/// Result type used by `strata-core`.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors produced by identity-type validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid repository key: {0}")]
    InvalidRepoKey(String),

    #[error("invalid repository path: {0}")]
    InvalidPath(String),
}
