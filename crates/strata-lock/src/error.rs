use std::time::Duration;

use strata_core::RepoPath;
use thiserror::Error;

use crate::manager::LockMode;

/// Result type used by `strata-lock`.
pub type LockResult<T> = Result<T, LockError>;

/// Locking failures. All of them mean the caller must abort its unit of
/// work; the manager never retries internally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("timed out after {waited:?} waiting for {mode:?} lock on {path}")]
    Timeout {
        path: RepoPath,
        mode: LockMode,
        waited: Duration,
    },

    /// The session already holds READ on this path. Escalation to WRITE is
    /// explicit: release the READ and request WRITE.
    #[error("cannot escalate READ to WRITE on {path} while READ is held")]
    WouldEscalate { path: RepoPath },

    /// `reacquire_read` on a path this session never locked.
    #[error("session never held a lock on {path}")]
    NeverHeld { path: RepoPath },
}
