#![forbid(unsafe_code)]

//! Per-[`RepoPath`](strata_core::RepoPath) read/write locking scoped to a
//! session (one unit of work).
//!
//! The manager is advisory-but-mandatory: every core write path goes through
//! it, nothing at the storage layer enforces it. It applies a bounded wait
//! with a configured timeout and fails fast instead of detecting cycles;
//! callers keep a consistent acquisition order (parent before child, lexical
//! among siblings) so cycles do not arise for the dominant workload of
//! independent file pairs.

mod error;
mod manager;

pub use error::{LockError, LockResult};
pub use manager::{LockEntry, LockManager, LockMode, LockOptions, SessionId};
