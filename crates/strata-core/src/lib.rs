#![forbid(unsafe_code)]

//! Identity and classification primitives for the strata artifact repository.
//!
//! Everything above this crate keys its state on [`RepoPath`]: locks, caches,
//! metadata recalculation requests and trash entries all use the same
//! `(repository key, relative path)` identity.

mod classify;
mod error;
mod patterns;
mod repo_path;

pub use classify::{classify, ArtifactClass};
pub use error::{CoreError, CoreResult};
pub use patterns::PathPatterns;
pub use repo_path::RepoPath;
