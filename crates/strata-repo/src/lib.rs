#![forbid(unsafe_code)]

//! Repository-path concurrency and resolution engine.
//!
//! The engine manages three repository kinds behind one registry: local
//! repositories (deployed content), remote repositories (origin proxy plus
//! local cache with class-aware expiry) and virtual repositories (ordered
//! first-wins aggregation with POM cleanup). Every operation runs inside a
//! [`Session`], which scopes path locks and defers disposals to its commit.

pub mod expiry;
pub mod front;
pub mod pom;

mod error;
mod local;
mod metadata;
mod mover;
mod registry;
mod remote;
mod session;
mod trash;
mod virtual_repo;

pub use error::{RepoError, RepoResult};
pub use local::LocalRepo;
pub use metadata::{MetadataQueue, RecalcRequest};
pub use mover::{MoveOptions, MoveReport, Mover};
pub use registry::{MemberRepo, Repo, RepoRegistry};
pub use remote::RemoteRepo;
pub use session::Session;
pub use trash::Trash;
pub use virtual_repo::{ResolvedResource, VirtualRepo};
