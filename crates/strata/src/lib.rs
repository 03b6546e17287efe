#![forbid(unsafe_code)]

//! # Strata
//!
//! Facade crate for the strata binary artifact repository engine.
//!
//! ## Quick start
//!
//! ```ignore
//! use strata::prelude::*;
//!
//! let config = StrataConfig::new("/var/lib/strata")
//!     .with_local(LocalRepoConfig::new("libs-releases"))
//!     .with_remote(RemoteRepoConfig::new("central", "https://repo1.maven.org/maven2/"));
//! let service = Strata::open(config)?;
//!
//! let rp = RepoPath::new("central", "org/foo/1.0/foo-1.0.jar")?;
//! let response = service.handle(RepoRequest::get(rp)).await;
//! ```

// ── Re-export sub-crates ────────────────────────────────────────────────

pub mod core {
    pub use strata_core::*;
}

pub mod lock {
    pub use strata_lock::*;
}

pub mod net {
    pub use strata_net::*;
}

pub mod repo {
    pub use strata_repo::*;
}

pub mod store {
    pub use strata_store::*;
}

// ── Service ─────────────────────────────────────────────────────────────

mod config;
mod service;

pub use config::{LocalRepoConfig, RemoteRepoConfig, StrataConfig, VirtualRepoConfig};
pub use service::{Strata, StrataError, StrataResult};

// ── Prelude ─────────────────────────────────────────────────────────────

pub mod prelude {
    pub use strata_core::{PathPatterns, RepoPath};
    pub use strata_repo::{
        front::{Method, RepoRequest, RepoResponse},
        pom::PomCleanupPolicy,
        MoveOptions, RecalcRequest, RepoError, Session,
    };

    pub use crate::{
        LocalRepoConfig, RemoteRepoConfig, Strata, StrataConfig, StrataError, VirtualRepoConfig,
    };
}
