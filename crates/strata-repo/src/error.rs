use strata_core::RepoPath;
use thiserror::Error;

/// Result type used by `strata-repo`.
pub type RepoResult<T> = Result<T, RepoError>;

/// Engine error taxonomy.
///
/// Propagation policy: locking and backing-store failures always reach the
/// initiating session, which must roll back as a unit. Origin failures are
/// recovered locally when the owning remote repo runs with `hard_fail =
/// false` (degrade to stale-or-missing) and propagated otherwise. Metadata
/// worker failures are caught per key and logged, never surfaced here.
#[derive(Debug, Error)]
pub enum RepoError {
    /// Path absent from the addressed repository. Surfaced as HTTP 404.
    #[error("not found: {0}")]
    ItemNotFound(RepoPath),

    /// No repository is registered under this key. Surfaced as HTTP 404.
    #[error("no such repository: {0}")]
    RepoNotFound(String),

    /// The path names a folder where a file was required.
    #[error("expected a file at {0}")]
    FileExpected(RepoPath),

    /// Lock timeout or illegal reacquire. The caller must abort its unit of
    /// work; retrying the whole operation is the caller's decision.
    #[error(transparent)]
    Locking(#[from] strata_lock::LockError),

    /// Unexpected backing-store failure. Wrapped and rethrown, never
    /// swallowed.
    #[error("backing store failure: {0}")]
    Storage(#[from] strata_store::StoreError),

    /// The origin answered but the content failed validation or
    /// transformation. Kept distinct from transport failure because callers
    /// cache the two differently: bad content is never cached, confirmed
    /// network failures are.
    #[error("bad origin content at {path}: {reason}")]
    BadOriginContent { path: RepoPath, reason: String },

    /// Transport failure talking to a remote origin.
    #[error(transparent)]
    Net(#[from] strata_net::NetError),

    /// Two repositories configured under one key (cache keys included).
    #[error("repository key already in use: {0}")]
    KeyConflict(String),

    /// Operation not supported by the addressed repository kind.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Core(#[from] strata_core::CoreError),
}

impl RepoError {
    /// HTTP status the front end maps this error to.
    pub fn status_code(&self) -> u16 {
        match self {
            // Content that failed transformation is served to nobody; it
            // surfaces as unfound, with the reason kept server-side.
            Self::ItemNotFound(_) | Self::RepoNotFound(_) | Self::BadOriginContent { .. } => 404,
            Self::Unsupported(_) => 405,
            Self::FileExpected(_)
            | Self::Locking(_)
            | Self::Storage(_)
            | Self::Net(_)
            | Self::KeyConflict(_)
            | Self::Core(_) => 500,
        }
    }
}
