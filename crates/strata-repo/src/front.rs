//! Request-level dispatch onto the repository registry.
//!
//! This is the seam an HTTP layer plugs into: one request, one session, one
//! response. Status mapping lives here and in [`RepoError::status_code`].

use bytes::Bytes;
use strata_core::RepoPath;
use strata_store::Properties;
use tracing::debug;

use crate::{registry::Repo, RepoError, RepoRegistry, RepoResult, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Head,
    Mkcol,
}

/// One repository request, already split into key and relative path.
#[derive(Debug, Clone)]
pub struct RepoRequest {
    pub method: Method,
    pub repo_path: RepoPath,
    pub body: Option<Bytes>,
}

impl RepoRequest {
    pub fn get(repo_path: RepoPath) -> Self {
        Self {
            method: Method::Get,
            repo_path,
            body: None,
        }
    }

    pub fn head(repo_path: RepoPath) -> Self {
        Self {
            method: Method::Head,
            repo_path,
            body: None,
        }
    }

    pub fn put(repo_path: RepoPath, body: Bytes) -> Self {
        Self {
            method: Method::Put,
            repo_path,
            body: Some(body),
        }
    }

    pub fn mkcol(repo_path: RepoPath) -> Self {
        Self {
            method: Method::Mkcol,
            repo_path,
            body: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoResponse {
    pub status: u16,
    pub body: Option<Bytes>,
}

impl RepoResponse {
    fn ok(body: Option<Bytes>) -> Self {
        Self { status: 200, body }
    }

    fn created() -> Self {
        Self {
            status: 201,
            body: None,
        }
    }
}

/// Serve one request within the given session. The caller decides the
/// session outcome (commit on success, rollback on error).
pub async fn dispatch(
    registry: &RepoRegistry,
    session: &Session,
    request: &RepoRequest,
) -> RepoResult<RepoResponse> {
    let rp = &request.repo_path;
    let Some(repo) = registry.get(rp.repo_key()) else {
        return Err(RepoError::RepoNotFound(rp.repo_key().to_string()));
    };
    debug!(method = ?request.method, path = %rp, "dispatching");

    match request.method {
        Method::Get => {
            let content = fetch(registry, session, repo, rp).await?;
            Ok(RepoResponse::ok(Some(content)))
        }
        Method::Head => {
            fetch(registry, session, repo, rp).await?;
            Ok(RepoResponse::ok(None))
        }
        Method::Put => {
            let Repo::Local(local) = repo else {
                return Err(RepoError::Unsupported(format!(
                    "PUT to non-local repository {}",
                    rp.repo_key()
                )));
            };
            let body = request.body.clone().unwrap_or_default();
            local
                .save_resource(session, rp.path(), &body, Properties::new())
                .await?;
            Ok(RepoResponse::created())
        }
        Method::Mkcol => {
            let Repo::Local(local) = repo else {
                return Err(RepoError::Unsupported(format!(
                    "MKCOL on non-local repository {}",
                    rp.repo_key()
                )));
            };
            local.add_folder(session, rp.path()).await?;
            Ok(RepoResponse::created())
        }
    }
}

async fn fetch(
    registry: &RepoRegistry,
    session: &Session,
    repo: &Repo,
    rp: &RepoPath,
) -> RepoResult<Bytes> {
    match repo {
        Repo::Local(local) => local.read(session, rp.path()).await,
        Repo::Remote(remote) => remote.retrieve(session, rp.path()).await,
        Repo::Virtual(virt) => Ok(virt
            .retrieve(registry, session, rp.path())
            .await?
            .content),
    }
}
