//! Service assembly and request entry point.

use std::{sync::Arc, time::Instant};

use strata_core::{PathPatterns, RepoPath};
use strata_lock::{LockManager, LockOptions};
use strata_net::{HttpOrigin, Origin, OriginOptions};
use strata_repo::{
    front::{self, RepoRequest, RepoResponse},
    LocalRepo, MetadataQueue, MoveOptions, MoveReport, Mover, RecalcRequest, RemoteRepo, Repo,
    RepoError, RepoRegistry, Session, Trash, VirtualRepo,
};
use strata_store::{BackingStore, FsStore, StoreError};
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::config::{RemoteRepoConfig, StrataConfig};

pub type StrataResult<T> = Result<T, StrataError>;

#[derive(Debug, Error)]
pub enum StrataError {
    /// Invalid configuration, rejected at startup.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// The assembled artifact repository service.
///
/// Owns the backing store, the lock manager, the repository registry, the
/// metadata queue and the trash, and serves requests one session each.
pub struct Strata {
    store: Arc<dyn BackingStore>,
    locks: Arc<LockManager>,
    trash: Arc<Trash>,
    metadata: MetadataQueue,
    registry: RepoRegistry,
    mover: Mover,
}

impl Strata {
    /// Open the service on a filesystem store rooted at the configured data
    /// directory, with an HTTP origin client for remote repositories.
    pub fn open(config: StrataConfig) -> StrataResult<Self> {
        let store: Arc<dyn BackingStore> = Arc::new(FsStore::open(&config.data_dir)?);
        let origin: Arc<dyn Origin> = Arc::new(HttpOrigin::new(OriginOptions::default()));
        Self::assemble(config, store, origin)
    }

    /// Assemble on explicit store and origin implementations. This is the
    /// seam tests and embedders use.
    pub fn assemble(
        config: StrataConfig,
        store: Arc<dyn BackingStore>,
        origin: Arc<dyn Origin>,
    ) -> StrataResult<Self> {
        let locks = Arc::new(LockManager::new(LockOptions {
            acquire_timeout: config.lock_timeout(),
        }));
        let trash = Arc::new(Trash::new(store.clone()));
        let metadata = MetadataQueue::new(store.clone(), locks.clone());
        let mover = Mover::new(store.clone(), locks.clone(), metadata.clone());

        let mut registry = RepoRegistry::new();

        for local in &config.local {
            let patterns = merge_patterns(&local.includes, &local.excludes, &config.global_excludes);
            registry.insert(Repo::Local(LocalRepo::new(
                &local.key,
                patterns,
                false,
                store.clone(),
                locks.clone(),
            )))?;
        }

        for remote in &config.remote {
            let repo = build_remote(
                remote,
                &config.global_excludes,
                store.clone(),
                locks.clone(),
                origin.clone(),
            )?;
            registry.insert(Repo::Remote(repo))?;
        }

        for virt in &config.virt {
            for member in &virt.members {
                match registry.get(member) {
                    None if registry.local_view(member).is_none() => {
                        return Err(StrataError::Config(format!(
                            "virtual repository {} references unknown member {member}",
                            virt.key
                        )));
                    }
                    Some(Repo::Virtual(_)) => {
                        return Err(StrataError::Config(format!(
                            "virtual repository {} cannot nest virtual member {member}",
                            virt.key
                        )));
                    }
                    _ => {}
                }
            }
            let patterns = merge_patterns(&virt.includes, &virt.excludes, &config.global_excludes);
            let storage = LocalRepo::new(
                &virt.key,
                PathPatterns::default(),
                false,
                store.clone(),
                locks.clone(),
            );
            registry.insert(Repo::Virtual(VirtualRepo::new(
                &virt.key,
                virt.members.clone(),
                virt.pom_cleanup_policy,
                patterns,
                storage,
            )))?;
        }

        let keys: Vec<&str> = registry.keys().collect();
        info!(repos = ?keys, "service assembled");
        Ok(Self {
            store,
            locks,
            trash,
            metadata,
            registry,
            mover,
        })
    }

    pub fn registry(&self) -> &RepoRegistry {
        &self.registry
    }

    pub fn metadata(&self) -> &MetadataQueue {
        &self.metadata
    }

    /// Open a fresh unit of work.
    pub fn new_session(&self) -> Session {
        Session::new(
            self.locks.clone(),
            self.store.clone(),
            self.trash.clone(),
            self.metadata.clone(),
        )
    }

    /// Serve one request in its own session: commit on success, roll back on
    /// failure, and map the outcome to a status code.
    pub async fn handle(&self, request: RepoRequest) -> RepoResponse {
        let started = Instant::now();
        let session = self.new_session();
        let outcome = match front::dispatch(&self.registry, &session, &request).await {
            Ok(response) => match session.commit().await {
                Ok(()) => response,
                Err(err) => {
                    error!(path = %request.repo_path, error = %err, "commit failed");
                    RepoResponse {
                        status: 500,
                        body: None,
                    }
                }
            },
            Err(err) => {
                session.rollback();
                let status = err.status_code();
                if status >= 500 {
                    error!(path = %request.repo_path, error = %err, "request failed");
                } else {
                    warn!(path = %request.repo_path, error = %err, "request refused");
                }
                RepoResponse { status, body: None }
            }
        };
        info!(
            method = ?request.method,
            path = %request.repo_path,
            status = outcome.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "access"
        );
        outcome
    }

    /// Remove a deployed item; the content reaches the trash on commit.
    pub async fn undeploy(&self, rp: &RepoPath) -> StrataResult<()> {
        let Some(local) = self.registry.local_view(rp.repo_key()) else {
            return Err(RepoError::RepoNotFound(rp.repo_key().to_string()).into());
        };
        let session = self.new_session();
        match local.undeploy(&session, rp.path()).await {
            Ok(()) => Ok(session.commit().await?),
            Err(err) => {
                session.rollback();
                Err(err.into())
            }
        }
    }

    /// Batch move/copy. Commits the session even for a multi-status outcome;
    /// only a whole-batch failure rolls back.
    pub async fn move_items(
        &self,
        pairs: &[(RepoPath, RepoPath)],
        options: MoveOptions,
    ) -> StrataResult<MoveReport> {
        let session = self.new_session();
        match self
            .mover
            .execute(&session, &self.registry, pairs, options)
            .await
        {
            Ok(report) => {
                session.commit().await?;
                Ok(report)
            }
            Err(err) => {
                session.rollback();
                Err(err.into())
            }
        }
    }

    /// Force-expire cached entries of a remote repository under `rel_path`.
    pub async fn zap(&self, remote_key: &str, rel_path: &str) -> StrataResult<usize> {
        let Some(remote) = self.registry.remote(remote_key) else {
            return Err(RepoError::RepoNotFound(remote_key.to_string()).into());
        };
        let session = self.new_session();
        match remote.zap(&session, rel_path).await {
            Ok(zapped) => {
                session.commit().await?;
                Ok(zapped)
            }
            Err(err) => {
                session.rollback();
                Err(err.into())
            }
        }
    }

    /// Send a remote repository's whole cache to the trash.
    pub async fn clear_cache(&self, remote_key: &str) -> StrataResult<()> {
        let Some(remote) = self.registry.remote(remote_key) else {
            return Err(RepoError::RepoNotFound(remote_key.to_string()).into());
        };
        let session = self.new_session();
        match remote.clear_cache(&session).await {
            Ok(()) => Ok(session.commit().await?),
            Err(err) => {
                session.rollback();
                Err(err.into())
            }
        }
    }

    /// Queue a whole-repository metadata recalculation.
    pub fn request_metadata_recalculation(&self, repo_key: &str) {
        self.metadata.request_recalculation(repo_key);
    }

    /// Run a metadata recalculation inline and wait for it.
    pub async fn calculate_metadata_now(&self, req: &RecalcRequest) -> StrataResult<()> {
        Ok(self.metadata.calculate_now(req).await?)
    }

    /// Dispose of every trash holding folder.
    pub async fn empty_trash(&self) -> StrataResult<()> {
        Ok(self.trash.empty().await?)
    }
}

fn merge_patterns(includes: &[String], excludes: &[String], global: &[String]) -> PathPatterns {
    let mut all_excludes = excludes.to_vec();
    all_excludes.extend(global.iter().cloned());
    PathPatterns::new(includes.to_vec(), all_excludes)
}

fn build_remote(
    config: &RemoteRepoConfig,
    global_excludes: &[String],
    store: Arc<dyn BackingStore>,
    locks: Arc<LockManager>,
    origin: Arc<dyn Origin>,
) -> StrataResult<RemoteRepo> {
    let base_url = Url::parse(&config.url).map_err(|e| {
        StrataError::Config(format!("remote {} has invalid url {}: {e}", config.key, config.url))
    })?;
    let patterns = merge_patterns(&config.includes, &config.excludes, global_excludes);
    let cache = LocalRepo::new(
        RemoteRepo::cache_key(&config.key),
        patterns,
        true,
        store,
        locks,
    );
    Ok(RemoteRepo::new(
        &config.key,
        base_url,
        strata_repo::expiry::ExpiryPolicy {
            retrieval_cache_period: std::time::Duration::from_secs(config.retrieval_cache_period_secs),
            failed_retrieval_cache_period: std::time::Duration::from_secs(
                config.failed_retrieval_cache_period_secs,
            ),
            missed_retrieval_cache_period: std::time::Duration::from_secs(
                config.missed_retrieval_cache_period_secs,
            ),
        },
        config.offline,
        config.hard_fail,
        origin,
        cache,
    ))
}
