use std::{
    collections::{BTreeSet, HashSet},
    sync::Arc,
};

use strata_core::RepoPath;
use strata_lock::{LockManager, LockMode};
use strata_store::{layout, BackingStore, NodeType};
use tracing::{debug, info, warn};

use crate::{
    metadata::{MetadataQueue, RecalcRequest},
    registry::RepoRegistry,
    RepoError, RepoResult, Session,
};

/// Behavior switches for a batch move/copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct MoveOptions {
    /// Copy instead of move; sources are left in place and locked READ.
    pub copy: bool,
    /// Validate and lock only, mutate nothing.
    pub dry_run: bool,
    /// Skip metadata recalculation entirely.
    pub suppress_metadata: bool,
    /// Stop at the first failing pair instead of collecting errors.
    pub fail_fast: bool,
    /// Run metadata recalculation inline before returning instead of
    /// queueing it.
    pub execute_metadata_now: bool,
}

/// Multi-status outcome of a batch: every pair lands in exactly one list.
#[derive(Debug, Default)]
pub struct MoveReport {
    pub completed: Vec<(RepoPath, RepoPath)>,
    pub failed: Vec<(RepoPath, String)>,
}

impl MoveReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Batch move/copy across local repositories (remote caches included).
///
/// All lock targets of the whole batch are acquired up front in canonical
/// path order, so two concurrent batches over overlapping paths cannot
/// deadlock, whatever order their pairs were given in.
pub struct Mover {
    store: Arc<dyn BackingStore>,
    locks: Arc<LockManager>,
    metadata: MetadataQueue,
}

impl Mover {
    pub fn new(
        store: Arc<dyn BackingStore>,
        locks: Arc<LockManager>,
        metadata: MetadataQueue,
    ) -> Self {
        Self {
            store,
            locks,
            metadata,
        }
    }

    pub async fn execute(
        &self,
        session: &Session,
        registry: &RepoRegistry,
        pairs: &[(RepoPath, RepoPath)],
        options: MoveOptions,
    ) -> RepoResult<MoveReport> {
        let mut report = MoveReport::default();

        // Validation first: a pair with an unknown repository or a filtered
        // target fails before anything is locked.
        let mut valid = Vec::new();
        for (src, dst) in pairs {
            match self.validate(registry, src, dst).await {
                Ok(()) => valid.push((src.clone(), dst.clone())),
                Err(err) => {
                    if options.fail_fast {
                        return Err(err);
                    }
                    report.failed.push((src.clone(), err.to_string()));
                }
            }
        }

        self.lock_batch(session, &valid, options).await?;

        let mut touched_dirs: BTreeSet<RepoPath> = BTreeSet::new();
        for (src, dst) in valid {
            if options.dry_run {
                report.completed.push((src, dst));
                continue;
            }
            match self.transfer(&src, &dst, options.copy).await {
                Ok(()) => {
                    for rp in [&src, &dst] {
                        if let Some(dir) = rp.parent().and_then(|p| p.parent()) {
                            touched_dirs.insert(dir);
                        }
                    }
                    report.completed.push((src, dst));
                }
                Err(err) => {
                    warn!(src = %src, dst = %dst, error = %err, "move pair failed");
                    if options.fail_fast {
                        return Err(err);
                    }
                    report.failed.push((src, err.to_string()));
                }
            }
        }

        if !options.suppress_metadata && !options.dry_run {
            self.recalculate(&touched_dirs, options.execute_metadata_now)
                .await?;
        }

        info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            copy = options.copy,
            dry_run = options.dry_run,
            "batch move finished"
        );
        Ok(report)
    }

    async fn validate(
        &self,
        registry: &RepoRegistry,
        src: &RepoPath,
        dst: &RepoPath,
    ) -> RepoResult<()> {
        let Some(_src_repo) = registry.local_view(src.repo_key()) else {
            return Err(RepoError::RepoNotFound(src.repo_key().to_string()));
        };
        let Some(dst_repo) = registry.local_view(dst.repo_key()) else {
            return Err(RepoError::RepoNotFound(dst.repo_key().to_string()));
        };
        if !dst_repo.accepts(dst.path()) {
            return Err(RepoError::ItemNotFound(dst.clone()));
        }
        if !self
            .store
            .exists(&layout::repo_item(src.repo_key(), src.path()))
            .await?
        {
            return Err(RepoError::ItemNotFound(src.clone()));
        }
        Ok(())
    }

    /// Acquire every lock of the batch in one canonical order.
    async fn lock_batch(
        &self,
        session: &Session,
        pairs: &[(RepoPath, RepoPath)],
        options: MoveOptions,
    ) -> RepoResult<()> {
        let mut targets: Vec<(RepoPath, LockMode)> = Vec::new();
        let mut seen: HashSet<RepoPath> = HashSet::new();
        for (src, dst) in pairs {
            let src_mode = if options.copy {
                LockMode::Read
            } else {
                LockMode::Write
            };
            for (rp, mode) in [(src, src_mode), (dst, LockMode::Write)] {
                if seen.insert(rp.clone()) {
                    targets.push((rp.clone(), mode));
                }
            }
        }
        targets.sort_by(|a, b| a.0.cmp(&b.0));
        for (rp, mode) in targets {
            match mode {
                LockMode::Read => {
                    self.locks.acquire_read(session.id(), &rp).await?;
                }
                LockMode::Write => {
                    self.locks.acquire_write(session.id(), &rp).await?;
                }
            }
        }
        Ok(())
    }

    async fn transfer(&self, src: &RepoPath, dst: &RepoPath, copy: bool) -> RepoResult<()> {
        let src_store = layout::repo_item(src.repo_key(), src.path());
        let dst_store = layout::repo_item(dst.repo_key(), dst.path());
        if copy {
            self.deep_copy(&src_store, &dst_store).await?;
        } else {
            self.store.move_node(&src_store, &dst_store).await?;
        }
        debug!(src = %src, dst = %dst, copy, "transferred");
        Ok(())
    }

    /// Recursive copy through the store interface.
    async fn deep_copy(&self, src: &str, dst: &str) -> RepoResult<()> {
        let mut stack = vec![(src.to_string(), dst.to_string())];
        while let Some((from, to)) = stack.pop() {
            let Some(node) = self.store.node(&from).await? else {
                continue;
            };
            if node.is_file() {
                let content = self.store.read_file(&from).await?;
                self.store
                    .write_file(&to, &content, node.properties)
                    .await?;
            } else {
                self.store.add_node(&to, NodeType::Folder).await?;
                for child in self.store.list_children(&from).await? {
                    let name = child.name().to_string();
                    stack.push((format!("{from}/{name}"), format!("{to}/{name}")));
                }
            }
        }
        Ok(())
    }

    async fn recalculate(&self, dirs: &BTreeSet<RepoPath>, now: bool) -> RepoResult<()> {
        for dir in dirs {
            let req = RecalcRequest::subtree(dir.repo_key(), dir.path(), false);
            if now {
                self.metadata.calculate_now(&req).await?;
            } else {
                self.metadata.request(req);
            }
        }
        Ok(())
    }
}
