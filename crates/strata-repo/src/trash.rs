//! Deferred disposal of repository content.
//!
//! Nothing is deleted in place. Removed items move into a per-session
//! holding folder under the trash namespace and an asynchronous purge is
//! scheduled afterwards. A purge failure leaves the holding folder behind
//! with the original `(repo, path)` shape intact, so operators can inspect
//! or restore.

use std::sync::Arc;

use strata_core::RepoPath;
use strata_lock::SessionId;
use strata_store::{layout, BackingStore};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::RepoResult;

pub struct Trash {
    store: Arc<dyn BackingStore>,
}

impl Trash {
    pub fn new(store: Arc<dyn BackingStore>) -> Self {
        Self { store }
    }

    /// Holding folder name for one session's disposals. The uuid keeps
    /// folders unique across process restarts reusing session numbers.
    pub fn folder_name(session: SessionId) -> String {
        format!("{session}-{}", Uuid::new_v4())
    }

    /// Move the recorded items into the holding folder. Runs on session
    /// commit, under the session's WRITE locks; an absent source (already
    /// moved, or never materialized) is skipped.
    pub async fn relocate(&self, folder: &str, items: &[RepoPath]) -> RepoResult<()> {
        for rp in items {
            let src = layout::repo_item(rp.repo_key(), rp.path());
            if !self.store.exists(&src).await? {
                continue;
            }
            let dst = layout::trash_item(folder, rp.repo_key(), rp.path());
            self.store.move_node(&src, &dst).await?;
            debug!(path = %rp, folder, "moved to trash");
        }
        Ok(())
    }

    /// Schedule asynchronous disposal of a holding folder. The session does
    /// not wait for it; the move above already made the content unreachable.
    pub fn schedule_purge(&self, folder: String) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            match store.delete(&layout::trash_folder(&folder)).await {
                Ok(()) => debug!(folder, "purged trash folder"),
                Err(err) => {
                    error!(folder, error = %err, "trash purge failed, remains kept for inspection");
                }
            }
        });
    }

    /// Dispose of every holding folder, including remains of failed purges.
    pub async fn empty(&self) -> RepoResult<()> {
        let root = layout::TRASH_PREFIX;
        if !self.store.exists(root).await? {
            return Ok(());
        }
        let folders = self.store.list_children(root).await?;
        let count = folders.len();
        for folder in folders {
            self.store.delete(&folder.path).await?;
        }
        info!(count, "emptied trash");
        Ok(())
    }
}
