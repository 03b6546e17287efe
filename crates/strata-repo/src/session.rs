use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use bytes::Bytes;
use parking_lot::Mutex;
use strata_core::RepoPath;
use strata_lock::{LockManager, SessionId};
use strata_store::{BackingStore, Properties};
use tracing::{debug, trace};

use crate::{
    metadata::{MetadataQueue, RecalcRequest},
    trash::Trash,
    RepoResult,
};

/// Content staged by a deploy, applied to the store at commit.
struct PendingWrite {
    store_path: String,
    data: Bytes,
    props: Properties,
}

/// One unit of work against the engine.
///
/// A session owns a lock-manager identity and the dirty state of the unit:
/// deployed content, items destined for the trash, and metadata
/// recalculations to queue once the outcome is durable. Repositories record
/// here instead of touching the store; everything is applied on
/// [`Session::commit`], which means [`Session::rollback`] needs no undo at
/// all and uncommitted state is never visible to other sessions.
///
/// Both outcomes release every lock the session holds, as a unit.
pub struct Session {
    id: SessionId,
    locks: Arc<LockManager>,
    store: Arc<dyn BackingStore>,
    trash: Arc<Trash>,
    metadata: MetadataQueue,
    pending_writes: Mutex<BTreeMap<RepoPath, PendingWrite>>,
    trash_items: Mutex<BTreeSet<RepoPath>>,
    pending_recalcs: Mutex<Vec<RecalcRequest>>,
}

impl Session {
    pub fn new(
        locks: Arc<LockManager>,
        store: Arc<dyn BackingStore>,
        trash: Arc<Trash>,
        metadata: MetadataQueue,
    ) -> Self {
        let id = locks.new_session();
        trace!(session = %id, "session opened");
        Self {
            id,
            locks,
            store,
            trash,
            metadata,
            pending_writes: Mutex::new(BTreeMap::new()),
            trash_items: Mutex::new(BTreeSet::new()),
            pending_recalcs: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Stage a content write for commit time. The caller must already hold
    /// WRITE on the path. The last write to a path wins.
    pub fn record_write(&self, rp: RepoPath, store_path: String, data: Bytes, props: Properties) {
        trace!(session = %self.id, path = %rp, len = data.len(), "write staged");
        self.pending_writes.lock().insert(
            rp,
            PendingWrite {
                store_path,
                data,
                props,
            },
        );
    }

    /// Record an item for disposal at commit time. The caller must already
    /// hold WRITE on the path.
    pub fn record_trash(&self, rp: RepoPath) {
        trace!(session = %self.id, path = %rp, "recorded for trash");
        self.trash_items.lock().insert(rp);
    }

    /// Queue a metadata recalculation once the unit of work commits. Before
    /// that point the drainer would still see the pre-commit tree.
    pub fn defer_recalc(&self, req: RecalcRequest) {
        let mut recalcs = self.pending_recalcs.lock();
        if !recalcs.contains(&req) {
            recalcs.push(req);
        }
    }

    /// Commit the unit of work: apply staged writes, move recorded items
    /// into a trash holding folder, flush the store, queue deferred metadata
    /// recalculations, schedule the trash purge, release all locks.
    ///
    /// Locks are released even when the commit fails partway; the error then
    /// tells the caller the unit of work did not fully apply.
    pub async fn commit(self) -> RepoResult<()> {
        let result = self.commit_inner().await;
        self.locks.release_all(self.id);
        result
    }

    async fn commit_inner(&self) -> RepoResult<()> {
        let writes: Vec<PendingWrite> = std::mem::take(&mut *self.pending_writes.lock())
            .into_values()
            .collect();
        let written = writes.len();
        for write in writes {
            self.store
                .write_file(&write.store_path, &write.data, write.props)
                .await?;
        }

        let items: Vec<RepoPath> = std::mem::take(&mut *self.trash_items.lock())
            .into_iter()
            .collect();
        let folder = if items.is_empty() {
            None
        } else {
            let folder = Trash::folder_name(self.id);
            self.trash.relocate(&folder, &items).await?;
            Some(folder)
        };

        self.store.save().await?;

        for req in std::mem::take(&mut *self.pending_recalcs.lock()) {
            self.metadata.request(req);
        }
        if let Some(folder) = folder {
            self.trash.schedule_purge(folder);
        }
        debug!(session = %self.id, written, trashed = items.len(), "session committed");
        Ok(())
    }

    /// Abandon the unit of work. Staged writes, recorded disposals and
    /// deferred recalculations are dropped untouched and all locks are
    /// released. The store never saw any of it.
    pub fn rollback(self) {
        self.pending_writes.lock().clear();
        self.trash_items.lock().clear();
        self.pending_recalcs.lock().clear();
        self.locks.release_all(self.id);
        debug!(session = %self.id, "session rolled back");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Safety net for sessions dropped without commit/rollback.
        // release_all is idempotent, so the normal paths pay nothing.
        self.locks.release_all(self.id);
    }
}
