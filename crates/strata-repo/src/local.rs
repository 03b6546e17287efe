use std::sync::Arc;

use bytes::Bytes;
use strata_core::{PathPatterns, RepoPath};
use strata_lock::{LockManager, LockMode};
use strata_store::{layout, BackingStore, NodeInfo, NodeType, Properties};
use tracing::{debug, trace};

use crate::{metadata::RecalcRequest, RepoError, RepoResult, Session};

/// Locally stored repository. Also serves as the cache half of a remote
/// repository (with [`LocalRepo::is_cache`] set).
///
/// All mutating operations take the path WRITE lock through the caller's
/// session; locked reads take READ. Disposal is deferred: `undeploy` only
/// records the item on the session, the physical trash move happens on
/// commit.
pub struct LocalRepo {
    key: String,
    patterns: PathPatterns,
    cache: bool,
    store: Arc<dyn BackingStore>,
    locks: Arc<LockManager>,
}

impl LocalRepo {
    pub fn new(
        key: impl Into<String>,
        patterns: PathPatterns,
        cache: bool,
        store: Arc<dyn BackingStore>,
        locks: Arc<LockManager>,
    ) -> Self {
        Self {
            key: key.into(),
            patterns,
            cache,
            store,
            locks,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether this repository backs a remote repository's cache.
    pub fn is_cache(&self) -> bool {
        self.cache
    }

    /// Include/exclude filter verdict for a relative path.
    pub fn accepts(&self, rel_path: &str) -> bool {
        self.patterns.accepts(rel_path)
    }

    pub fn repo_path(&self, rel_path: &str) -> RepoResult<RepoPath> {
        Ok(RepoPath::new(&self.key, rel_path)?)
    }

    fn store_path(&self, rp: &RepoPath) -> String {
        layout::repo_item(rp.repo_key(), rp.path())
    }

    /// WRITE acquisition with explicit escalation: READ holds this session
    /// took on the path earlier in the unit of work are released first, then
    /// WRITE is requested. The lock manager itself never escalates.
    async fn lock_write(&self, session: &Session, rp: &RepoPath) -> RepoResult<()> {
        if let Some(entry) = self.locks.get_if_locked_by_me(session.id(), rp) {
            if entry.mode == LockMode::Read {
                for _ in 0..entry.hold_count {
                    self.locks.release_read(session.id(), rp);
                }
            }
        }
        self.locks.acquire_write(session.id(), rp).await?;
        Ok(())
    }

    /// Unlocked metadata snapshot. Filtered paths read as absent.
    pub async fn get_item(&self, rel_path: &str) -> RepoResult<NodeInfo> {
        let rp = self.repo_path(rel_path)?;
        if !self.accepts(rp.path()) {
            return Err(RepoError::ItemNotFound(rp));
        }
        match self.store.node(&self.store_path(&rp)).await? {
            Some(info) => Ok(info),
            None => Err(RepoError::ItemNotFound(rp)),
        }
    }

    /// Existence probe without locking.
    pub async fn has_item(&self, rel_path: &str) -> RepoResult<bool> {
        let rp = self.repo_path(rel_path)?;
        if !self.accepts(rp.path()) {
            return Ok(false);
        }
        Ok(self.store.exists(&self.store_path(&rp)).await?)
    }

    /// READ-locked file snapshot. The lock stays with the session until
    /// commit or rollback. Fails with [`RepoError::FileExpected`] when the
    /// path names a folder.
    pub async fn get_locked_item(&self, session: &Session, rel_path: &str) -> RepoResult<NodeInfo> {
        let rp = self.repo_path(rel_path)?;
        if !self.accepts(rp.path()) {
            return Err(RepoError::ItemNotFound(rp));
        }
        self.locks.acquire_read(session.id(), &rp).await?;
        // A failed locked get must not leave the READ hold behind, or a
        // later same-session write to the path would refuse as escalation.
        let info = match self.store.node(&self.store_path(&rp)).await {
            Ok(Some(info)) => info,
            Ok(None) => {
                self.locks.release_read(session.id(), &rp);
                return Err(RepoError::ItemNotFound(rp));
            }
            Err(err) => {
                self.locks.release_read(session.id(), &rp);
                return Err(err.into());
            }
        };
        if !info.is_file() {
            self.locks.release_read(session.id(), &rp);
            return Err(RepoError::FileExpected(rp));
        }
        Ok(info)
    }

    /// READ-locked content read.
    pub async fn read(&self, session: &Session, rel_path: &str) -> RepoResult<Bytes> {
        let info = self.get_locked_item(session, rel_path).await?;
        Ok(self.store.read_file(&info.path).await?)
    }

    /// Deploy content under the session's WRITE lock. The write is staged on
    /// the session and reaches the store at commit, so other sessions never
    /// see uncommitted content; a metadata recalculation for the owning
    /// artifact folder is deferred to commit with it.
    pub async fn save_resource(
        &self,
        session: &Session,
        rel_path: &str,
        data: &[u8],
        props: Properties,
    ) -> RepoResult<NodeInfo> {
        let rp = self.repo_path(rel_path)?;
        if !self.accepts(rp.path()) {
            return Err(RepoError::ItemNotFound(rp));
        }
        self.lock_write(session, &rp).await?;
        let store_path = self.store_path(&rp);
        let info = NodeInfo {
            path: store_path.clone(),
            node_type: NodeType::File,
            len: data.len() as u64,
            properties: props.clone(),
        };
        session.record_write(rp.clone(), store_path, Bytes::copy_from_slice(data), props);
        debug!(path = %rp, len = data.len(), "deploy staged");
        self.defer_recalc_for_file(session, &rp);
        Ok(info)
    }

    /// Write-through deploy under the session's WRITE lock, applied to the
    /// store immediately. Cache bookkeeping (origin fetches, negative
    /// markers) uses this: the entry must survive even when the requesting
    /// unit of work rolls back.
    pub async fn save_resource_now(
        &self,
        session: &Session,
        rel_path: &str,
        data: &[u8],
        props: Properties,
    ) -> RepoResult<NodeInfo> {
        let rp = self.repo_path(rel_path)?;
        if !self.accepts(rp.path()) {
            return Err(RepoError::ItemNotFound(rp));
        }
        self.lock_write(session, &rp).await?;
        let store_path = self.store_path(&rp);
        self.store.write_file(&store_path, data, props).await?;
        debug!(path = %rp, len = data.len(), "cache entry written");
        self.defer_recalc_for_file(session, &rp);
        match self.store.node(&store_path).await? {
            Some(info) => Ok(info),
            None => Err(RepoError::ItemNotFound(rp)),
        }
    }

    /// Replace an existing item's properties under the session's WRITE lock.
    pub async fn set_item_properties(
        &self,
        session: &Session,
        rel_path: &str,
        props: Properties,
    ) -> RepoResult<()> {
        let rp = self.repo_path(rel_path)?;
        self.lock_write(session, &rp).await?;
        self.store.set_properties(&self.store_path(&rp), props).await?;
        Ok(())
    }

    /// Record the item for trash disposal at commit, under WRITE. The
    /// listing refresh is deferred too: recalculating before the physical
    /// removal would re-advertise the doomed version.
    pub async fn undeploy(&self, session: &Session, rel_path: &str) -> RepoResult<()> {
        let rp = self.repo_path(rel_path)?;
        self.lock_write(session, &rp).await?;
        let Some(info) = self.store.node(&self.store_path(&rp)).await? else {
            return Err(RepoError::ItemNotFound(rp));
        };
        trace!(path = %rp, "undeploy recorded");
        let artifact_dir = if info.is_file() {
            rp.parent().and_then(|version_dir| version_dir.parent())
        } else {
            rp.parent()
        };
        if let Some(dir) = artifact_dir {
            session.defer_recalc(RecalcRequest::subtree(self.key.clone(), dir.path(), false));
        }
        session.record_trash(rp);
        Ok(())
    }

    /// Create a folder (MKCOL), under WRITE.
    pub async fn add_folder(&self, session: &Session, rel_path: &str) -> RepoResult<()> {
        let rp = self.repo_path(rel_path)?;
        if !self.accepts(rp.path()) {
            return Err(RepoError::ItemNotFound(rp));
        }
        self.lock_write(session, &rp).await?;
        self.store
            .add_node(&self.store_path(&rp), NodeType::Folder)
            .await?;
        Ok(())
    }

    /// Children of a folder, pattern-filtered.
    pub async fn list(&self, rel_path: &str) -> RepoResult<Vec<NodeInfo>> {
        let rp = self.repo_path(rel_path)?;
        let children = self.store.list_children(&self.store_path(&rp)).await?;
        let filtered = children
            .into_iter()
            .filter(|c| {
                let child_rel = if rp.is_root() {
                    c.name().to_string()
                } else {
                    format!("{}/{}", rp.path(), c.name())
                };
                self.accepts(&child_rel)
            })
            .collect();
        Ok(filtered)
    }

    /// The version listing of an artifact lives in the version folder's
    /// parent, two levels above a deployed file.
    fn defer_recalc_for_file(&self, session: &Session, rp: &RepoPath) {
        let artifact_dir = rp.parent().and_then(|version_dir| version_dir.parent());
        if let Some(dir) = artifact_dir {
            session.defer_recalc(RecalcRequest::subtree(self.key.clone(), dir.path(), false));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;
    use strata_lock::LockOptions;
    use strata_store::MemStore;

    use super::*;
    use crate::{trash::Trash, MetadataQueue};

    struct Fixture {
        repo: LocalRepo,
        locks: Arc<LockManager>,
        store: Arc<MemStore>,
        trash: Arc<Trash>,
        metadata: MetadataQueue,
    }

    impl Fixture {
        fn new(patterns: PathPatterns) -> Self {
            let store = Arc::new(MemStore::new());
            let locks = Arc::new(LockManager::new(LockOptions {
                acquire_timeout: Duration::from_millis(200),
            }));
            let trash = Arc::new(Trash::new(store.clone()));
            let metadata = MetadataQueue::new(store.clone(), locks.clone());
            let repo = LocalRepo::new("libs", patterns, false, store.clone(), locks.clone());
            Self {
                repo,
                locks,
                store,
                trash,
                metadata,
            }
        }

        fn open() -> Self {
            Self::new(PathPatterns::default())
        }

        fn session(&self) -> Session {
            Session::new(
                self.locks.clone(),
                self.store.clone(),
                self.trash.clone(),
                self.metadata.clone(),
            )
        }
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn deploy_then_read_round_trip() {
        let fx = Fixture::open();
        let session = fx.session();
        fx.repo
            .save_resource(&session, "org/foo/1.0/foo-1.0.jar", b"bytes", Properties::new())
            .await
            .unwrap();
        session.commit().await.unwrap();

        let reader = fx.session();
        let content = fx.repo.read(&reader, "org/foo/1.0/foo-1.0.jar").await.unwrap();
        assert_eq!(&content[..], b"bytes");
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn filtered_path_reads_as_absent() {
        let fx = Fixture::new(PathPatterns::new(
            vec!["org/**".to_string()],
            vec!["**/*.tmp".to_string()],
        ));
        let session = fx.session();
        assert!(matches!(
            fx.repo
                .save_resource(&session, "com/x/1.0/x.jar", b"x", Properties::new())
                .await,
            Err(RepoError::ItemNotFound(_))
        ));
        assert!(matches!(
            fx.repo.get_item("org/foo/1.0/foo.tmp").await,
            Err(RepoError::ItemNotFound(_))
        ));
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn locked_get_of_folder_is_file_expected() {
        let fx = Fixture::open();
        let session = fx.session();
        fx.repo
            .save_resource(&session, "org/foo/1.0/foo.jar", b"x", Properties::new())
            .await
            .unwrap();
        session.commit().await.unwrap();

        let session = fx.session();
        assert!(matches!(
            fx.repo.get_locked_item(&session, "org/foo/1.0").await,
            Err(RepoError::FileExpected(_))
        ));
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn undeployed_item_disappears_on_commit() {
        let fx = Fixture::open();
        let session = fx.session();
        fx.repo
            .save_resource(&session, "org/foo/1.0/foo.jar", b"x", Properties::new())
            .await
            .unwrap();
        session.commit().await.unwrap();

        let session = fx.session();
        fx.repo.undeploy(&session, "org/foo/1.0/foo.jar").await.unwrap();
        // Deferred: still present until commit.
        assert!(fx.repo.has_item("org/foo/1.0/foo.jar").await.unwrap());
        session.commit().await.unwrap();
        assert!(!fx.repo.has_item("org/foo/1.0/foo.jar").await.unwrap());
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn rollback_keeps_undeployed_item() {
        let fx = Fixture::open();
        let session = fx.session();
        fx.repo
            .save_resource(&session, "org/foo/1.0/foo.jar", b"x", Properties::new())
            .await
            .unwrap();
        session.commit().await.unwrap();

        let session = fx.session();
        fx.repo.undeploy(&session, "org/foo/1.0/foo.jar").await.unwrap();
        session.rollback();
        assert!(fx.repo.has_item("org/foo/1.0/foo.jar").await.unwrap());
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn rollback_discards_uncommitted_deploy() {
        let fx = Fixture::open();
        let session = fx.session();
        fx.repo
            .save_resource(&session, "org/foo/1.0/foo.jar", b"x", Properties::new())
            .await
            .unwrap();
        // Staged only: not in the store, not visible to anyone else.
        assert!(!fx.repo.has_item("org/foo/1.0/foo.jar").await.unwrap());
        session.rollback();
        assert!(!fx.repo.has_item("org/foo/1.0/foo.jar").await.unwrap());

        let reader = fx.session();
        assert!(matches!(
            fx.repo.read(&reader, "org/foo/1.0/foo.jar").await,
            Err(RepoError::ItemNotFound(_))
        ));
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn read_then_undeploy_in_one_session() {
        let fx = Fixture::open();
        let session = fx.session();
        fx.repo
            .save_resource(&session, "org/foo/1.0/foo.jar", b"x", Properties::new())
            .await
            .unwrap();
        session.commit().await.unwrap();

        // The READ the get parked on the session must not make the
        // follow-up WRITE an escalation.
        let session = fx.session();
        let content = fx.repo.read(&session, "org/foo/1.0/foo.jar").await.unwrap();
        assert_eq!(&content[..], b"x");
        fx.repo.undeploy(&session, "org/foo/1.0/foo.jar").await.unwrap();
        session.commit().await.unwrap();
        assert!(!fx.repo.has_item("org/foo/1.0/foo.jar").await.unwrap());
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn undeploy_refreshes_listing_after_commit() {
        let fx = Fixture::open();
        let session = fx.session();
        for v in ["1.0", "2.0"] {
            fx.repo
                .save_resource(
                    &session,
                    &format!("org/foo/bar/{v}/bar-{v}.jar"),
                    b"x",
                    Properties::new(),
                )
                .await
                .unwrap();
        }
        session.commit().await.unwrap();

        let md = layout::repo_item("libs", "org/foo/bar/maven-metadata.xml");
        fx.metadata
            .calculate_now(&RecalcRequest::subtree("libs", "org/foo/bar", false))
            .await
            .unwrap();
        let xml = String::from_utf8(fx.store.read_file(&md).await.unwrap().to_vec()).unwrap();
        assert!(xml.contains("<version>2.0</version>"));

        // Dropping the whole version folder regenerates the listing, but
        // only once the removal is durable.
        let session = fx.session();
        fx.repo.undeploy(&session, "org/foo/bar/2.0").await.unwrap();
        session.commit().await.unwrap();
        for _ in 0..50 {
            let xml = String::from_utf8(fx.store.read_file(&md).await.unwrap().to_vec()).unwrap();
            if !xml.contains("<version>2.0</version>") {
                assert!(xml.contains("<version>1.0</version>"));
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("listing still advertises the removed version");
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn writer_blocks_foreign_reader_until_commit() {
        let fx = Fixture::open();
        let writer = fx.session();
        fx.repo
            .save_resource(&writer, "org/foo/1.0/foo.jar", b"x", Properties::new())
            .await
            .unwrap();

        let reader = fx.session();
        let err = fx
            .repo
            .get_locked_item(&reader, "org/foo/1.0/foo.jar")
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Locking(_)));

        writer.commit().await.unwrap();
        fx.repo
            .get_locked_item(&reader, "org/foo/1.0/foo.jar")
            .await
            .unwrap();
    }
}
