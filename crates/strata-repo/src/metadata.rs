//! Asynchronous maven-metadata recalculation.
//!
//! Deploys and undeploys invalidate the version listings of their artifact
//! folders. Recalculation is funneled through a single queue: requests for a
//! base already pending are coalesced, and a binary semaphore guarantees at
//! most one drainer runs at a time. A request arriving while its base is
//! being recalculated enqueues one more pass, so a burst of N requests costs
//! at most two passes over the same base and no request is ever dropped.

use std::{
    collections::{HashSet, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use strata_core::RepoPath;
use strata_lock::LockManager;
use strata_store::{layout, BackingStore, NodeInfo};
use tracing::{debug, error, trace};

use crate::{expiry, RepoResult};

/// One recalculation request: a subtree of one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecalcRequest {
    pub repo_key: String,
    /// Relative folder to start from; empty for the repository root.
    pub base_path: String,
    pub recursive: bool,
}

impl RecalcRequest {
    /// Whole-repository recalculation.
    pub fn repo(repo_key: impl Into<String>) -> Self {
        Self {
            repo_key: repo_key.into(),
            base_path: String::new(),
            recursive: true,
        }
    }

    pub fn subtree(repo_key: impl Into<String>, base_path: impl Into<String>, recursive: bool) -> Self {
        Self {
            repo_key: repo_key.into(),
            base_path: base_path.into(),
            recursive,
        }
    }

    fn coalesce_key(&self) -> String {
        format!("{}:{}", self.repo_key, self.base_path)
    }
}

struct QueueState {
    fifo: VecDeque<RecalcRequest>,
    /// Coalescing set; a key is removed when its request leaves the queue
    /// for execution, so requests arriving mid-calculation queue a new pass.
    pending: HashSet<String>,
}

struct Inner {
    store: Arc<dyn BackingStore>,
    locks: Arc<LockManager>,
    queue: Mutex<QueueState>,
    drain: Arc<tokio::sync::Semaphore>,
    /// Requests that have left the queue for execution. Exposed through
    /// [`MetadataQueue::executed`] so tests can bound calculation passes.
    executed: AtomicUsize,
}

/// Cloneable handle to the recalculation queue.
#[derive(Clone)]
pub struct MetadataQueue {
    inner: Arc<Inner>,
}

impl MetadataQueue {
    pub fn new(store: Arc<dyn BackingStore>, locks: Arc<LockManager>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                locks,
                queue: Mutex::new(QueueState {
                    fifo: VecDeque::new(),
                    pending: HashSet::new(),
                }),
                drain: Arc::new(tokio::sync::Semaphore::new(1)),
                executed: AtomicUsize::new(0),
            }),
        }
    }

    /// Queue a whole-repository recalculation.
    pub fn request_recalculation(&self, repo_key: &str) {
        self.request(RecalcRequest::repo(repo_key));
    }

    /// Queue a recalculation, coalescing with an identical pending base.
    pub fn request(&self, req: RecalcRequest) {
        {
            let mut q = self.inner.queue.lock();
            if !q.pending.insert(req.coalesce_key()) {
                trace!(repo = %req.repo_key, base = %req.base_path, "recalc already pending");
                return;
            }
            q.fifo.push_back(req);
        }
        Inner::kick(&self.inner);
    }

    /// Run one recalculation inline, bypassing the queue. Used by callers
    /// that need the listings consistent before returning (batch moves with
    /// immediate metadata, admin triggers).
    pub async fn calculate_now(&self, req: &RecalcRequest) -> RepoResult<()> {
        self.inner.calculate(req).await
    }

    /// Number of queued (not yet executing) requests. Test hook.
    pub fn queued(&self) -> usize {
        self.inner.queue.lock().fifo.len()
    }

    /// Number of queue passes executed so far. Test hook.
    pub fn executed(&self) -> usize {
        self.inner.executed.load(Ordering::Relaxed)
    }
}

impl Inner {
    /// Start a drainer unless one is already running.
    fn kick(inner: &Arc<Self>) {
        let Ok(permit) = Arc::clone(&inner.drain).try_acquire_owned() else {
            return;
        };
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            loop {
                let next = {
                    let mut q = inner.queue.lock();
                    let next = q.fifo.pop_front();
                    if let Some(req) = &next {
                        q.pending.remove(&req.coalesce_key());
                    }
                    next
                };
                let Some(req) = next else { break };
                inner.executed.fetch_add(1, Ordering::Relaxed);
                if let Err(err) = inner.calculate(&req).await {
                    // Per-request failures never kill the drainer.
                    error!(repo = %req.repo_key, base = %req.base_path, error = %err,
                        "metadata recalculation failed");
                }
            }
            drop(permit);
            // A request that raced the final empty check re-arms the drain.
            let stranded = !inner.queue.lock().fifo.is_empty();
            if stranded {
                Self::kick(&inner);
            }
        });
    }

    async fn calculate(&self, req: &RecalcRequest) -> RepoResult<()> {
        let session = self.locks.new_session();
        let result = self.calculate_tree(session, req).await;
        self.locks.release_all(session);
        result
    }

    async fn calculate_tree(
        &self,
        session: strata_lock::SessionId,
        req: &RecalcRequest,
    ) -> RepoResult<()> {
        let mut stack = vec![RepoPath::new(&req.repo_key, &req.base_path)?];
        let mut written = 0usize;
        while let Some(dir) = stack.pop() {
            let store_path = layout::repo_item(dir.repo_key(), dir.path());
            let Some(node) = self.store.node(&store_path).await? else {
                continue;
            };
            if node.is_file() {
                continue;
            }
            let children = self.store.list_children(&store_path).await?;
            let versions: Vec<&NodeInfo> = children
                .iter()
                .filter(|c| c.is_folder() && looks_like_version(c.name()))
                .collect();
            if !versions.is_empty() {
                self.write_listing(session, &dir, &versions).await?;
                written += 1;
            }
            if req.recursive {
                for child in &children {
                    if child.is_folder() && !looks_like_version(child.name()) {
                        stack.push(dir.child(child.name())?);
                    }
                }
            }
        }
        debug!(repo = %req.repo_key, base = %req.base_path, written, "recalculated metadata");
        Ok(())
    }

    /// Generate `maven-metadata.xml` for one artifact folder.
    async fn write_listing(
        &self,
        session: strata_lock::SessionId,
        dir: &RepoPath,
        versions: &[&NodeInfo],
    ) -> RepoResult<()> {
        let md_path = dir.child("maven-metadata.xml")?;
        let mut names: Vec<&str> = versions.iter().map(|v| v.name()).collect();
        names.sort_unstable();

        let artifact_id = dir.name().unwrap_or("");
        let group_id = dir
            .parent()
            .map(|p| p.path().replace('/', "."))
            .unwrap_or_default();
        let xml = render_metadata(&group_id, artifact_id, &names, expiry::now_ms());

        self.locks.acquire_write(session, &md_path).await?;
        let store_path = layout::repo_item(md_path.repo_key(), md_path.path());
        self.store
            .write_file(&store_path, xml.as_bytes(), expiry::content_properties(expiry::now_ms()))
            .await?;
        self.locks.release_write(session, &md_path);
        Ok(())
    }
}

fn looks_like_version(name: &str) -> bool {
    name.bytes().next().is_some_and(|b| b.is_ascii_digit())
}

fn render_metadata(group_id: &str, artifact_id: &str, versions: &[&str], now_ms: u64) -> String {
    let latest = versions.last().copied().unwrap_or("");
    let release = versions
        .iter()
        .rev()
        .find(|v| !v.ends_with("-SNAPSHOT"))
        .copied()
        .unwrap_or("");

    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<metadata>\n");
    xml.push_str(&format!("  <groupId>{group_id}</groupId>\n"));
    xml.push_str(&format!("  <artifactId>{artifact_id}</artifactId>\n"));
    xml.push_str("  <versioning>\n");
    xml.push_str(&format!("    <latest>{latest}</latest>\n"));
    if !release.is_empty() {
        xml.push_str(&format!("    <release>{release}</release>\n"));
    }
    xml.push_str("    <versions>\n");
    for v in versions {
        xml.push_str(&format!("      <version>{v}</version>\n"));
    }
    xml.push_str("    </versions>\n");
    xml.push_str(&format!("    <lastUpdated>{now_ms}</lastUpdated>\n"));
    xml.push_str("  </versioning>\n</metadata>\n");
    xml
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;
    use strata_lock::LockOptions;
    use strata_store::{MemStore, Properties};

    use super::*;

    fn queue() -> (MetadataQueue, Arc<MemStore>) {
        let store = Arc::new(MemStore::new());
        let locks = Arc::new(LockManager::new(LockOptions::default()));
        (MetadataQueue::new(store.clone(), locks), store)
    }

    async fn seed_versions(store: &MemStore, repo: &str, artifact: &str, versions: &[&str]) {
        for v in versions {
            store
                .write_file(
                    &layout::repo_item(repo, &format!("{artifact}/{v}/file.jar")),
                    b"jar",
                    Properties::new(),
                )
                .await
                .unwrap();
        }
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn generates_version_listing() {
        let (queue, store) = queue();
        seed_versions(&store, "libs", "org/foo/bar", &["1.0", "1.1", "2.0-SNAPSHOT"]).await;

        queue
            .calculate_now(&RecalcRequest::repo("libs"))
            .await
            .unwrap();

        let xml = store
            .read_file(&layout::repo_item("libs", "org/foo/bar/maven-metadata.xml"))
            .await
            .unwrap();
        let xml = String::from_utf8(xml.to_vec()).unwrap();
        assert!(xml.contains("<groupId>org.foo</groupId>"));
        assert!(xml.contains("<artifactId>bar</artifactId>"));
        assert!(xml.contains("<version>1.0</version>"));
        assert!(xml.contains("<latest>2.0-SNAPSHOT</latest>"));
        assert!(xml.contains("<release>1.1</release>"));
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn burst_of_requests_coalesces_to_one_pass() {
        let (queue, store) = queue();
        seed_versions(&store, "libs", "org/foo/bar", &["1.0"]).await;

        // No await between requests, so the drainer cannot start mid-burst.
        for _ in 0..100 {
            queue.request_recalculation("libs");
        }
        assert_eq!(queue.queued(), 1);

        let md = layout::repo_item("libs", "org/foo/bar/maven-metadata.xml");
        for _ in 0..50 {
            if store.exists(&md).await.unwrap() && queue.queued() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(queue.executed(), 1);
    }

    #[rstest]
    #[timeout(Duration::from_secs(10))]
    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_burst_costs_bounded_passes() {
        let (queue, store) = queue();
        seed_versions(&store, "libs", "org/foo/bar", &["1.0"]).await;

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let queue = queue.clone();
            tasks.push(tokio::spawn(async move {
                queue.request_recalculation("libs");
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        // Once every request has landed, at most one entry can still be
        // queued and one pass mid-flight: two more passes, ever.
        let baseline = queue.executed();
        for _ in 0..50 {
            if queue.queued() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(queue.executed() >= 1);
        assert!(
            queue.executed() <= baseline + 2,
            "burst of 16 cost {} extra passes",
            queue.executed() - baseline
        );
        assert!(store
            .exists(&layout::repo_item("libs", "org/foo/bar/maven-metadata.xml"))
            .await
            .unwrap());
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn queued_request_eventually_runs() {
        let (queue, store) = queue();
        seed_versions(&store, "libs", "org/foo/bar", &["1.0"]).await;

        queue.request_recalculation("libs");
        let md = layout::repo_item("libs", "org/foo/bar/maven-metadata.xml");
        for _ in 0..50 {
            if store.exists(&md).await.unwrap() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("metadata never appeared");
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn non_recursive_request_skips_nested_artifacts() {
        let (queue, store) = queue();
        seed_versions(&store, "libs", "org/foo/bar", &["1.0"]).await;
        seed_versions(&store, "libs", "org/foo/bar-parent/nested", &["3.0"]).await;

        queue
            .calculate_now(&RecalcRequest::subtree("libs", "org/foo/bar", false))
            .await
            .unwrap();

        assert!(store
            .exists(&layout::repo_item("libs", "org/foo/bar/maven-metadata.xml"))
            .await
            .unwrap());
        assert!(!store
            .exists(&layout::repo_item(
                "libs",
                "org/foo/bar-parent/nested/maven-metadata.xml"
            ))
            .await
            .unwrap());
    }

    #[test]
    fn version_folder_heuristic() {
        assert!(looks_like_version("1.0"));
        assert!(looks_like_version("2.0-SNAPSHOT"));
        assert!(!looks_like_version("org"));
        assert!(!looks_like_version(""));
    }
}
