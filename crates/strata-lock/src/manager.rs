use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use parking_lot::Mutex;
use strata_core::RepoPath;
use tokio::{sync::watch, time::Instant};
use tracing::{debug, trace};

use crate::{LockError, LockResult};

/// Opaque unit-of-work identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s-{}", self.0)
    }
}

/// Lock mode held by a session on a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Read,
    Write,
}

/// Snapshot of one session's hold on one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEntry {
    pub path: RepoPath,
    pub mode: LockMode,
    /// Reentrancy counter; always 1 for WRITE.
    pub hold_count: usize,
    pub session: SessionId,
}

/// Tunables for the lock manager.
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Bound on a single acquisition wait. Seconds, not minutes: a blocked
    /// caller's unit of work fails rather than hanging.
    pub acquire_timeout: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
struct PathState {
    writer: Option<SessionId>,
    /// READ holders with reentrancy counts.
    readers: HashMap<SessionId, usize>,
    /// Bumped on every release so waiters re-evaluate.
    wakeup: watch::Sender<u64>,
}

impl PathState {
    fn new() -> Self {
        let (wakeup, _) = watch::channel(0);
        Self {
            writer: None,
            readers: HashMap::new(),
            wakeup,
        }
    }

    fn is_free(&self) -> bool {
        self.writer.is_none() && self.readers.is_empty()
    }

    fn bump(&self) {
        self.wakeup.send_modify(|v| *v = v.wrapping_add(1));
    }
}

/// Process-wide lock table, explicitly constructed and injected into every
/// repository (never an ambient global).
///
/// READ is shared and reentrant per session; WRITE is exclusive against
/// every other session. A session's own READ never blocks its own re-READ,
/// but READ→WRITE escalation is refused, never implicit.
pub struct LockManager {
    options: LockOptions,
    locks: Mutex<HashMap<RepoPath, PathState>>,
    /// Paths each live session has ever locked; consulted by
    /// `reacquire_read` and cleared by `release_all`.
    history: Mutex<HashMap<SessionId, HashSet<RepoPath>>>,
    next_session: AtomicU64,
}

impl LockManager {
    pub fn new(options: LockOptions) -> Self {
        Self {
            options,
            locks: Mutex::new(HashMap::new()),
            history: Mutex::new(HashMap::new()),
            next_session: AtomicU64::new(1),
        }
    }

    /// Mint a fresh session identifier.
    pub fn new_session(&self) -> SessionId {
        SessionId(self.next_session.fetch_add(1, Ordering::Relaxed))
    }

    /// Acquire (or reenter) READ. Blocks up to the configured timeout while
    /// another session holds WRITE.
    pub async fn acquire_read(&self, session: SessionId, path: &RepoPath) -> LockResult<LockEntry> {
        let deadline = Instant::now() + self.options.acquire_timeout;
        loop {
            let mut rx = {
                let mut locks = self.locks.lock();
                let state = locks
                    .entry(path.clone())
                    .or_insert_with(PathState::new);
                let blocked_by_other_writer =
                    state.writer.is_some_and(|holder| holder != session);
                if !blocked_by_other_writer {
                    let count = state.readers.entry(session).or_insert(0);
                    *count += 1;
                    let entry = LockEntry {
                        path: path.clone(),
                        mode: LockMode::Read,
                        hold_count: *count,
                        session,
                    };
                    drop(locks);
                    self.remember(session, path);
                    trace!(%session, path = %entry.path, hold_count = entry.hold_count, "acquired READ");
                    return Ok(entry);
                }
                // Subscribing under the table lock makes the release bump
                // observable through `changed()`: no lost wakeups.
                state.wakeup.subscribe()
            };

            if tokio::time::timeout_at(deadline, rx.changed()).await.is_err() {
                debug!(%session, %path, "READ acquisition timed out");
                return Err(LockError::Timeout {
                    path: path.clone(),
                    mode: LockMode::Read,
                    waited: self.options.acquire_timeout,
                });
            }
        }
    }

    /// Acquire WRITE. Blocks up to the configured timeout while any other
    /// session holds READ or WRITE. Reentering one's own WRITE is a no-op,
    /// even with READs taken under it; holding only one's own READ is
    /// refused with [`LockError::WouldEscalate`].
    pub async fn acquire_write(&self, session: SessionId, path: &RepoPath) -> LockResult<LockEntry> {
        let deadline = Instant::now() + self.options.acquire_timeout;
        loop {
            let mut rx = {
                let mut locks = self.locks.lock();
                let state = locks
                    .entry(path.clone())
                    .or_insert_with(PathState::new);

                // The own-writer check comes first: a session that took a
                // READ under its own WRITE is reentering, not escalating.
                if state.writer == Some(session) {
                    let entry = LockEntry {
                        path: path.clone(),
                        mode: LockMode::Write,
                        hold_count: 1,
                        session,
                    };
                    return Ok(entry);
                }
                if state.readers.contains_key(&session) {
                    return Err(LockError::WouldEscalate { path: path.clone() });
                }

                let contended = state.writer.is_some() || !state.readers.is_empty();
                if !contended {
                    state.writer = Some(session);
                    drop(locks);
                    self.remember(session, path);
                    trace!(%session, %path, "acquired WRITE");
                    return Ok(LockEntry {
                        path: path.clone(),
                        mode: LockMode::Write,
                        hold_count: 1,
                        session,
                    });
                }
                state.wakeup.subscribe()
            };

            if tokio::time::timeout_at(deadline, rx.changed()).await.is_err() {
                debug!(%session, %path, "WRITE acquisition timed out");
                return Err(LockError::Timeout {
                    path: path.clone(),
                    mode: LockMode::Write,
                    waited: self.options.acquire_timeout,
                });
            }
        }
    }

    /// Decrement the session's READ hold; drop the entry at zero. Returns
    /// whether a release actually occurred (idempotent no-op otherwise).
    pub fn release_read(&self, session: SessionId, path: &RepoPath) -> bool {
        let mut locks = self.locks.lock();
        let Some(state) = locks.get_mut(path) else {
            return false;
        };
        let Some(count) = state.readers.get_mut(&session) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            state.readers.remove(&session);
        }
        state.bump();
        if state.is_free() {
            locks.remove(path);
        }
        trace!(%session, %path, "released READ");
        true
    }

    /// Release the session's WRITE hold, if any.
    pub fn release_write(&self, session: SessionId, path: &RepoPath) -> bool {
        let mut locks = self.locks.lock();
        let Some(state) = locks.get_mut(path) else {
            return false;
        };
        if state.writer != Some(session) {
            return false;
        }
        state.writer = None;
        state.bump();
        if state.is_free() {
            locks.remove(path);
        }
        trace!(%session, %path, "released WRITE");
        true
    }

    /// Re-confirm interest in a path the session locked earlier in its
    /// lifetime (used after yielding in long operations). Fails when the
    /// session never held the path.
    pub async fn reacquire_read(
        &self,
        session: SessionId,
        path: &RepoPath,
    ) -> LockResult<LockEntry> {
        let held_before = self
            .history
            .lock()
            .get(&session)
            .is_some_and(|paths| paths.contains(path));
        if !held_before {
            return Err(LockError::NeverHeld { path: path.clone() });
        }
        self.acquire_read(session, path).await
    }

    /// Non-blocking probe used by optimizers.
    pub fn get_if_locked_by_me(&self, session: SessionId, path: &RepoPath) -> Option<LockEntry> {
        let locks = self.locks.lock();
        let state = locks.get(path)?;
        if state.writer == Some(session) {
            return Some(LockEntry {
                path: path.clone(),
                mode: LockMode::Write,
                hold_count: 1,
                session,
            });
        }
        state.readers.get(&session).map(|count| LockEntry {
            path: path.clone(),
            mode: LockMode::Read,
            hold_count: *count,
            session,
        })
    }

    /// Bulk-release every READ hold on paths of one repository, regardless
    /// of holder. Housekeeping for repository teardown.
    pub fn unlock_all_read_locks(&self, repo_key: &str) {
        let mut locks = self.locks.lock();
        let affected: Vec<RepoPath> = locks
            .keys()
            .filter(|p| p.repo_key() == repo_key)
            .cloned()
            .collect();
        for path in affected {
            let free = match locks.get_mut(&path) {
                Some(state) => {
                    if !state.readers.is_empty() {
                        state.readers.clear();
                        state.bump();
                    }
                    state.is_free()
                }
                None => false,
            };
            if free {
                locks.remove(&path);
            }
        }
        debug!(repo = repo_key, "bulk-released read locks");
    }

    /// Release everything the session holds, as a unit. No partial release:
    /// this is the cleanup path for both commit and failure.
    pub fn release_all(&self, session: SessionId) {
        let mut locks = self.locks.lock();
        let affected: Vec<RepoPath> = locks
            .iter()
            .filter(|(_, s)| s.writer == Some(session) || s.readers.contains_key(&session))
            .map(|(p, _)| p.clone())
            .collect();
        for path in &affected {
            let free = match locks.get_mut(path) {
                Some(state) => {
                    if state.writer == Some(session) {
                        state.writer = None;
                    }
                    state.readers.remove(&session);
                    state.bump();
                    state.is_free()
                }
                None => false,
            };
            if free {
                locks.remove(path);
            }
        }
        drop(locks);
        self.history.lock().remove(&session);
        if !affected.is_empty() {
            debug!(%session, count = affected.len(), "released all session locks");
        }
    }

    /// Paths the session currently holds, with modes. Diagnostic snapshot,
    /// used by tests and teardown audits.
    pub fn held_by(&self, session: SessionId) -> Vec<LockEntry> {
        let locks = self.locks.lock();
        let mut held: Vec<LockEntry> = locks
            .iter()
            .filter_map(|(path, state)| {
                if state.writer == Some(session) {
                    Some(LockEntry {
                        path: path.clone(),
                        mode: LockMode::Write,
                        hold_count: 1,
                        session,
                    })
                } else {
                    state.readers.get(&session).map(|count| LockEntry {
                        path: path.clone(),
                        mode: LockMode::Read,
                        hold_count: *count,
                        session,
                    })
                }
            })
            .collect();
        held.sort_by(|a, b| a.path.cmp(&b.path));
        held
    }

    fn remember(&self, session: SessionId, path: &RepoPath) {
        self.history
            .lock()
            .entry(session)
            .or_default()
            .insert(path.clone());
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(LockOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;

    use super::*;

    fn manager(timeout_ms: u64) -> Arc<LockManager> {
        Arc::new(LockManager::new(LockOptions {
            acquire_timeout: Duration::from_millis(timeout_ms),
        }))
    }

    fn rp(path: &str) -> RepoPath {
        RepoPath::new("libs", path).unwrap()
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn write_excludes_other_sessions_until_release() {
        let mgr = manager(2_000);
        let a = mgr.new_session();
        let b = mgr.new_session();
        let path = rp("org/foo/bar.jar");

        mgr.acquire_write(a, &path).await.unwrap();

        let mgr2 = mgr.clone();
        let path2 = path.clone();
        let reader = tokio::spawn(async move { mgr2.acquire_read(b, &path2).await });

        // Give the reader time to block, then release.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!reader.is_finished(), "reader must block on writer");
        assert!(mgr.release_write(a, &path));

        reader.await.unwrap().unwrap();
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn read_is_shared_across_sessions() {
        let mgr = manager(200);
        let a = mgr.new_session();
        let b = mgr.new_session();
        let path = rp("org/foo/bar.jar");

        mgr.acquire_read(a, &path).await.unwrap();
        mgr.acquire_read(b, &path).await.unwrap();
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn read_is_reentrant_and_needs_matching_releases() {
        let mgr = manager(100);
        let a = mgr.new_session();
        let b = mgr.new_session();
        let path = rp("org/foo/bar.jar");

        let first = mgr.acquire_read(a, &path).await.unwrap();
        assert_eq!(first.hold_count, 1);
        let second = mgr.acquire_read(a, &path).await.unwrap();
        assert_eq!(second.hold_count, 2);

        // One release is not enough for B's WRITE.
        assert!(mgr.release_read(a, &path));
        assert!(matches!(
            mgr.acquire_write(b, &path).await,
            Err(LockError::Timeout { .. })
        ));

        assert!(mgr.release_read(a, &path));
        mgr.acquire_write(b, &path).await.unwrap();
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn write_acquisition_times_out_against_foreign_reader() {
        let mgr = manager(100);
        let a = mgr.new_session();
        let b = mgr.new_session();
        let path = rp("org/foo/bar.jar");

        mgr.acquire_read(a, &path).await.unwrap();
        let err = mgr.acquire_write(b, &path).await.unwrap_err();
        assert!(matches!(
            err,
            LockError::Timeout {
                mode: LockMode::Write,
                ..
            }
        ));
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn escalation_is_refused_not_implicit() {
        let mgr = manager(100);
        let a = mgr.new_session();
        let path = rp("org/foo/bar.jar");

        mgr.acquire_read(a, &path).await.unwrap();
        assert!(matches!(
            mgr.acquire_write(a, &path).await,
            Err(LockError::WouldEscalate { .. })
        ));

        // Explicit escalation: release, then request WRITE.
        assert!(mgr.release_read(a, &path));
        mgr.acquire_write(a, &path).await.unwrap();
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn own_write_allows_read_and_rewrite() {
        let mgr = manager(100);
        let a = mgr.new_session();
        let path = rp("org/foo/bar.jar");

        mgr.acquire_write(a, &path).await.unwrap();
        // Reading under one's own WRITE does not block.
        mgr.acquire_read(a, &path).await.unwrap();
        // Re-entering one's own WRITE afterwards is a no-op, not an
        // escalation: the session already owns the exclusive hold.
        mgr.acquire_write(a, &path).await.unwrap();

        // Everything unwinds as a unit and the path is free again.
        let b = mgr.new_session();
        mgr.release_all(a);
        mgr.acquire_write(b, &path).await.unwrap();
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn release_read_is_idempotent() {
        let mgr = manager(100);
        let a = mgr.new_session();
        let path = rp("org/foo/bar.jar");

        mgr.acquire_read(a, &path).await.unwrap();
        assert!(mgr.release_read(a, &path));
        assert!(!mgr.release_read(a, &path));
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn reacquire_read_requires_prior_hold() {
        let mgr = manager(100);
        let a = mgr.new_session();
        let path = rp("org/foo/bar.jar");

        assert!(matches!(
            mgr.reacquire_read(a, &path).await,
            Err(LockError::NeverHeld { .. })
        ));

        mgr.acquire_read(a, &path).await.unwrap();
        mgr.release_read(a, &path);
        mgr.reacquire_read(a, &path).await.unwrap();
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn independent_pairs_in_same_order_never_deadlock() {
        // Regression shape: concurrent POM + directory-metadata upload and
        // download, each locking its own pair in the same order.
        let mgr = manager(2_000);
        let pom = rp("org/foo/1.0/foo-1.0.pom");
        let meta = rp("org/foo/maven-metadata.xml");

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let mgr = mgr.clone();
            let pom = pom.clone();
            let meta = meta.clone();
            tasks.push(tokio::spawn(async move {
                let s = mgr.new_session();
                mgr.acquire_write(s, &pom).await.unwrap();
                mgr.acquire_write(s, &meta).await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
                mgr.release_all(s);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn release_all_frees_everything_at_once() {
        let mgr = manager(1_000);
        let a = mgr.new_session();
        let b = mgr.new_session();
        let p1 = rp("org/a");
        let p2 = rp("org/b");

        mgr.acquire_write(a, &p1).await.unwrap();
        mgr.acquire_read(a, &p2).await.unwrap();
        assert_eq!(mgr.held_by(a).len(), 2);

        mgr.release_all(a);
        assert!(mgr.held_by(a).is_empty());
        mgr.acquire_write(b, &p1).await.unwrap();
        mgr.acquire_write(b, &p2).await.unwrap();
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn unlock_all_read_locks_targets_one_repo() {
        let mgr = manager(1_000);
        let a = mgr.new_session();
        let libs = rp("org/a");
        let other = RepoPath::new("other", "org/a").unwrap();

        mgr.acquire_read(a, &libs).await.unwrap();
        mgr.acquire_read(a, &other).await.unwrap();

        mgr.unlock_all_read_locks("libs");
        assert!(mgr.get_if_locked_by_me(a, &libs).is_none());
        assert!(mgr.get_if_locked_by_me(a, &other).is_some());
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn probe_reports_mode_without_blocking() {
        let mgr = manager(100);
        let a = mgr.new_session();
        let b = mgr.new_session();
        let path = rp("org/a");

        mgr.acquire_write(a, &path).await.unwrap();
        let mine = mgr.get_if_locked_by_me(a, &path).unwrap();
        assert_eq!(mine.mode, LockMode::Write);
        assert!(mgr.get_if_locked_by_me(b, &path).is_none());
    }
}
