//! Configuration for [`Strata`](crate::Strata).

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use strata_repo::pom::PomCleanupPolicy;

fn default_lock_timeout_secs() -> u64 {
    5
}

fn default_retrieval_period_secs() -> u64 {
    600
}

fn default_failed_period_secs() -> u64 {
    30
}

fn default_missed_period_secs() -> u64 {
    600
}

/// Whole-service configuration, deserializable from JSON.
///
/// Every repository key must be unique, including the `<key>-cache` keys
/// derived for remote repositories; [`Strata::open`](crate::Strata::open)
/// rejects conflicts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrataConfig {
    /// Root directory of the backing store.
    pub data_dir: PathBuf,
    /// Bound on a single lock acquisition wait, in seconds.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
    /// Exclude patterns applied to every repository on top of its own.
    #[serde(default)]
    pub global_excludes: Vec<String>,
    #[serde(default)]
    pub local: Vec<LocalRepoConfig>,
    #[serde(default)]
    pub remote: Vec<RemoteRepoConfig>,
    #[serde(default, rename = "virtual")]
    pub virt: Vec<VirtualRepoConfig>,
}

impl StrataConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            lock_timeout_secs: default_lock_timeout_secs(),
            global_excludes: Vec::new(),
            local: Vec::new(),
            remote: Vec::new(),
            virt: Vec::new(),
        }
    }

    pub fn with_global_excludes(mut self, excludes: Vec<String>) -> Self {
        self.global_excludes = excludes;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_local(mut self, repo: LocalRepoConfig) -> Self {
        self.local.push(repo);
        self
    }

    pub fn with_remote(mut self, repo: RemoteRepoConfig) -> Self {
        self.remote.push(repo);
        self
    }

    pub fn with_virtual(mut self, repo: VirtualRepoConfig) -> Self {
        self.virt.push(repo);
        self
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalRepoConfig {
    pub key: String,
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
}

impl LocalRepoConfig {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            includes: Vec::new(),
            excludes: Vec::new(),
        }
    }

    pub fn with_includes(mut self, includes: Vec<String>) -> Self {
        self.includes = includes;
        self
    }

    pub fn with_excludes(mut self, excludes: Vec<String>) -> Self {
        self.excludes = excludes;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRepoConfig {
    pub key: String,
    /// Origin base URL.
    pub url: String,
    /// Expiry period for mutable cached artifacts, in seconds. Zero means
    /// always expired.
    #[serde(default = "default_retrieval_period_secs")]
    pub retrieval_cache_period_secs: u64,
    /// Suppression period for failed-fetch markers, in seconds.
    #[serde(default = "default_failed_period_secs")]
    pub failed_retrieval_cache_period_secs: u64,
    /// Suppression period for confirmed-miss markers, in seconds.
    #[serde(default = "default_missed_period_secs")]
    pub missed_retrieval_cache_period_secs: u64,
    /// Never talk to the origin; serve whatever the cache has.
    #[serde(default)]
    pub offline: bool,
    /// Propagate origin transport failures instead of degrading to stale
    /// cache content.
    #[serde(default)]
    pub hard_fail: bool,
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
}

impl RemoteRepoConfig {
    pub fn new(key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            url: url.into(),
            retrieval_cache_period_secs: default_retrieval_period_secs(),
            failed_retrieval_cache_period_secs: default_failed_period_secs(),
            missed_retrieval_cache_period_secs: default_missed_period_secs(),
            offline: false,
            hard_fail: false,
            includes: Vec::new(),
            excludes: Vec::new(),
        }
    }

    pub fn with_retrieval_cache_period(mut self, period: Duration) -> Self {
        self.retrieval_cache_period_secs = period.as_secs();
        self
    }

    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn with_hard_fail(mut self, hard_fail: bool) -> Self {
        self.hard_fail = hard_fail;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualRepoConfig {
    pub key: String,
    /// Member keys in resolution order. Local keys, remote keys (resolution
    /// fetches through the proxy) and `<remote>-cache` keys (cached content
    /// only) are all valid.
    pub members: Vec<String>,
    #[serde(default)]
    pub pom_cleanup_policy: PomCleanupPolicy,
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
}

impl VirtualRepoConfig {
    pub fn new(key: impl Into<String>, members: Vec<String>) -> Self {
        Self {
            key: key.into(),
            members,
            pom_cleanup_policy: PomCleanupPolicy::default(),
            includes: Vec::new(),
            excludes: Vec::new(),
        }
    }

    pub fn with_pom_cleanup_policy(mut self, policy: PomCleanupPolicy) -> Self {
        self.pom_cleanup_policy = policy;
        self
    }
}
