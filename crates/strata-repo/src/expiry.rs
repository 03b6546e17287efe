//! Cache freshness decisions for remote-cache content.
//!
//! Freshness metadata travels as node properties next to the cached bytes
//! (see [`strata_store::Properties`]), so the decision here only needs the
//! node snapshot and the wall clock.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use strata_core::{classify, ArtifactClass, RepoPath};
use strata_store::{NodeInfo, Properties};

/// Epoch-millisecond timestamp of the last successful retrieval (or marker
/// write) for this cache entry.
pub const PROP_LAST_UPDATED: &str = "strata.lastUpdated";

/// Marker discriminator property. Absent on real cached content.
pub const PROP_MARKER: &str = "strata.marker";

/// `PROP_MARKER` value for a retrieval that failed on transport.
pub const MARKER_FAILED: &str = "failed";

/// `PROP_MARKER` value for an origin-confirmed 404.
pub const MARKER_MISSED: &str = "missed";

/// What a cache entry represents, for expiry purposes.
///
/// Extends [`ArtifactClass`] with the two negative-result markers a remote
/// cache stores in place of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachedKind {
    Artifact(ArtifactClass),
    FailedFetch,
    ConfirmedMiss,
}

/// Freshness view of one cache entry.
#[derive(Debug, Clone)]
pub struct CachedResource {
    pub kind: CachedKind,
    /// Epoch milliseconds of the last retrieval, 0 when unknown (treated as
    /// infinitely old).
    pub last_updated: u64,
}

impl CachedResource {
    /// Build the freshness view from a cached node's snapshot.
    pub fn from_node(rp: &RepoPath, info: &NodeInfo) -> Self {
        let kind = match info.properties.get(PROP_MARKER).map(String::as_str) {
            Some(MARKER_FAILED) => CachedKind::FailedFetch,
            Some(MARKER_MISSED) => CachedKind::ConfirmedMiss,
            _ => CachedKind::Artifact(classify(rp)),
        };
        let last_updated = info
            .properties
            .get(PROP_LAST_UPDATED)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        Self { kind, last_updated }
    }

    pub fn is_marker(&self) -> bool {
        !matches!(self.kind, CachedKind::Artifact(_))
    }
}

/// Properties stamped onto freshly cached content.
pub fn content_properties(now_ms: u64) -> Properties {
    let mut props = Properties::new();
    props.insert(PROP_LAST_UPDATED.to_string(), now_ms.to_string());
    props
}

/// Properties stamped onto a failed/missed marker node.
pub fn marker_properties(marker: &str, now_ms: u64) -> Properties {
    let mut props = content_properties(now_ms);
    props.insert(PROP_MARKER.to_string(), marker.to_string());
    props
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Per-repository cache expiry configuration.
#[derive(Debug, Clone)]
pub struct ExpiryPolicy {
    /// Expiry period for mutable artifacts (non-unique snapshots and
    /// snapshot metadata). Zero means always expired.
    pub retrieval_cache_period: Duration,
    /// How long a failed-fetch marker suppresses re-fetch attempts.
    pub failed_retrieval_cache_period: Duration,
    /// How long a confirmed-miss marker suppresses re-fetch attempts.
    pub missed_retrieval_cache_period: Duration,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            retrieval_cache_period: Duration::from_secs(600),
            failed_retrieval_cache_period: Duration::from_secs(30),
            missed_retrieval_cache_period: Duration::from_secs(600),
        }
    }
}

impl ExpiryPolicy {
    /// Decision table: should this cache entry be refreshed from the origin?
    ///
    /// Releases and timestamp-qualified snapshots are immutable and never
    /// expire by time, and neither does metadata under a release path. Only
    /// content republished in place (bare `-SNAPSHOT` artifacts, snapshot
    /// metadata) follows the retrieval period.
    pub fn is_expired(&self, res: &CachedResource, now_ms: u64) -> bool {
        let period = match res.kind {
            CachedKind::Artifact(
                ArtifactClass::Release
                | ArtifactClass::UniqueSnapshot
                | ArtifactClass::ReleaseMetadata,
            ) => {
                return false;
            }
            CachedKind::Artifact(
                ArtifactClass::NonUniqueSnapshot | ArtifactClass::SnapshotMetadata,
            ) => self.retrieval_cache_period,
            CachedKind::FailedFetch => self.failed_retrieval_cache_period,
            CachedKind::ConfirmedMiss => self.missed_retrieval_cache_period,
        };
        if period.is_zero() {
            return true;
        }
        now_ms.saturating_sub(res.last_updated) > period.as_millis() as u64
    }
}
