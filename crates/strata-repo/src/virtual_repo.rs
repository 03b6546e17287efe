use bytes::Bytes;
use strata_core::{PathPatterns, RepoPath};
use strata_store::NodeInfo;
use tracing::{debug, trace, warn};

use crate::{
    expiry,
    local::LocalRepo,
    pom::{self, PomCleanupPolicy},
    registry::RepoRegistry,
    RepoError, RepoResult, Session,
};

/// Resolved content plus the key of the member repository that supplied it.
#[derive(Debug)]
pub struct ResolvedResource {
    pub source_key: String,
    pub content: Bytes,
}

/// Ordered aggregation of other repositories under one key.
///
/// Resolution walks the member list in configuration order; the first member
/// that accepts the path and has the content wins, and later members are
/// never consulted for that request. A member that fails (origin timeout,
/// storage error) is logged and skipped, so one broken member cannot shadow
/// content further down the list.
///
/// POMs are intercepted on the way out when a cleanup policy is set: the
/// transformed copy is persisted in this repository's own storage and served
/// from there on subsequent requests.
pub struct VirtualRepo {
    key: String,
    members: Vec<String>,
    policy: PomCleanupPolicy,
    patterns: PathPatterns,
    /// Own local storage, holding transformed POM copies.
    storage: LocalRepo,
}

impl VirtualRepo {
    pub fn new(
        key: impl Into<String>,
        members: Vec<String>,
        policy: PomCleanupPolicy,
        patterns: PathPatterns,
        storage: LocalRepo,
    ) -> Self {
        Self {
            key: key.into(),
            members,
            policy,
            patterns,
            storage,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn accepts(&self, rel_path: &str) -> bool {
        self.patterns.accepts(rel_path)
    }

    fn intercepts(&self, rp: &RepoPath) -> bool {
        self.policy != PomCleanupPolicy::Nothing && rp.extension() == Some("pom")
    }

    /// Resolve content through the member list.
    pub async fn retrieve(
        &self,
        registry: &RepoRegistry,
        session: &Session,
        rel_path: &str,
    ) -> RepoResult<ResolvedResource> {
        let rp = RepoPath::new(&self.key, rel_path)?;
        if !self.accepts(rp.path()) {
            return Err(RepoError::ItemNotFound(rp));
        }

        if self.intercepts(&rp) {
            if let Ok(content) = self.storage.read(session, rp.path()).await {
                trace!(path = %rp, "serving persisted transformed POM");
                return Ok(ResolvedResource {
                    source_key: self.key.clone(),
                    content,
                });
            }
        }

        for member_key in &self.members {
            let Some(member) = registry.member(member_key) else {
                warn!(repo = %self.key, member = %member_key, "unresolvable member, skipping");
                continue;
            };
            if !member.accepts(rp.path()) {
                continue;
            }
            match member.fetch(session, rp.path()).await {
                Ok(content) => {
                    debug!(path = %rp, source = %member_key, "resolved through member");
                    return self.finish(session, &rp, member_key, content).await;
                }
                Err(RepoError::ItemNotFound(_)) => continue,
                Err(err) => {
                    warn!(path = %rp, member = %member_key, error = %err,
                        "member failed, trying next");
                }
            }
        }
        Err(RepoError::ItemNotFound(rp))
    }

    async fn finish(
        &self,
        session: &Session,
        rp: &RepoPath,
        source_key: &str,
        content: Bytes,
    ) -> RepoResult<ResolvedResource> {
        if !self.intercepts(rp) {
            return Ok(ResolvedResource {
                source_key: source_key.to_string(),
                content,
            });
        }

        // A POM that cannot be cleaned must not be served at all; the
        // failure reason travels with the unfound result.
        let cleaned =
            pom::cleanup(self.policy, &content).map_err(|reason| RepoError::BadOriginContent {
                path: rp.clone(),
                reason,
            })?;
        self.storage
            .save_resource(
                session,
                rp.path(),
                cleaned.as_bytes(),
                expiry::content_properties(expiry::now_ms()),
            )
            .await?;
        debug!(path = %rp, policy = %self.policy, "persisted transformed POM");
        Ok(ResolvedResource {
            source_key: source_key.to_string(),
            content: Bytes::from(cleaned),
        })
    }

    /// Aggregated folder listing across members, first-seen name wins.
    pub async fn list(
        &self,
        registry: &RepoRegistry,
        rel_path: &str,
    ) -> RepoResult<Vec<NodeInfo>> {
        let rp = RepoPath::new(&self.key, rel_path)?;
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for member_key in &self.members {
            let Some(member) = registry.member(member_key) else {
                continue;
            };
            match member.list(rp.path()).await {
                Ok(children) => {
                    for child in children {
                        if seen.insert(child.name().to_string()) {
                            out.push(child);
                        }
                    }
                }
                Err(RepoError::ItemNotFound(_) | RepoError::Storage(_)) => continue,
                Err(err) => return Err(err),
            }
        }
        if out.is_empty() && seen.is_empty() {
            return Err(RepoError::ItemNotFound(rp));
        }
        out.sort_by(|a, b| a.name().cmp(b.name()).then(a.path.cmp(&b.path)));
        Ok(out)
    }
}
