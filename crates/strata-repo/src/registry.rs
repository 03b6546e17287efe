use std::collections::HashMap;

use bytes::Bytes;
use strata_store::NodeInfo;

use crate::{
    local::LocalRepo, remote::RemoteRepo, virtual_repo::VirtualRepo, RepoError, RepoResult,
    Session,
};

/// A configured repository of any kind.
///
/// Closed enum on purpose: the engine dispatches on repository kind in a few
/// places (front end, virtual member resolution) and a trait object would
/// hide exactly the distinctions those places need.
pub enum Repo {
    Local(LocalRepo),
    Remote(RemoteRepo),
    Virtual(VirtualRepo),
}

impl Repo {
    pub fn key(&self) -> &str {
        match self {
            Self::Local(r) => r.key(),
            Self::Remote(r) => r.key(),
            Self::Virtual(r) => r.key(),
        }
    }
}

/// Member view used by virtual repository resolution: something that can be
/// probed for content and fetched from. A remote member fetches through its
/// proxy; a cache key (`<remote>-cache`) exposes only the already-cached
/// content of that remote.
pub enum MemberRepo<'a> {
    Local(&'a LocalRepo),
    Remote(&'a RemoteRepo),
}

impl MemberRepo<'_> {
    pub fn key(&self) -> &str {
        match self {
            Self::Local(r) => r.key(),
            Self::Remote(r) => r.key(),
        }
    }

    pub fn accepts(&self, rel_path: &str) -> bool {
        match self {
            Self::Local(r) => r.accepts(rel_path),
            Self::Remote(r) => r.accepts(rel_path),
        }
    }

    /// Fetch content, reporting [`RepoError::ItemNotFound`] when this member
    /// does not have it.
    pub async fn fetch(&self, session: &Session, rel_path: &str) -> RepoResult<Bytes> {
        match self {
            Self::Local(r) => r.read(session, rel_path).await,
            Self::Remote(r) => r.retrieve(session, rel_path).await,
        }
    }

    /// Locally visible children (a remote member lists its cache).
    pub async fn list(&self, rel_path: &str) -> RepoResult<Vec<NodeInfo>> {
        match self {
            Self::Local(r) => r.list(rel_path).await,
            Self::Remote(r) => r.cache().list(rel_path).await,
        }
    }
}

/// All configured repositories, addressed by key.
///
/// Keys are unique across kinds, and a remote repository additionally
/// reserves its derived cache key, so `central` and `central-cache` can never
/// be claimed by two different configurations.
#[derive(Default)]
pub struct RepoRegistry {
    repos: HashMap<String, Repo>,
    /// cache key -> owning remote key
    cache_owners: HashMap<String, String>,
    order: Vec<String>,
}

impl RepoRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, repo: Repo) -> RepoResult<()> {
        let key = repo.key().to_string();
        if self.repos.contains_key(&key) || self.cache_owners.contains_key(&key) {
            return Err(RepoError::KeyConflict(key));
        }
        if let Repo::Remote(remote) = &repo {
            let cache_key = remote.cache().key().to_string();
            if self.repos.contains_key(&cache_key) || self.cache_owners.contains_key(&cache_key) {
                return Err(RepoError::KeyConflict(cache_key));
            }
            self.cache_owners.insert(cache_key, key.clone());
        }
        self.order.push(key.clone());
        self.repos.insert(key, repo);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Repo> {
        self.repos.get(key)
    }

    pub fn local(&self, key: &str) -> Option<&LocalRepo> {
        match self.repos.get(key) {
            Some(Repo::Local(r)) => Some(r),
            _ => None,
        }
    }

    pub fn remote(&self, key: &str) -> Option<&RemoteRepo> {
        match self.repos.get(key) {
            Some(Repo::Remote(r)) => Some(r),
            _ => None,
        }
    }

    /// Local-storage view of a key: a local repository, or a remote's cache
    /// addressed by its cache key. This is what batch moves operate on.
    pub fn local_view(&self, key: &str) -> Option<&LocalRepo> {
        if let Some(local) = self.local(key) {
            return Some(local);
        }
        let owner = self.cache_owners.get(key)?;
        self.remote(owner).map(RemoteRepo::cache)
    }

    /// Member view for virtual resolution. Virtual repositories are not
    /// valid members (no nesting).
    pub fn member(&self, key: &str) -> Option<MemberRepo<'_>> {
        if let Some(owner) = self.cache_owners.get(key) {
            return self.remote(owner).map(|r| MemberRepo::Local(r.cache()));
        }
        match self.repos.get(key)? {
            Repo::Local(r) => Some(MemberRepo::Local(r)),
            Repo::Remote(r) => Some(MemberRepo::Remote(r)),
            Repo::Virtual(_) => None,
        }
    }

    /// Keys in configuration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}
