use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Immutable `(repository key, relative path)` identity.
///
/// This is the lock key, cache key and trash key for the whole engine, so the
/// representation is kept strictly normalized:
///
/// - `repo_key` is non-empty and contains no `/`.
/// - `path` uses forward slashes only, has no leading or trailing slash, no
///   empty segments and no `..` segments. The empty path denotes the
///   repository root.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoPath {
    repo_key: String,
    path: String,
}

impl RepoPath {
    /// Create a new identity, normalizing `path`.
    pub fn new(repo_key: impl Into<String>, path: impl AsRef<str>) -> CoreResult<Self> {
        let repo_key = repo_key.into();
        if repo_key.is_empty() {
            return Err(CoreError::InvalidRepoKey("empty key".to_string()));
        }
        if repo_key.contains('/') {
            return Err(CoreError::InvalidRepoKey(repo_key));
        }

        Ok(Self {
            repo_key,
            path: normalize(path.as_ref())?,
        })
    }

    /// Identity of the repository root.
    pub fn root(repo_key: impl Into<String>) -> CoreResult<Self> {
        Self::new(repo_key, "")
    }

    pub fn repo_key(&self) -> &str {
        &self.repo_key
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Last path segment, or `None` at the root.
    pub fn name(&self) -> Option<&str> {
        if self.is_root() {
            None
        } else {
            Some(self.path.rsplit('/').next().unwrap_or(&self.path))
        }
    }

    /// File extension of the last segment, if any.
    pub fn extension(&self) -> Option<&str> {
        let name = self.name()?;
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
            _ => None,
        }
    }

    /// Parent identity, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let parent = match self.path.rsplit_once('/') {
            Some((dir, _)) => dir,
            None => "",
        };
        Some(Self {
            repo_key: self.repo_key.clone(),
            path: parent.to_string(),
        })
    }

    /// Child identity under this one.
    pub fn child(&self, name: &str) -> CoreResult<Self> {
        if self.is_root() {
            Self::new(self.repo_key.clone(), name)
        } else {
            Self::new(self.repo_key.clone(), format!("{}/{name}", self.path))
        }
    }

    /// Same relative path in a different repository.
    pub fn in_repo(&self, repo_key: impl Into<String>) -> CoreResult<Self> {
        Self::new(repo_key, &self.path)
    }
}

fn normalize(raw: &str) -> CoreResult<String> {
    let raw = raw.replace('\\', "/");
    let mut segments = Vec::new();
    for segment in raw.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if segment == ".." {
            return Err(CoreError::InvalidPath(raw.clone()));
        }
        segments.push(segment);
    }
    Ok(segments.join("/"))
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repo_key, self.path)
    }
}

impl fmt::Debug for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepoPath({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_slashes_and_segments() {
        let rp = RepoPath::new("libs", "/org//foo/./bar.jar/").unwrap();
        assert_eq!(rp.path(), "org/foo/bar.jar");
        assert_eq!(rp.repo_key(), "libs");
    }

    #[test]
    fn rejects_parent_segments() {
        assert!(RepoPath::new("libs", "org/../etc").is_err());
    }

    #[test]
    fn rejects_bad_repo_keys() {
        assert!(RepoPath::new("", "a").is_err());
        assert!(RepoPath::new("a/b", "a").is_err());
    }

    #[test]
    fn root_has_no_parent_or_name() {
        let rp = RepoPath::root("libs").unwrap();
        assert!(rp.is_root());
        assert!(rp.parent().is_none());
        assert!(rp.name().is_none());
    }

    #[test]
    fn parent_chain_reaches_root() {
        let rp = RepoPath::new("libs", "org/foo/bar.jar").unwrap();
        let parent = rp.parent().unwrap();
        assert_eq!(parent.path(), "org/foo");
        let grandparent = parent.parent().unwrap().parent().unwrap();
        assert!(grandparent.is_root());
    }

    #[test]
    fn extension_of_last_segment() {
        let rp = RepoPath::new("libs", "org/foo-1.0.pom").unwrap();
        assert_eq!(rp.extension(), Some("pom"));
        let dir = RepoPath::new("libs", "org/foo").unwrap();
        assert_eq!(dir.extension(), None);
    }

    #[test]
    fn equality_is_structural() {
        let a = RepoPath::new("libs", "org/foo").unwrap();
        let b = RepoPath::new("libs", "/org/foo/").unwrap();
        assert_eq!(a, b);
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }
}
