use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;

use crate::{BackingStore, NodeInfo, NodeType, Properties, StoreError, StoreResult};

/// Filesystem-backed store.
///
/// Store paths map 1:1 onto paths under `root`. File writes are crash-safe
/// via write-temp-then-rename. Node properties are kept in a hidden sidecar
/// file (`.{name}.props.json`) in the same directory as the node, so content
/// and properties move and die together.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn fs_path(&self, path: &str) -> StoreResult<PathBuf> {
        validate(path)?;
        Ok(self.root.join(path))
    }

    fn sidecar_path(&self, path: &str) -> StoreResult<PathBuf> {
        let fs = self.fs_path(path)?;
        Ok(sidecar_of(&fs))
    }

    async fn read_properties(&self, path: &str) -> StoreResult<Properties> {
        let sidecar = self.sidecar_path(path)?;
        match tokio::fs::read(&sidecar).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Properties::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_properties(&self, path: &str, props: &Properties) -> StoreResult<()> {
        let sidecar = self.sidecar_path(path)?;
        if props.is_empty() {
            match tokio::fs::remove_file(&sidecar).await {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
        let raw = serde_json::to_vec_pretty(props)?;
        atomic_write(&sidecar, &raw).await
    }
}

fn validate(path: &str) -> StoreResult<()> {
    if path.is_empty() {
        return Ok(());
    }
    if path.starts_with('/') || path.split('/').any(|s| s.is_empty() || s == ".." || s == ".") {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(())
}

fn sidecar_of(fs: &Path) -> PathBuf {
    let name = fs
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    fs.with_file_name(format!(".{name}.props.json"))
}

fn is_sidecar(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(".props.json")
}

/// Write-temp-then-rename. The target is either the old content or the new,
/// never a partial write.
async fn atomic_write(target: &Path, data: &[u8]) -> StoreResult<()> {
    let target = target.to_path_buf();
    let data = data.to_vec();
    tokio::task::spawn_blocking(move || -> StoreResult<()> {
        let parent = target
            .parent()
            .ok_or_else(|| StoreError::InvalidPath(target.display().to_string()))?;
        std::fs::create_dir_all(parent)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        std::io::Write::write_all(&mut tmp, &data)?;
        tmp.persist(&target).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
}

#[async_trait]
impl BackingStore for FsStore {
    async fn exists(&self, path: &str) -> StoreResult<bool> {
        let fs = self.fs_path(path)?;
        Ok(tokio::fs::try_exists(&fs).await?)
    }

    async fn node(&self, path: &str) -> StoreResult<Option<NodeInfo>> {
        let fs = self.fs_path(path)?;
        let meta = match tokio::fs::metadata(&fs).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let (node_type, len) = if meta.is_dir() {
            (NodeType::Folder, 0)
        } else {
            (NodeType::File, meta.len())
        };
        Ok(Some(NodeInfo {
            path: path.to_string(),
            node_type,
            len,
            properties: self.read_properties(path).await?,
        }))
    }

    async fn add_node(&self, path: &str, node_type: NodeType) -> StoreResult<()> {
        let fs = self.fs_path(path)?;
        match node_type {
            NodeType::Folder => tokio::fs::create_dir_all(&fs).await?,
            NodeType::File => {
                if !tokio::fs::try_exists(&fs).await? {
                    atomic_write(&fs, &[]).await?;
                }
            }
        }
        Ok(())
    }

    async fn read_file(&self, path: &str) -> StoreResult<Bytes> {
        let fs = self.fs_path(path)?;
        match tokio::fs::read(&fs).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_file(&self, path: &str, data: &[u8], props: Properties) -> StoreResult<()> {
        let fs = self.fs_path(path)?;
        atomic_write(&fs, data).await?;
        self.write_properties(path, &props).await?;
        trace!(path, bytes = data.len(), "fs store: wrote file");
        Ok(())
    }

    async fn set_properties(&self, path: &str, props: Properties) -> StoreResult<()> {
        if !self.exists(path).await? {
            return Err(StoreError::NotFound(path.to_string()));
        }
        self.write_properties(path, &props).await
    }

    async fn move_node(&self, src: &str, dst: &str) -> StoreResult<()> {
        let src_fs = self.fs_path(src)?;
        let dst_fs = self.fs_path(dst)?;
        if !tokio::fs::try_exists(&src_fs).await? {
            return Err(StoreError::NotFound(src.to_string()));
        }
        if let Some(parent) = dst_fs.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&src_fs, &dst_fs).await?;

        // Sidecar travels with its file.
        let src_side = sidecar_of(&src_fs);
        if tokio::fs::try_exists(&src_side).await? {
            tokio::fs::rename(&src_side, sidecar_of(&dst_fs)).await?;
        }
        trace!(src, dst, "fs store: moved node");
        Ok(())
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        let fs = self.fs_path(path)?;
        let meta = match tokio::fs::metadata(&fs).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if meta.is_dir() {
            tokio::fs::remove_dir_all(&fs).await?;
        } else {
            tokio::fs::remove_file(&fs).await?;
            let side = sidecar_of(&fs);
            if tokio::fs::try_exists(&side).await? {
                tokio::fs::remove_file(&side).await?;
            }
        }
        trace!(path, "fs store: deleted node");
        Ok(())
    }

    async fn list_children(&self, path: &str) -> StoreResult<Vec<NodeInfo>> {
        let fs = self.fs_path(path)?;
        let meta = tokio::fs::metadata(&fs)
            .await
            .map_err(|_| StoreError::NotFound(path.to_string()))?;
        if !meta.is_dir() {
            return Err(StoreError::NotAFolder(path.to_string()));
        }

        let mut children = Vec::new();
        let mut entries = tokio::fs::read_dir(&fs).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_sidecar(&name) {
                continue;
            }
            let child_path = if path.is_empty() {
                name.clone()
            } else {
                format!("{path}/{name}")
            };
            if let Some(info) = self.node(&child_path).await? {
                children.push(info);
            }
        }
        children.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(children)
    }

    async fn save(&self) -> StoreResult<()> {
        // Writes are applied eagerly and individually crash-safe; the commit
        // boundary has nothing left to flush here.
        trace!("fs store: save");
        Ok(())
    }
}
