use async_trait::async_trait;
use bytes::Bytes;

use crate::{NodeInfo, NodeType, Properties, StoreResult};

/// Narrow hierarchical node store consumed by the repository engine.
///
/// All paths are absolute, `/`-separated, without leading slash, rooted under
/// a fixed namespace prefix per concern (see [`crate::layout`]). The store is
/// the single source of truth for content; concurrency control lives above it
/// in the lock manager.
#[async_trait]
pub trait BackingStore: Send + Sync {
    async fn exists(&self, path: &str) -> StoreResult<bool>;

    /// Node metadata, or `None` when absent.
    async fn node(&self, path: &str) -> StoreResult<Option<NodeInfo>>;

    /// Create a node. Folder creation is recursive; creating an existing
    /// node of the same type is a no-op.
    async fn add_node(&self, path: &str, node_type: NodeType) -> StoreResult<()>;

    /// Read full file content.
    async fn read_file(&self, path: &str) -> StoreResult<Bytes>;

    /// Write file content and properties. The write is atomic from the point
    /// of view of readers (temp-then-rename for file-backed stores). Parent
    /// folders are created as needed.
    async fn write_file(&self, path: &str, data: &[u8], props: Properties) -> StoreResult<()>;

    /// Replace the properties of an existing node.
    async fn set_properties(&self, path: &str, props: Properties) -> StoreResult<()>;

    /// Move a node (file or whole folder) to a new absolute path. Parent
    /// folders of the target are created as needed.
    async fn move_node(&self, src: &str, dst: &str) -> StoreResult<()>;

    /// Delete a node, recursively for folders. Deleting an absent node is a
    /// no-op.
    async fn delete(&self, path: &str) -> StoreResult<()>;

    /// Children of a folder node.
    async fn list_children(&self, path: &str) -> StoreResult<Vec<NodeInfo>>;

    /// Flush pending writes of the current unit of work. Called once on
    /// session commit, never on rollback.
    async fn save(&self) -> StoreResult<()>;
}
