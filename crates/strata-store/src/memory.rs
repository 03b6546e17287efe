use std::collections::BTreeMap;
use parking_lot::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{BackingStore, NodeInfo, NodeType, Properties, StoreError, StoreResult};

#[derive(Debug, Clone)]
struct MemNode {
    node_type: NodeType,
    data: Bytes,
    properties: Properties,
}

/// In-memory twin of [`crate::FsStore`] for tests.
///
/// Same contract, no filesystem. Nodes live in a sorted map keyed by absolute
/// path, which makes prefix scans for folder listings and recursive moves
/// straightforward.
#[derive(Debug, Default)]
pub struct MemStore {
    nodes: Mutex<BTreeMap<String, MemNode>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_parents(nodes: &mut BTreeMap<String, MemNode>, path: &str) {
        let mut prefix = String::new();
        for segment in path.split('/') {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);
            if prefix == path {
                break;
            }
            nodes.entry(prefix.clone()).or_insert_with(|| MemNode {
                node_type: NodeType::Folder,
                data: Bytes::new(),
                properties: Properties::new(),
            });
        }
    }

    fn info(path: &str, node: &MemNode) -> NodeInfo {
        NodeInfo {
            path: path.to_string(),
            node_type: node.node_type,
            len: node.data.len() as u64,
            properties: node.properties.clone(),
        }
    }
}

#[async_trait]
impl BackingStore for MemStore {
    async fn exists(&self, path: &str) -> StoreResult<bool> {
        Ok(self.nodes.lock().contains_key(path))
    }

    async fn node(&self, path: &str) -> StoreResult<Option<NodeInfo>> {
        Ok(self
            .nodes
            .lock()
            .get(path)
            .map(|n| Self::info(path, n)))
    }

    async fn add_node(&self, path: &str, node_type: NodeType) -> StoreResult<()> {
        let mut nodes = self.nodes.lock();
        Self::ensure_parents(&mut nodes, path);
        nodes.entry(path.to_string()).or_insert_with(|| MemNode {
            node_type,
            data: Bytes::new(),
            properties: Properties::new(),
        });
        Ok(())
    }

    async fn read_file(&self, path: &str) -> StoreResult<Bytes> {
        self.nodes
            .lock()
            .get(path)
            .map(|n| n.data.clone())
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn write_file(&self, path: &str, data: &[u8], props: Properties) -> StoreResult<()> {
        let mut nodes = self.nodes.lock();
        Self::ensure_parents(&mut nodes, path);
        nodes.insert(
            path.to_string(),
            MemNode {
                node_type: NodeType::File,
                data: Bytes::copy_from_slice(data),
                properties: props,
            },
        );
        Ok(())
    }

    async fn set_properties(&self, path: &str, props: Properties) -> StoreResult<()> {
        let mut nodes = self.nodes.lock();
        let node = nodes
            .get_mut(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        node.properties = props;
        Ok(())
    }

    async fn move_node(&self, src: &str, dst: &str) -> StoreResult<()> {
        let mut nodes = self.nodes.lock();
        if !nodes.contains_key(src) {
            return Err(StoreError::NotFound(src.to_string()));
        }
        Self::ensure_parents(&mut nodes, dst);

        let subtree_prefix = format!("{src}/");
        let moved: Vec<String> = nodes
            .keys()
            .filter(|k| *k == src || k.starts_with(&subtree_prefix))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = nodes.remove(&old) {
                let new = format!("{dst}{}", &old[src.len()..]);
                nodes.insert(new, node);
            }
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        let mut nodes = self.nodes.lock();
        let subtree_prefix = format!("{path}/");
        nodes.retain(|k, _| k != path && !k.starts_with(&subtree_prefix));
        Ok(())
    }

    async fn list_children(&self, path: &str) -> StoreResult<Vec<NodeInfo>> {
        let nodes = self.nodes.lock();
        if !path.is_empty() {
            match nodes.get(path) {
                None => return Err(StoreError::NotFound(path.to_string())),
                Some(n) if n.node_type != NodeType::Folder => {
                    return Err(StoreError::NotAFolder(path.to_string()));
                }
                Some(_) => {}
            }
        }
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };
        Ok(nodes
            .iter()
            .filter(|(k, _)| {
                k.starts_with(&prefix) && !k[prefix.len()..].is_empty() && !k[prefix.len()..].contains('/')
            })
            .map(|(k, n)| Self::info(k, n))
            .collect())
    }

    async fn save(&self) -> StoreResult<()> {
        Ok(())
    }
}
