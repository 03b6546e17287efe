use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// String properties stored alongside node content.
///
/// Cached-resource freshness metadata lives here, next to the bytes it
/// describes, so cache and content can never disagree.
pub type Properties = BTreeMap<String, String>;

/// Kind of a stored node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    File,
    Folder,
}

/// Metadata snapshot of a stored node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    /// Absolute `/`-separated store path.
    pub path: String,
    pub node_type: NodeType,
    /// Content length for files, 0 for folders.
    pub len: u64,
    pub properties: Properties,
}

impl NodeInfo {
    pub fn is_file(&self) -> bool {
        self.node_type == NodeType::File
    }

    pub fn is_folder(&self) -> bool {
        self.node_type == NodeType::Folder
    }

    /// Last path segment.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}
