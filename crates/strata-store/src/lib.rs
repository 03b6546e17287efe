#![forbid(unsafe_code)]

//! Backing store seam for the strata artifact repository.
//!
//! The engine never touches bytes directly; it goes through [`BackingStore`],
//! a narrow hierarchical node interface addressed by absolute `/`-separated
//! paths. Two implementations are provided: [`FsStore`] (filesystem with
//! crash-safe writes and sidecar JSON properties) and [`MemStore`] (in-memory
//! twin for tests).

mod error;
mod fs;
pub mod layout;
mod memory;
mod node;
mod store;

pub use error::{StoreError, StoreResult};
pub use fs::FsStore;
pub use memory::MemStore;
pub use node::{NodeInfo, NodeType, Properties};
pub use store::BackingStore;
