//! Object Tree - hierarchy reconstruction for the workspace object graph
//!
//! The server describes its object graph as a flat snapshot: an ordered list of
//! `/`-delimited paths, a path → id map, and an id → record map. This crate
//! turns that snapshot into a nested [`ObjectTree`] while carrying client-only
//! view state (expansion, selection) forward from the previously displayed tree.
//!
//! It has no I/O and no async runtime dependency; the session layer feeds it
//! decoded snapshots.
//!
//! # Example
//!
//! ```
//! use object_tree::{ObjectTree, Snapshot, reconcile};
//!
//! let snapshot: Snapshot = serde_json::from_value(serde_json::json!({
//!     "hierarchy": ["/World", "/World/Camera"],
//!     "nodePaths": {"/World": "w", "/World/Camera": "c"},
//!     "nodes": {
//!         "w": {"name": "World", "components": []},
//!         "c": {"name": "Camera", "components": []}
//!     }
//! }))
//! .unwrap();
//!
//! let tree = reconcile(&snapshot, &ObjectTree::empty()).unwrap();
//! assert_eq!(tree.roots()[0].children[0].name, "Camera");
//! ```

mod error;
mod reconcile;
mod snapshot;
mod tree;

pub use error::ReconcileError;
pub use reconcile::{HierarchyIndex, reconcile};
pub use snapshot::{ComponentRecord, ComponentType, NodeRecord, ProjectRecord, Snapshot};
pub use tree::{HierarchyView, ObjectTree, ROOT_ID, TreeNode, ViewFlags};
