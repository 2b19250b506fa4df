//! Snapshot → tree reconciliation.
//!
//! A path's direct children are the paths that start with `path + "/"` and
//! contain no further `/` after that prefix. Grouping every path under its
//! parent prefix once gives the same answer as scanning the whole list per
//! node, without the quadratic cost.

use std::collections::{HashMap, HashSet};

use crate::error::ReconcileError;
use crate::snapshot::Snapshot;
use crate::tree::{ObjectTree, TreeNode, ViewFlags};

/// Parent key of depth-1 paths.
const TOP_LEVEL: &str = "";

/// Validated `hierarchy`, grouped by parent path, in snapshot order.
#[derive(Debug)]
pub struct HierarchyIndex<'a> {
    children: HashMap<&'a str, Vec<&'a str>>,
}

impl<'a> HierarchyIndex<'a> {
    /// Index and validate a snapshot. Rejects anything that would make the
    /// resulting tree ambiguous or incomplete.
    pub fn build(snapshot: &'a Snapshot) -> Result<Self, ReconcileError> {
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut paths: HashSet<&str> = HashSet::with_capacity(snapshot.hierarchy.len());
        let mut ids: HashSet<&str> = HashSet::with_capacity(snapshot.hierarchy.len());

        for path in &snapshot.hierarchy {
            let path = path.as_str();
            if !is_valid_path(path) {
                return Err(ReconcileError::InvalidPath {
                    path: path.to_string(),
                });
            }
            if !paths.insert(path) {
                return Err(ReconcileError::DuplicatePath {
                    path: path.to_string(),
                });
            }
            let (id, record) =
                snapshot
                    .resolve(path)
                    .ok_or_else(|| ReconcileError::UnmappedPath {
                        path: path.to_string(),
                    })?;
            if record.is_none() {
                return Err(ReconcileError::MissingNode {
                    id: id.to_string(),
                    path: path.to_string(),
                });
            }
            if !ids.insert(id) {
                return Err(ReconcileError::DuplicateId { id: id.to_string() });
            }
            children.entry(parent_of(path)).or_default().push(path);
        }

        for path in &snapshot.hierarchy {
            let parent = parent_of(path);
            if parent != TOP_LEVEL && !paths.contains(parent) {
                return Err(ReconcileError::OrphanPath {
                    path: path.clone(),
                    parent: parent.to_string(),
                });
            }
        }

        // Ids mapped by paths outside the hierarchy still need a record.
        let mut extra: Vec<_> = snapshot
            .node_paths
            .iter()
            .filter(|(path, _)| !paths.contains(path.as_str()))
            .collect();
        extra.sort();
        for (path, id) in extra {
            if !snapshot.nodes.contains_key(id) {
                return Err(ReconcileError::MissingNode {
                    id: id.clone(),
                    path: path.clone(),
                });
            }
        }

        Ok(Self { children })
    }

    /// Depth-1 paths in hierarchy order.
    pub fn top_level(&self) -> &[&'a str] {
        self.children_of(TOP_LEVEL)
    }

    /// Direct children of `path` in hierarchy order.
    pub fn children_of(&self, path: &str) -> &[&'a str] {
        self.children.get(path).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Build the tree for `snapshot`, carrying expansion and selection forward
/// from `previous` by node id.
///
/// Nodes with no counterpart in `previous` start expanded and unselected.
/// On error nothing is built; the caller keeps displaying `previous`.
pub fn reconcile(snapshot: &Snapshot, previous: &ObjectTree) -> Result<ObjectTree, ReconcileError> {
    let index = HierarchyIndex::build(snapshot)?;
    let carried = previous.view_state();

    let roots = index
        .top_level()
        .iter()
        .map(|path| build_node(snapshot, &index, &carried, path))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ObjectTree::from_roots(roots))
}

fn build_node(
    snapshot: &Snapshot,
    index: &HierarchyIndex<'_>,
    carried: &HashMap<&str, ViewFlags>,
    path: &str,
) -> Result<TreeNode, ReconcileError> {
    let (id, record) = snapshot
        .resolve(path)
        .ok_or_else(|| ReconcileError::UnmappedPath {
            path: path.to_string(),
        })?;
    let record = record.ok_or_else(|| ReconcileError::MissingNode {
        id: id.to_string(),
        path: path.to_string(),
    })?;

    let children = index
        .children_of(path)
        .iter()
        .map(|child| build_node(snapshot, index, carried, child))
        .collect::<Result<Vec<_>, _>>()?;

    let flags = carried.get(id).copied().unwrap_or_default();

    Ok(TreeNode {
        id: id.to_string(),
        name: record.name.clone(),
        abs_path: path.to_string(),
        children,
        expanded: flags.expanded,
        selected: flags.selected,
        related_components: record.related_components(),
    })
}

fn parent_of(path: &str) -> &str {
    path.rfind('/').map(|i| &path[..i]).unwrap_or(TOP_LEVEL)
}

fn is_valid_path(path: &str) -> bool {
    path.starts_with('/') && path[1..].split('/').all(|segment| !segment.is_empty())
}
