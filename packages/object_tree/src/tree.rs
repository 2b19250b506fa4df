//! UI-facing tree built from a snapshot.

use std::collections::{BTreeSet, HashMap};

/// Id of the synthetic container holding the top-level nodes.
pub const ROOT_ID: &str = "tractor-root";

/// Client-only view state for one node. Never sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewFlags {
    pub expanded: bool,
    pub selected: bool,
}

impl Default for ViewFlags {
    fn default() -> Self {
        Self {
            expanded: true,
            selected: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub id: String,
    pub name: String,
    pub abs_path: String,
    pub children: Vec<TreeNode>,
    pub expanded: bool,
    pub selected: bool,
    pub related_components: BTreeSet<String>,
}

impl TreeNode {
    pub fn flags(&self) -> ViewFlags {
        ViewFlags {
            expanded: self.expanded,
            selected: self.selected,
        }
    }

    /// Nesting depth, counted as the number of `/` in the path.
    pub fn depth(&self) -> usize {
        self.abs_path.matches('/').count()
    }

    pub fn is_expandable(&self) -> bool {
        !self.children.is_empty()
    }
}

/// The displayed tree: a synthetic, non-selectable root whose children are
/// the depth-1 nodes in hierarchy order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectTree {
    roots: Vec<TreeNode>,
}

impl ObjectTree {
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn from_roots(roots: Vec<TreeNode>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[TreeNode] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Number of nodes, not counting the synthetic root.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Depth-first, pre-order walk over every node.
    pub fn iter(&self) -> Walk<'_> {
        Walk {
            stack: self.roots.iter().rev().collect(),
        }
    }

    /// Look up a node by id anywhere in the tree.
    pub fn find(&self, id: &str) -> Option<&TreeNode> {
        self.iter().find(|n| n.id == id)
    }

    pub fn find_path(&self, abs_path: &str) -> Option<&TreeNode> {
        self.iter().find(|n| n.abs_path == abs_path)
    }

    pub fn selected(&self) -> Option<&TreeNode> {
        self.iter().find(|n| n.selected)
    }

    /// View flags of every node, keyed by id.
    pub fn view_state(&self) -> HashMap<&str, ViewFlags> {
        self.iter().map(|n| (n.id.as_str(), n.flags())).collect()
    }

    fn for_each_mut(&mut self, mut f: impl FnMut(&mut TreeNode)) {
        let mut stack: Vec<&mut TreeNode> = self.roots.iter_mut().collect();
        while let Some(node) = stack.pop() {
            f(node);
            stack.extend(node.children.iter_mut());
        }
    }
}

pub struct Walk<'a> {
    stack: Vec<&'a TreeNode>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a TreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// What a presentation layer needs from a hierarchical view model.
///
/// Mutations touch client-only state; they return `false` when no node has
/// the given id.
pub trait HierarchyView {
    fn top_level(&self) -> &[TreeNode];

    fn node(&self, id: &str) -> Option<&TreeNode>;

    fn set_expanded(&mut self, id: &str, expanded: bool) -> bool;

    /// Make `id` the single selected node.
    fn select(&mut self, id: &str) -> bool;
}

impl HierarchyView for ObjectTree {
    fn top_level(&self) -> &[TreeNode] {
        self.roots()
    }

    fn node(&self, id: &str) -> Option<&TreeNode> {
        self.find(id)
    }

    fn set_expanded(&mut self, id: &str, expanded: bool) -> bool {
        let mut found = false;
        self.for_each_mut(|n| {
            if n.id == id {
                n.expanded = expanded;
                found = true;
            }
        });
        found
    }

    fn select(&mut self, id: &str) -> bool {
        if self.find(id).is_none() {
            return false;
        }
        self.for_each_mut(|n| n.selected = n.id == id);
        true
    }
}
