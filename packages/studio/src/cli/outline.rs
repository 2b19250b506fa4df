use std::fmt::Write;

use object_tree::{ObjectTree, TreeNode};

/// Render the tree as an indented outline. Collapsed nodes hide their
/// children; the selected node is starred.
///
/// ```text
/// - World  [world]
///       Lamp  [lamp] *
/// + Props  [props]
/// ```
pub fn render(tree: &ObjectTree) -> String {
    let mut out = String::new();
    if tree.is_empty() {
        out.push_str("(empty)\n");
        return out;
    }
    for node in tree.roots() {
        render_node(&mut out, node, 0);
    }
    out
}

fn render_node(out: &mut String, node: &TreeNode, level: usize) {
    let marker = match (node.is_expandable(), node.expanded) {
        (false, _) => ' ',
        (true, true) => '-',
        (true, false) => '+',
    };
    let _ = write!(out, "{}{marker} {}  [{}]", "    ".repeat(level), node.name, node.id);
    if node.selected {
        out.push_str(" *");
    }
    out.push('\n');
    if node.expanded {
        for child in &node.children {
            render_node(out, child, level + 1);
        }
    }
}
