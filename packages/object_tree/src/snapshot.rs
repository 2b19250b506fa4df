//! Wire model for the server's full-state push.
//!
//! Field names follow the server's camelCase encoding. The server may send
//! `null` for empty lists, so list fields decode `null` as empty.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Deserializer, Serialize};

/// One full-state payload describing the entire object hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Every live node's path, parents before children.
    #[serde(default, deserialize_with = "null_as_default")]
    pub hierarchy: Vec<String>,
    /// Path → node id.
    #[serde(default, deserialize_with = "null_as_default")]
    pub node_paths: HashMap<String, String>,
    /// Node id → record.
    #[serde(default, deserialize_with = "null_as_default")]
    pub nodes: HashMap<String, NodeRecord>,
    /// Server-side selection; empty when nothing is selected.
    #[serde(default, deserialize_with = "null_as_default")]
    pub selected_node: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub current_project: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub projects: Vec<ProjectRecord>,
    /// Component types the server can attach to a node.
    #[serde(default, deserialize_with = "null_as_default")]
    pub components: Vec<ComponentType>,
}

impl Snapshot {
    /// The server's selected node id, if any.
    pub fn selected_node(&self) -> Option<&str> {
        Some(self.selected_node.as_str()).filter(|id| !id.is_empty())
    }

    /// Resolve a path to its node id and record.
    pub fn resolve(&self, path: &str) -> Option<(&str, Option<&NodeRecord>)> {
        let id = self.node_paths.get(path)?;
        Some((id.as_str(), self.nodes.get(id)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub index: usize,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub components: Vec<ComponentRecord>,
}

impl NodeRecord {
    /// De-duplicated union of every component's `related` list.
    pub fn related_components(&self) -> BTreeSet<String> {
        self.components
            .iter()
            .flat_map(|c| c.related.iter().cloned())
            .collect()
    }
}

/// A component attached to a node. Only the fields needed for the tree are
/// decoded; inspector fields and buttons are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub filepath: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub related: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentType {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub filepath: String,
}

fn default_active() -> bool {
    true
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
