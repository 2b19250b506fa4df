//! Call payloads. Field casing follows what the agent and workspace servers
//! decode and must not change.

use serde::{Deserialize, Serialize};

/// Reply to `connect`: the workspace socket to dial next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectReply {
    pub reply: String,
}

/// `updateNode` / `appendNode` / `appendComponent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeParams {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
}

/// `removeComponent`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveComponentParams {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Component")]
    pub component: String,
}

/// `moveNode`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveNodeParams {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Index")]
    pub index: i64,
}
