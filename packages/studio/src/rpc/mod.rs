//! RPC over a byte stream.
//!
//! Submodules:
//! - `framing`: length-prefixed JSON frames (call / reply / error)
//! - `params`: call payloads with the servers' field casing
//! - `session`: one multiplexed connection with outbound calls and push handlers

pub mod framing;
pub mod params;
mod session;

pub use session::{Handler, Session};

/// Method names shared with the agent and workspace servers. Case-sensitive.
pub mod method {
    // client → agent
    pub const CONNECT: &str = "connect";

    // client → workspace
    pub const SUBSCRIBE: &str = "subscribe";
    pub const SELECT_NODE: &str = "selectNode";
    pub const UPDATE_NODE: &str = "updateNode";
    pub const APPEND_NODE: &str = "appendNode";
    pub const DELETE_NODE: &str = "deleteNode";
    pub const MOVE_NODE: &str = "moveNode";
    pub const APPEND_COMPONENT: &str = "appendComponent";
    pub const REMOVE_COMPONENT: &str = "removeComponent";
    pub const CALL_METHOD: &str = "callMethod";
    pub const RELOAD: &str = "reload";

    // workspace → client
    pub const STATE: &str = "state";
    pub const SHUTDOWN: &str = "shutdown";
}
