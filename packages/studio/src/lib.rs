//! Client side of the tractor studio: keeps an editor's object tree in sync
//! with a workspace served by the local agent.
//!
//! - [`relay`] bridges WebSocket clients to the agent's unix sockets.
//! - [`rpc`] carries calls and server pushes over one byte stream.
//! - [`manager`] runs the agent → workspace handshake and reconnects.
//! - [`dispatcher`] turns `state` pushes into an [`object_tree::ObjectTree`]
//!   and sends edits back.

pub mod config;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod manager;
mod pump;
pub mod relay;
pub mod rpc;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use dispatcher::StateDispatcher;
pub use endpoint::Endpoint;
pub use error::SessionError;
pub use manager::{ConnectionManager, ConnectionState, WorkspaceConnection};
pub use rpc::Session;
