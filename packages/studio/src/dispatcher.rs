//! Server-push handlers and client calls layered on the active session.
//!
//! The displayed tree lives in a `watch` channel: every accepted `state` push
//! replaces it in one step, and subscribers always see the newest tree.

use std::sync::{Arc, Mutex, RwLock, Weak};

use object_tree::{HierarchyView, ObjectTree, ReconcileError, Snapshot, reconcile};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::rpc::method;
use crate::rpc::params::{MoveNodeParams, NodeParams, RemoveComponentParams};
use crate::rpc::Session;

/// Name given to nodes created without one.
pub const DEFAULT_NODE_NAME: &str = "Empty Object";

/// Fires when the workspace behind one attached session announces shutdown.
#[derive(Debug)]
pub struct ShutdownSignal(oneshot::Receiver<()>);

impl ShutdownSignal {
    /// Resolves on the `shutdown` push. Never resolves if the session goes
    /// away without one.
    pub async fn recv(self) {
        if self.0.await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub struct StateDispatcher {
    tree: watch::Sender<ObjectTree>,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    session: Mutex<Option<Session>>,
}

impl Default for StateDispatcher {
    fn default() -> Self {
        Self {
            tree: watch::Sender::new(ObjectTree::empty()),
            snapshot: RwLock::new(None),
            session: Mutex::new(None),
        }
    }
}

impl StateDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register the `state` and `shutdown` handlers on a fresh session, make
    /// it the target for client calls, and ask the workspace to start
    /// pushing state.
    pub async fn attach(self: &Arc<Self>, session: &Session) -> Result<ShutdownSignal> {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        session.handle(method::SHUTDOWN, move |_| {
            let tx = tx.clone();
            async move {
                info!("workspace is shutting down");
                if let Some(tx) = tx.lock().ok().and_then(|mut tx| tx.take()) {
                    let _ = tx.send(());
                }
                Ok(Value::Null)
            }
        });

        let this: Weak<Self> = Arc::downgrade(self);
        session.handle(method::STATE, move |params| {
            let this = this.clone();
            async move {
                let Some(this) = this.upgrade() else {
                    return Err("client gone".to_string());
                };
                let snapshot: Snapshot = serde_json::from_value(params).map_err(|e| {
                    warn!(error = %e, "undecodable state push");
                    e.to_string()
                })?;
                this.apply_snapshot(snapshot).map_err(|e| e.to_string())?;
                Ok(Value::Null)
            }
        });

        if let Ok(mut active) = self.session.lock() {
            *active = Some(session.clone());
        }

        let _: Value = session.call(method::SUBSCRIBE, &()).await?;
        debug!(session = %session.label(), "subscribed");
        Ok(ShutdownSignal(rx))
    }

    /// Stop routing client calls to `session` if it is the active one.
    pub fn detach(&self, session: &Session) {
        if let Ok(mut active) = self.session.lock() {
            if active.as_ref().is_some_and(|s| s.same_connection(session)) {
                *active = None;
            }
        }
    }

    /// Reconcile `snapshot` against the displayed tree and replace it. On
    /// error the displayed tree is left untouched.
    pub fn apply_snapshot(&self, snapshot: Snapshot) -> Result<(), ReconcileError> {
        let mut outcome = Ok(());
        self.tree.send_if_modified(|current| match reconcile(&snapshot, current) {
            Ok(next) => {
                *current = next;
                true
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        match outcome {
            Ok(()) => {
                if let Ok(mut last) = self.snapshot.write() {
                    *last = Some(Arc::new(snapshot));
                }
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "rejected malformed snapshot, keeping previous tree");
                Err(e)
            }
        }
    }

    /// Observe the displayed tree. The receiver only ever yields the newest
    /// tree.
    pub fn subscribe(&self) -> watch::Receiver<ObjectTree> {
        self.tree.subscribe()
    }

    /// A copy of the displayed tree.
    pub fn tree(&self) -> ObjectTree {
        self.tree.borrow().clone()
    }

    /// The last snapshot that reconciled successfully.
    pub fn latest_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.read().ok().and_then(|s| s.clone())
    }

    pub fn is_attached(&self) -> bool {
        self.active_session().is_some()
    }

    // --- Local view-model edits ---

    pub fn set_expanded(&self, id: &str, expanded: bool) -> bool {
        let mut found = false;
        self.tree.send_if_modified(|tree| {
            found = tree.set_expanded(id, expanded);
            found
        });
        found
    }

    /// Select `id` locally and tell the workspace.
    pub fn select(&self, id: &str) -> bool {
        let mut found = false;
        self.tree.send_if_modified(|tree| {
            found = tree.select(id);
            found
        });
        if found {
            self.select_node(id);
        }
        found
    }

    // --- Fire-and-forget workspace calls ---

    pub fn select_node(&self, id: &str) {
        self.send(method::SELECT_NODE, id);
    }

    pub fn rename_node(&self, id: &str, name: &str) {
        self.send(
            method::UPDATE_NODE,
            &NodeParams {
                id: id.to_string(),
                name: name.to_string(),
            },
        );
    }

    /// Create a child of `parent`, or a top-level node when `parent` is
    /// `None`.
    pub fn append_node(&self, parent: Option<&str>, name: Option<&str>) {
        self.send(
            method::APPEND_NODE,
            &NodeParams {
                id: parent.unwrap_or_default().to_string(),
                name: name.unwrap_or(DEFAULT_NODE_NAME).to_string(),
            },
        );
    }

    pub fn delete_node(&self, id: &str) {
        self.send(method::DELETE_NODE, id);
    }

    pub fn move_node(&self, id: &str, index: i64) {
        self.send(
            method::MOVE_NODE,
            &MoveNodeParams {
                id: id.to_string(),
                index,
            },
        );
    }

    pub fn append_component(&self, id: &str, component: &str) {
        self.send(
            method::APPEND_COMPONENT,
            &NodeParams {
                id: id.to_string(),
                name: component.to_string(),
            },
        );
    }

    pub fn remove_component(&self, id: &str, component: &str) {
        self.send(
            method::REMOVE_COMPONENT,
            &RemoveComponentParams {
                id: id.to_string(),
                component: component.to_string(),
            },
        );
    }

    /// Invoke a component method by its full path, e.g. `/Camera/Orbit/Reset`.
    pub fn call_method(&self, path: &str) {
        self.send(method::CALL_METHOD, path);
    }

    pub fn reload(&self) {
        self.send(method::RELOAD, &());
    }

    fn active_session(&self) -> Option<Session> {
        self.session
            .lock()
            .ok()
            .and_then(|s| s.clone())
            .filter(|s| !s.is_closed())
    }

    fn send<P: Serialize + ?Sized>(&self, method: &str, params: &P) {
        match self.active_session() {
            Some(session) => session.call_detached(method, params),
            None => warn!(method, "not connected, call dropped"),
        }
    }
}
