//! Scripted agent and workspace servers speaking the frame protocol over
//! in-process pipes.

use std::io;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use object_tree::Snapshot;
use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;

use crate::endpoint::Endpoint;
use crate::error::{Result, SessionError};
use crate::rpc::{Session, method};
use crate::transport::{BoxedStream, Dialer};

const PIPE: usize = 64 * 1024;

/// Small scene: `/Camera`, `/World`, `/World/Lamp`.
pub fn scene() -> Snapshot {
    serde_json::from_value(json!({
        "hierarchy": ["/Camera", "/World", "/World/Lamp"],
        "nodePaths": {"/Camera": "cam", "/World": "world", "/World/Lamp": "lamp"},
        "nodes": {
            "cam": {"name": "Camera", "path": "/Camera", "components": [{"name": "Orbit", "related": ["world"]}]},
            "world": {"name": "World", "path": "/World", "components": []},
            "lamp": {"name": "Lamp", "path": "/World/Lamp", "index": 0, "components": null}
        },
        "selectedNode": ""
    }))
    .expect("scene fixture")
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub params: Value,
}

const WORKSPACE_METHODS: &[&str] = &[
    method::SUBSCRIBE,
    method::SELECT_NODE,
    method::UPDATE_NODE,
    method::APPEND_NODE,
    method::DELETE_NODE,
    method::MOVE_NODE,
    method::APPEND_COMPONENT,
    method::REMOVE_COMPONENT,
    method::CALL_METHOD,
    method::RELOAD,
];

/// Server side of a workspace connection. Records every client call and
/// acknowledges it with `null`.
pub struct FakeWorkspace {
    pub server: Session,
    calls: Mutex<mpsc::UnboundedReceiver<RecordedCall>>,
}

impl FakeWorkspace {
    /// A connected `(client, workspace)` pair.
    pub fn pair() -> (Session, FakeWorkspace) {
        let (client, server) = tokio::io::duplex(PIPE);
        (Session::new(client, "client"), Self::serve(server))
    }

    pub fn serve<S>(stream: S) -> Self
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + 'static,
    {
        let server = Session::new(stream, "fake-workspace");
        let (tx, rx) = mpsc::unbounded_channel();
        for name in WORKSPACE_METHODS {
            let tx = tx.clone();
            let method = name.to_string();
            server.handle(name, move |params| {
                let _ = tx.send(RecordedCall {
                    method: method.clone(),
                    params,
                });
                async { Ok(Value::Null) }
            });
        }
        Self {
            server,
            calls: Mutex::new(rx),
        }
    }

    /// The next call the client made.
    pub async fn next_call(&self) -> RecordedCall {
        let mut calls = self.calls.lock().await;
        tokio::time::timeout(Duration::from_secs(30), calls.recv())
            .await
            .expect("timed out waiting for a client call")
            .expect("workspace closed")
    }

    /// Push a full state and wait for the client's acknowledgement.
    pub async fn push_state(&self, snapshot: &Snapshot) -> Result<()> {
        let _: Value = self.server.call(method::STATE, snapshot).await?;
        Ok(())
    }

    /// Announce a restart and wait for the acknowledgement.
    pub async fn shutdown(&self) -> Result<()> {
        let _: Value = self.server.call(method::SHUTDOWN, &()).await?;
        Ok(())
    }
}

/// Serve a fake agent on `stream`. `connect` is answered with the
/// workspace socket, or with the given error message.
pub fn serve_agent<S>(stream: S, answer: std::result::Result<Endpoint, String>) -> Session
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + 'static,
{
    let agent = Session::new(stream, "fake-agent");
    let answer = answer.map(|endpoint| endpoint.path.to_string_lossy().into_owned());
    agent.handle(method::CONNECT, move |params| {
        let answer = answer.clone();
        async move {
            if !params.is_string() {
                return Err("connect expects a workspace path".to_string());
            }
            answer.map(|reply| json!({ "reply": reply }))
        }
    });
    agent
}

#[derive(Default)]
struct Script {
    agent_failures: usize,
    workspace_failures: usize,
    connect_error: Option<String>,
    dials: Vec<(Endpoint, Instant)>,
    servers: Vec<Session>,
}

/// A [`Dialer`] backed by in-process fakes. Refuses a scripted number of
/// agent and workspace dials before connecting, and records every attempt.
#[derive(Clone)]
pub struct ScriptedDialer {
    agent: Endpoint,
    workspace: Endpoint,
    script: Arc<StdMutex<Script>>,
    opened: mpsc::UnboundedSender<Arc<FakeWorkspace>>,
}

impl ScriptedDialer {
    /// Returns the dialer and a stream of workspaces it opens.
    pub fn new(
        agent: Endpoint,
        workspace: Endpoint,
    ) -> (Self, mpsc::UnboundedReceiver<Arc<FakeWorkspace>>) {
        let (opened, rx) = mpsc::unbounded_channel();
        let dialer = Self {
            agent,
            workspace,
            script: Arc::new(StdMutex::new(Script::default())),
            opened,
        };
        (dialer, rx)
    }

    pub fn fail_agent(&self, times: usize) {
        self.script.lock().unwrap().agent_failures = times;
    }

    pub fn fail_workspace(&self, times: usize) {
        self.script.lock().unwrap().workspace_failures = times;
    }

    /// Make the agent answer `connect` with an error.
    pub fn reject_connect(&self, message: &str) {
        self.script.lock().unwrap().connect_error = Some(message.to_string());
    }

    /// When each dial to `endpoint` was attempted.
    pub fn dials_to(&self, endpoint: &Endpoint) -> Vec<Instant> {
        self.script
            .lock()
            .unwrap()
            .dials
            .iter()
            .filter(|(e, _)| e == endpoint)
            .map(|(_, at)| *at)
            .collect()
    }

    fn refused(endpoint: &Endpoint) -> SessionError {
        SessionError::Dial {
            endpoint: endpoint.path.clone(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        }
    }
}

impl Dialer for ScriptedDialer {
    async fn dial(&self, endpoint: &Endpoint) -> Result<BoxedStream> {
        let mut script = self.script.lock().unwrap();
        script.dials.push((endpoint.clone(), Instant::now()));

        let (client, server) = tokio::io::duplex(PIPE);
        if *endpoint == self.agent {
            if script.agent_failures > 0 {
                script.agent_failures -= 1;
                return Err(Self::refused(endpoint));
            }
            let answer = match &script.connect_error {
                Some(message) => Err(message.clone()),
                None => Ok(self.workspace.clone()),
            };
            script.servers.push(serve_agent(server, answer));
        } else if *endpoint == self.workspace {
            if script.workspace_failures > 0 {
                script.workspace_failures -= 1;
                return Err(Self::refused(endpoint));
            }
            let _ = self.opened.send(Arc::new(FakeWorkspace::serve(server)));
        } else {
            return Err(Self::refused(endpoint));
        }
        Ok(Box::new(client))
    }
}
