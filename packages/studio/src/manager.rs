//! ConnectionManager: the agent → workspace handshake and its reconnect loop.
//!
//! One supervisor task per open workspace. It asks the agent for the
//! workspace socket, connects to it, attaches the [`StateDispatcher`], and
//! re-establishes everything after a dropped connection or a server-directed
//! restart. Only one workspace session is alive at a time.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ReconnectPolicy;
use crate::dispatcher::StateDispatcher;
use crate::endpoint::Endpoint;
use crate::error::{Result, SessionError};
use crate::rpc::params::ConnectReply;
use crate::rpc::{Session, method};
use crate::transport::Dialer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    DialingAgent { attempt: u32 },
    AgentConnected { workspace: Endpoint },
    DialingWorkspace { workspace: Endpoint, attempt: u32 },
    WorkspaceConnected { workspace: Endpoint },
    /// The workspace announced a restart; waiting out the grace period.
    Restarting { workspace: Endpoint },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::WorkspaceConnected { .. })
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::DialingAgent { attempt } => write!(f, "connecting to agent (attempt {attempt})"),
            Self::AgentConnected { workspace } => write!(f, "agent assigned {workspace}"),
            Self::DialingWorkspace { workspace, attempt } => {
                write!(f, "connecting to {workspace} (attempt {attempt})")
            }
            Self::WorkspaceConnected { workspace } => write!(f, "connected to {workspace}"),
            Self::Restarting { workspace } => write!(f, "waiting for {workspace} to restart"),
        }
    }
}

/// Why a connected workspace session ended.
enum Ended {
    Shutdown,
    Lost,
    Cancelled,
}

/// Builds the supervisor for one workspace. Call [`ConnectionManager::open`]
/// to start it.
pub struct ConnectionManager<D: Dialer> {
    dialer: Arc<D>,
    agent: Endpoint,
    workspace_path: String,
    policy: ReconnectPolicy,
    dispatcher: Arc<StateDispatcher>,
    state: watch::Sender<ConnectionState>,
    notices: broadcast::Sender<String>,
    cancel: CancellationToken,
}

impl<D: Dialer> ConnectionManager<D> {
    pub fn new(dialer: D, agent: Endpoint, workspace_path: impl Into<String>, policy: ReconnectPolicy) -> Self {
        let (notices, _) = broadcast::channel(16);
        Self {
            dialer: Arc::new(dialer),
            agent,
            workspace_path: workspace_path.into(),
            policy,
            dispatcher: StateDispatcher::new(),
            state: watch::Sender::new(ConnectionState::Idle),
            notices,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an existing dispatcher instead of a fresh one.
    pub fn with_dispatcher(mut self, dispatcher: Arc<StateDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Spawn the supervisor and return the handle that owns it.
    pub fn open(self) -> WorkspaceConnection {
        let state = self.state.subscribe();
        let notices = self.notices.clone();
        let dispatcher = self.dispatcher.clone();
        let cancel = self.cancel.clone();
        let task = tokio::spawn(self.run());
        WorkspaceConnection {
            state,
            notices,
            dispatcher,
            cancel,
            task: Some(task),
        }
    }

    async fn run(self) {
        info!(workspace = %self.workspace_path, agent = %self.agent, "opening workspace");
        let mut workspace: Option<Endpoint> = None;
        let mut agent_attempt = 0u32;
        let mut workspace_attempt = 0u32;

        loop {
            let endpoint = match workspace.clone() {
                Some(endpoint) => endpoint,
                None => {
                    agent_attempt += 1;
                    self.set_state(ConnectionState::DialingAgent {
                        attempt: agent_attempt,
                    });
                    match self.cancellable(self.agent_handshake()).await {
                        None => break,
                        Some(Ok(endpoint)) => {
                            agent_attempt = 0;
                            self.set_state(ConnectionState::AgentConnected {
                                workspace: endpoint.clone(),
                            });
                            workspace = Some(endpoint.clone());
                            endpoint
                        }
                        Some(Err(e)) => {
                            self.handshake_failed("agent", &e);
                            if !self.pause(self.policy.retry_interval).await {
                                break;
                            }
                            continue;
                        }
                    }
                }
            };

            workspace_attempt += 1;
            self.set_state(ConnectionState::DialingWorkspace {
                workspace: endpoint.clone(),
                attempt: workspace_attempt,
            });
            let session = match self.cancellable(self.dialer.dial(&endpoint)).await {
                None => break,
                Some(Ok(stream)) => Session::new(stream, format!("workspace {endpoint}")),
                Some(Err(e)) => {
                    self.handshake_failed("workspace", &e);
                    if self
                        .policy
                        .max_workspace_attempts
                        .is_some_and(|max| workspace_attempt >= max)
                    {
                        debug!(workspace = %endpoint, "giving up on workspace endpoint, asking agent again");
                        workspace = None;
                        workspace_attempt = 0;
                    }
                    if !self.pause(self.policy.retry_interval).await {
                        break;
                    }
                    continue;
                }
            };

            let shutdown = match self.cancellable(self.dispatcher.attach(&session)).await {
                None => {
                    self.teardown(&session);
                    break;
                }
                Some(Ok(shutdown)) => shutdown,
                Some(Err(e)) => {
                    self.handshake_failed("subscribe", &e);
                    self.teardown(&session);
                    if !self.pause(self.policy.retry_interval).await {
                        break;
                    }
                    continue;
                }
            };
            workspace_attempt = 0;
            self.set_state(ConnectionState::WorkspaceConnected {
                workspace: endpoint.clone(),
            });

            // A restart notice wins over the close that usually follows it.
            let ended = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Ended::Cancelled,
                _ = shutdown.recv() => Ended::Shutdown,
                _ = session.closed() => Ended::Lost,
            };
            let delay = match ended {
                Ended::Cancelled => {
                    self.teardown(&session);
                    break;
                }
                Ended::Shutdown => {
                    info!(workspace = %endpoint, grace = ?self.policy.shutdown_grace, "workspace restarting, reconnecting after grace period");
                    self.set_state(ConnectionState::Restarting {
                        workspace: endpoint.clone(),
                    });
                    self.policy.shutdown_grace
                }
                Ended::Lost => {
                    debug!(workspace = %endpoint, "workspace connection lost");
                    self.policy.retry_interval
                }
            };

            // The session stays open through the delay so the shutdown
            // acknowledgement reaches the server.
            let resume = self.pause(delay).await;
            self.teardown(&session);
            if !resume {
                break;
            }
        }

        self.set_state(ConnectionState::Idle);
        debug!(workspace = %self.workspace_path, "workspace supervisor stopped");
    }

    /// Ask the agent which socket serves this workspace. The agent session
    /// only lives for the one call.
    async fn agent_handshake(&self) -> Result<Endpoint> {
        let stream = self.dialer.dial(&self.agent).await?;
        let session = Session::new(stream, "agent");
        let reply: Result<ConnectReply> = session.call(method::CONNECT, &self.workspace_path).await;
        session.close();
        Ok(Endpoint::new(reply?.reply))
    }

    /// Refused dials and dropped connections are routine while the agent
    /// restarts. Anything else is worth telling the user about.
    fn handshake_failed(&self, stage: &str, error: &SessionError) {
        match error {
            SessionError::Dial { .. }
            | SessionError::Relay(_)
            | SessionError::Closed
            | SessionError::Io(_) => {
                debug!(stage, error = %error, "connection failed, will retry");
            }
            _ => {
                warn!(stage, error = %error, "handshake failed, will retry");
                let _ = self.notices.send(format!("{stage} handshake failed: {error}"));
            }
        }
    }

    fn teardown(&self, session: &Session) {
        self.dispatcher.detach(session);
        session.close();
    }

    fn set_state(&self, state: ConnectionState) {
        debug!(state = %state, "connection state");
        self.state.send_replace(state);
    }

    /// Sleep unless cancelled first. Returns `false` on cancellation.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn cancellable<T>(&self, fut: impl std::future::Future<Output = T>) -> Option<T> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            out = fut => Some(out),
        }
    }
}

/// Owner of one open workspace. Dropping it stops the supervisor; `close`
/// also waits for it to finish.
pub struct WorkspaceConnection {
    state: watch::Receiver<ConnectionState>,
    notices: broadcast::Sender<String>,
    dispatcher: Arc<StateDispatcher>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl WorkspaceConnection {
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// One-line notices about unexpected handshake failures.
    pub fn notices(&self) -> broadcast::Receiver<String> {
        self.notices.subscribe()
    }

    pub fn dispatcher(&self) -> &Arc<StateDispatcher> {
        &self.dispatcher
    }

    /// Stop reconnecting, close the session and wait for the supervisor.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for WorkspaceConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
