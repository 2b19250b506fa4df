//! Ways to open a byte stream to an [`Endpoint`].

use std::future::Future;
use std::path::PathBuf;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::net::UnixStream;
use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::{Result, SessionError};
use crate::pump::pump;

const PIPE_CAPACITY: usize = 64 * 1024;

pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

pub type BoxedStream = Box<dyn AsyncStream>;

/// Opens a fresh connection to an endpoint. Each call is one dial attempt;
/// retry policy belongs to the caller.
pub trait Dialer: Send + Sync + 'static {
    fn dial(&self, endpoint: &Endpoint) -> impl Future<Output = Result<BoxedStream>> + Send;
}

/// Dials the local socket directly.
#[derive(Debug, Clone, Default)]
pub struct UnixDialer;

impl Dialer for UnixDialer {
    async fn dial(&self, endpoint: &Endpoint) -> Result<BoxedStream> {
        let stream = UnixStream::connect(&endpoint.path)
            .await
            .map_err(|source| SessionError::Dial {
                endpoint: endpoint.path.clone(),
                source,
            })?;
        Ok(Box::new(stream))
    }
}

/// Dials through the relay: one WebSocket per endpoint, whose binary
/// messages carry the socket's raw bytes.
#[derive(Debug, Clone)]
pub struct RelayDialer {
    base_url: String,
    agent_socket: PathBuf,
}

impl RelayDialer {
    /// `base_url` is the relay origin, e.g. `ws://127.0.0.1:3001`.
    pub fn new(base_url: impl Into<String>, agent_socket: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent_socket: agent_socket.into(),
        }
    }

    pub fn url_for(&self, endpoint: &Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.relay_path(&self.agent_socket))
    }
}

impl Dialer for RelayDialer {
    async fn dial(&self, endpoint: &Endpoint) -> Result<BoxedStream> {
        let url = self.url_for(endpoint);
        let (ws, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| SessionError::Relay(format!("{url}: {e}")))?;

        let (local, remote) = tokio::io::duplex(PIPE_CAPACITY);
        tokio::spawn(pump_websocket(ws, remote, url));
        Ok(Box::new(local))
    }
}

/// Copy bytes between a client WebSocket and the in-process end of a pipe
/// until either side closes.
async fn pump_websocket<S>(ws: tokio_tungstenite::WebSocketStream<S>, pipe: DuplexStream, url: String)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (ws_tx, ws_rx) = ws.split();
    let (pipe_rx, pipe_tx) = tokio::io::split(pipe);
    pump(ws_tx, ws_rx, pipe_rx, pipe_tx).await;
    debug!(url = %url, "relay stream closed");
}
