//! WebSocket → local socket byte relay.
//!
//! Each upgraded connection is paired with its own unix socket dial. The URL
//! path picks the socket (`/` means the agent). No framing, no protocol
//! awareness: bytes in one side, bytes out the other.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tokio::net::{TcpListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info};
use uuid::Uuid;

use crate::endpoint::Endpoint;
use crate::pump::pump;

#[derive(Clone)]
struct RelayState {
    agent_socket: Arc<PathBuf>,
}

/// Router that upgrades every request path to a relayed connection.
pub fn router(agent_socket: PathBuf) -> Router {
    Router::new().fallback(upgrade).with_state(RelayState {
        agent_socket: Arc::new(agent_socket),
    })
}

/// Dial the target socket first and only accept the upgrade once it answers.
/// A dial failure is refused with `502 Bad Gateway`, so the client sees a
/// failed handshake rather than a WebSocket that closes straight away.
async fn upgrade(State(state): State<RelayState>, uri: Uri, ws: WebSocketUpgrade) -> Response {
    let target = Endpoint::from_relay_path(uri.path(), &state.agent_socket);
    let span = tracing::debug_span!("relay", conn = %Uuid::new_v4(), target = %target);

    let stream = match UnixStream::connect(&target.path).instrument(span.clone()).await {
        Ok(stream) => stream,
        Err(e) => {
            span.in_scope(|| debug!(error = %e, "relay dial failed"));
            return (StatusCode::BAD_GATEWAY, format!("cannot reach {target}: {e}")).into_response();
        }
    };
    ws.on_upgrade(move |socket| relay_connection(socket, stream).instrument(span))
}

/// Pump bytes until either side closes; closing one side closes the other.
async fn relay_connection(socket: WebSocket, stream: UnixStream) {
    debug!("relay connected");
    let (ws_tx, ws_rx) = socket.split();
    let (unix_rx, unix_tx) = stream.into_split();
    pump(ws_tx, ws_rx, unix_rx, unix_tx).await;
    debug!("relay closed");
}

/// A bound relay listener.
pub struct RelayServer {
    listener: TcpListener,
    agent_socket: PathBuf,
}

impl RelayServer {
    pub async fn bind(addr: SocketAddr, agent_socket: PathBuf) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            agent_socket,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `cancel` fires.
    pub async fn serve(self, cancel: CancellationToken) -> std::io::Result<()> {
        let addr = self.listener.local_addr()?;
        info!(addr = %addr, agent = %self.agent_socket.display(), "relay listening");
        axum::serve(self.listener, router(self.agent_socket))
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixListener;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    /// Unix socket that echoes every byte back.
    fn spawn_echo(path: &std::path::Path) {
        let listener = UnixListener::bind(path).unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((conn, _)) = listener.accept().await else { break };
                tokio::spawn(async move {
                    let (mut rx, mut tx) = conn.into_split();
                    let _ = tokio::io::copy(&mut rx, &mut tx).await;
                });
            }
        });
    }

    async fn start_relay(agent_socket: PathBuf) -> (SocketAddr, CancellationToken) {
        let server = RelayServer::bind("127.0.0.1:0".parse().unwrap(), agent_socket)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let cancel = CancellationToken::new();
        tokio::spawn(server.serve(cancel.clone()));
        (addr, cancel)
    }

    async fn echo_once(url: &str, payload: &[u8]) -> Vec<u8> {
        let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        ws.send(WsMessage::Binary(payload.to_vec().into()))
            .await
            .unwrap();
        let mut got = Vec::new();
        while got.len() < payload.len() {
            match ws.next().await {
                Some(Ok(WsMessage::Binary(data))) => got.extend_from_slice(&data),
                Some(Ok(_)) => {}
                other => panic!("unexpected {other:?}"),
            }
        }
        got
    }

    #[tokio::test]
    async fn root_path_reaches_agent_socket() {
        let dir = tempfile::tempdir().unwrap();
        let agent = dir.path().join("agent.sock");
        spawn_echo(&agent);
        let (addr, cancel) = start_relay(agent).await;

        let got = echo_once(&format!("ws://{addr}/"), b"ping").await;
        assert_eq!(got, b"ping");
        cancel.cancel();
    }

    #[tokio::test]
    async fn path_selects_workspace_socket() {
        let dir = tempfile::tempdir().unwrap();
        let agent = dir.path().join("agent.sock");
        let ws_sock = dir.path().join("game.sock");
        spawn_echo(&ws_sock);
        let (addr, cancel) = start_relay(agent).await;

        let url = format!("ws://{addr}{}", ws_sock.display());
        let got = echo_once(&url, b"\x00\x00\x00\x02{}").await;
        assert_eq!(got, b"\x00\x00\x00\x02{}");
        cancel.cancel();
    }

    #[tokio::test]
    async fn failed_dial_only_ends_that_connection() {
        let dir = tempfile::tempdir().unwrap();
        let agent = dir.path().join("agent.sock");
        spawn_echo(&agent);
        let (addr, cancel) = start_relay(agent).await;

        let missing = dir.path().join("missing.sock");
        let err = tokio_tungstenite::connect_async(format!("ws://{addr}{}", missing.display()))
            .await
            .err()
            .unwrap();
        match err {
            tokio_tungstenite::tungstenite::Error::Http(response) => {
                assert_eq!(response.status().as_u16(), 502)
            }
            other => panic!("expected a refused upgrade, got {other:?}"),
        }

        // The listener keeps serving.
        let got = echo_once(&format!("ws://{addr}/"), b"still here").await;
        assert_eq!(got, b"still here");
        cancel.cancel();
    }

    #[tokio::test]
    async fn websocket_close_closes_local_socket() {
        let dir = tempfile::tempdir().unwrap();
        let agent = dir.path().join("agent.sock");
        let listener = UnixListener::bind(&agent).unwrap();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut got = Vec::new();
            conn.read_to_end(&mut got).await.unwrap();
            let _ = done_tx.send(got);
        });
        let (addr, cancel) = start_relay(agent).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/"))
            .await
            .unwrap();
        ws.send(WsMessage::Binary(b"bye".to_vec().into())).await.unwrap();
        ws.close(None).await.unwrap();

        let got = tokio::time::timeout(Duration::from_secs(5), done_rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, b"bye");
        cancel.cancel();
    }

    #[tokio::test]
    async fn stalled_pair_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let agent = dir.path().join("agent.sock");
        let stalled = dir.path().join("stalled.sock");
        spawn_echo(&agent);
        // Accepts and never reads.
        let listener = UnixListener::bind(&stalled).unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((conn, _)) = listener.accept().await {
                held.push(conn);
            }
        });
        let (addr, cancel) = start_relay(agent).await;

        let (mut stuck, _) = tokio_tungstenite::connect_async(format!("ws://{addr}{}", stalled.display()))
            .await
            .unwrap();
        tokio::spawn(async move {
            let chunk = vec![7u8; 64 * 1024];
            loop {
                if stuck.send(WsMessage::Binary(chunk.clone().into())).await.is_err() {
                    break;
                }
            }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let got = tokio::time::timeout(Duration::from_secs(5), echo_once(&format!("ws://{addr}/"), b"ping"))
            .await
            .unwrap();
        assert_eq!(got, b"ping");
        cancel.cancel();
    }

    #[tokio::test]
    async fn bulk_transfer_in_both_directions() {
        const TOTAL: usize = 8 * 1024 * 1024;
        let dir = tempfile::tempdir().unwrap();
        let agent = dir.path().join("agent.sock");
        let listener = UnixListener::bind(&agent).unwrap();
        // The local side writes everything before it reads anything.
        let local = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            conn.write_all(&vec![1u8; TOTAL]).await.unwrap();
            let mut got = vec![0u8; TOTAL];
            conn.read_exact(&mut got).await.unwrap();
            got.iter().all(|b| *b == 2)
        });
        let (addr, cancel) = start_relay(agent).await;

        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/"))
            .await
            .unwrap();
        let (mut tx, mut rx) = ws.split();
        let sender = tokio::spawn(async move {
            for _ in 0..TOTAL / (64 * 1024) {
                tx.send(WsMessage::Binary(vec![2u8; 64 * 1024].into()))
                    .await
                    .unwrap();
            }
            tx
        });

        let received = tokio::time::timeout(Duration::from_secs(30), async {
            let mut n = 0;
            while n < TOTAL {
                match rx.next().await {
                    Some(Ok(WsMessage::Binary(data))) => {
                        assert!(data.iter().all(|b| *b == 1));
                        n += data.len();
                    }
                    Some(Ok(_)) => {}
                    other => panic!("unexpected {other:?}"),
                }
            }
            n
        })
        .await
        .unwrap();
        assert_eq!(received, TOTAL);

        let _tx = tokio::time::timeout(Duration::from_secs(30), sender)
            .await
            .unwrap()
            .unwrap();
        let ok = tokio::time::timeout(Duration::from_secs(30), local)
            .await
            .unwrap()
            .unwrap();
        assert!(ok);
        cancel.cancel();
    }

    #[tokio::test]
    async fn local_close_closes_websocket() {
        let dir = tempfile::tempdir().unwrap();
        let agent = dir.path().join("agent.sock");
        let listener = UnixListener::bind(&agent).unwrap();
        tokio::spawn(async move {
            let (conn, _) = listener.accept().await.unwrap();
            drop(conn);
        });
        let (addr, cancel) = start_relay(agent).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/"))
            .await
            .unwrap();
        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match ws.next().await {
                    Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await;
        assert!(closed.is_ok());
        cancel.cancel();
    }
}
