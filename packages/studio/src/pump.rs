//! Byte pump between a WebSocket and a plain byte stream.
//!
//! Shared by the relay (server side, axum messages) and the relay dialer
//! (client side, tungstenite messages). Each direction is its own future, so a
//! write stalled on one side never stops the other side from being drained.
//! When either direction ends the other is dropped, which closes both ends.

use std::fmt::Display;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

const READ_BUF: usize = 64 * 1024;

/// What an inbound WebSocket message means for the byte stream.
pub(crate) enum Inbound<'a> {
    Data(&'a [u8]),
    Close,
    Ignore,
}

/// The two WebSocket message types the pump carries.
pub(crate) trait WsMessage: Sized {
    fn binary(data: Vec<u8>) -> Self;
    fn close() -> Self;
    fn inbound(&self) -> Inbound<'_>;
}

impl WsMessage for axum::extract::ws::Message {
    fn binary(data: Vec<u8>) -> Self {
        Self::Binary(data.into())
    }

    fn close() -> Self {
        Self::Close(None)
    }

    fn inbound(&self) -> Inbound<'_> {
        match self {
            Self::Binary(data) => Inbound::Data(&data[..]),
            Self::Text(text) => Inbound::Data(text.as_str().as_bytes()),
            Self::Close(_) => Inbound::Close,
            _ => Inbound::Ignore,
        }
    }
}

impl WsMessage for tokio_tungstenite::tungstenite::Message {
    fn binary(data: Vec<u8>) -> Self {
        Self::Binary(data.into())
    }

    fn close() -> Self {
        Self::Close(None)
    }

    fn inbound(&self) -> Inbound<'_> {
        match self {
            Self::Binary(data) => Inbound::Data(&data[..]),
            Self::Text(text) => Inbound::Data(text.as_str().as_bytes()),
            Self::Close(_) => Inbound::Close,
            _ => Inbound::Ignore,
        }
    }
}

/// Pump until either side closes or fails.
pub(crate) async fn pump<M, E, Tx, Rx, R, W>(ws_tx: Tx, ws_rx: Rx, reader: R, writer: W)
where
    M: WsMessage,
    E: Display,
    Tx: Sink<M> + Unpin,
    Rx: Stream<Item = Result<M, E>> + Unpin,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    tokio::select! {
        _ = stream_to_ws(reader, ws_tx) => debug!("local side closed"),
        _ = ws_to_stream(ws_rx, writer) => debug!("websocket side closed"),
    }
}

async fn stream_to_ws<M, Tx, R>(mut reader: R, mut ws_tx: Tx)
where
    M: WsMessage,
    Tx: Sink<M> + Unpin,
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUF];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if ws_tx.send(M::binary(buf[..n].to_vec())).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!(error = %e, "local read failed");
                break;
            }
        }
    }
    let _ = ws_tx.send(M::close()).await;
}

async fn ws_to_stream<M, E, Rx, W>(mut ws_rx: Rx, mut writer: W)
where
    M: WsMessage,
    E: Display,
    Rx: Stream<Item = Result<M, E>> + Unpin,
    W: AsyncWrite + Unpin,
{
    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                debug!(error = %e, "websocket read failed");
                break;
            }
        };
        match msg.inbound() {
            Inbound::Data(data) => {
                if writer.write_all(data).await.is_err() {
                    break;
                }
            }
            Inbound::Close => break,
            Inbound::Ignore => {}
        }
    }
    let _ = writer.shutdown().await;
}
