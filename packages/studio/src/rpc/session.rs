//! One live RPC connection: outbound calls, inbound handlers, and teardown.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::framing::{Frame, read_frame, write_frame};
use crate::error::{Result, SessionError};

/// Server-push handler. Returns the reply payload, or an error message sent
/// back to the caller.
pub type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

struct PendingCall {
    method: String,
    tx: oneshot::Sender<Result<Value>>,
}

struct Inner {
    label: String,
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingCall>>,
    handlers: RwLock<HashMap<String, Handler>>,
    outbound: mpsc::UnboundedSender<Frame>,
    cancel: CancellationToken,
}

/// A multiplexed request/response connection.
///
/// Cloning is cheap; all clones share the same connection. Inbound calls are
/// handled one at a time in arrival order, so a handler must not wait on a
/// reply from the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Take ownership of a connected stream and start its reader and writer
    /// tasks. `label` identifies the connection in logs.
    pub fn new<S>(stream: S, label: impl Into<String>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (outbound, rx) = mpsc::unbounded_channel::<Frame>();
        let inner = Arc::new(Inner {
            label: label.into(),
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
            outbound,
            cancel: CancellationToken::new(),
        });

        tokio::spawn(write_loop(writer, rx, inner.cancel.clone()));
        tokio::spawn(read_loop(reader, inner.clone()));

        Self { inner }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Register the handler invoked when the peer calls `method`. Replaces
    /// any previous handler for the same name.
    pub fn handle<F, Fut>(&self, method: &str, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        let handler: Handler = Arc::new(
            move |params| -> BoxFuture<'static, Result<Value, String>> { Box::pin(handler(params)) },
        );
        if let Ok(mut handlers) = self.inner.handlers.write() {
            handlers.insert(method.to_string(), handler);
        }
    }

    /// Names of the registered push handlers.
    pub fn handled_methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .handlers
            .read()
            .map(|h| h.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Call `method` and wait for its reply.
    pub async fn call<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params)?;
        let value = self.call_value(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn call_value(&self, method: &str, params: Value) -> Result<Value> {
        let rx = self.start_call(method, params)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Register a pending call and queue its frame. Frames leave in the
    /// order their calls were started.
    fn start_call(&self, method: &str, params: Value) -> Result<oneshot::Receiver<Result<Value>>> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        self.pending()?.insert(
            id,
            PendingCall {
                method: method.to_string(),
                tx,
            },
        );
        // The reader fails everything pending after it cancels; a call
        // registered after that point would never be answered.
        if self.inner.cancel.is_cancelled() {
            self.pending()?.remove(&id);
            return Err(SessionError::Closed);
        }

        let frame = Frame::Call {
            id,
            method: method.to_string(),
            params,
        };
        if self.inner.outbound.send(frame).is_err() {
            self.pending()?.remove(&id);
            return Err(SessionError::Closed);
        }
        Ok(rx)
    }

    /// Issue a call without waiting for it. The frame is queued before this
    /// returns; a failure is logged and dropped, and the outcome shows up in
    /// whatever the peer pushes next.
    pub fn call_detached<P>(&self, method: &str, params: &P)
    where
        P: Serialize + ?Sized,
    {
        let params = match serde_json::to_value(params) {
            Ok(params) => params,
            Err(e) => {
                warn!(method, error = %e, "failed to encode call");
                return;
            }
        };
        let rx = match self.start_call(method, params) {
            Ok(rx) => rx,
            Err(e) => {
                warn!(session = %self.label(), method, error = %e, "call failed");
                return;
            }
        };
        let label = self.inner.label.clone();
        let method = method.to_string();
        tokio::spawn(async move {
            let result = rx.await.unwrap_or(Err(SessionError::Closed));
            if let Err(e) = result {
                warn!(session = %label, method = %method, error = %e, "call failed");
            }
        });
    }

    /// Whether both handles refer to the same connection.
    pub fn same_connection(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Resolves once the connection has ended for any reason.
    pub async fn closed(&self) {
        self.inner.cancel.cancelled().await
    }

    /// Tear the connection down. Pending calls fail with
    /// [`SessionError::Closed`].
    pub fn close(&self) {
        self.inner.cancel.cancel();
    }

    fn pending(&self) -> Result<std::sync::MutexGuard<'_, HashMap<u64, PendingCall>>> {
        self.inner.pending.lock().map_err(|_| SessionError::Closed)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("label", &self.inner.label)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn write_loop<S>(
    mut writer: WriteHalf<S>,
    mut rx: mpsc::UnboundedReceiver<Frame>,
    cancel: CancellationToken,
)
where
    S: AsyncWrite,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = write_frame(&mut writer, &frame).await {
                    debug!(error = %e, "session write error");
                    break;
                }
            }
        }
    }
    cancel.cancel();
}

async fn read_loop<S>(mut reader: ReadHalf<S>, inner: Arc<Inner>)
where
    S: AsyncRead,
{
    loop {
        let frame = tokio::select! {
            _ = inner.cancel.cancelled() => break,
            frame = read_frame(&mut reader) => frame,
        };
        match frame {
            Ok(Some(Frame::Call { id, method, params })) => {
                let reply = tokio::select! {
                    _ = inner.cancel.cancelled() => break,
                    reply = dispatch_call(&inner, id, &method, params) => reply,
                };
                if inner.outbound.send(reply).is_err() {
                    break;
                }
            }
            Ok(Some(Frame::Reply { id, result })) => resolve(&inner, id, Ok(result)),
            Ok(Some(Frame::Error { id, message })) => {
                let method = inner
                    .pending
                    .lock()
                    .ok()
                    .and_then(|p| p.get(&id).map(|c| c.method.clone()))
                    .unwrap_or_default();
                resolve(&inner, id, Err(SessionError::Remote { method, message }));
            }
            Ok(None) => {
                debug!(session = %inner.label, "peer closed connection");
                break;
            }
            Err(e) => {
                debug!(session = %inner.label, error = %e, "session read error");
                break;
            }
        }
    }

    inner.cancel.cancel();
    let drained: Vec<PendingCall> = match inner.pending.lock() {
        Ok(mut pending) => pending.drain().map(|(_, call)| call).collect(),
        Err(_) => Vec::new(),
    };
    for call in drained {
        let _ = call.tx.send(Err(SessionError::Closed));
    }
}

async fn dispatch_call(inner: &Inner, id: u64, method: &str, params: Value) -> Frame {
    let handler = inner
        .handlers
        .read()
        .ok()
        .and_then(|h| h.get(method).cloned());
    let Some(handler) = handler else {
        debug!(session = %inner.label, method, "no handler registered");
        return Frame::Error {
            id,
            message: format!("unknown method {method:?}"),
        };
    };
    match handler(params).await {
        Ok(result) => Frame::Reply { id, result },
        Err(message) => Frame::Error { id, message },
    }
}

fn resolve(inner: &Inner, id: u64, result: Result<Value>) {
    let call = inner.pending.lock().ok().and_then(|mut p| p.remove(&id));
    match call {
        Some(call) => {
            let _ = call.tx.send(result);
        }
        None => debug!(session = %inner.label, id, "reply for unknown call"),
    }
}
