//! Length-prefixed JSON frames over a byte stream.
//!
//! Wire format: `[4-byte big-endian length][JSON payload]`
//!
//! Envelope: `{ "v": 1, "kind": "call"|"reply"|"error", "id": N, ... }`

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::error::{Result, SessionError};

/// Maximum frame size (16 MiB). Full-state pushes of large scenes are the
/// biggest frames on the wire.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const VERSION: u32 = 1;

/// One unit of the RPC exchange. Call ids are allocated per direction; a
/// reply or error echoes the id of the call it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Frame {
    Call {
        id: u64,
        method: String,
        #[serde(default)]
        params: Value,
    },
    Reply {
        id: u64,
        #[serde(default)]
        result: Value,
    },
    Error {
        id: u64,
        message: String,
    },
}

#[derive(Serialize)]
struct Envelope<'a> {
    v: u32,
    #[serde(flatten)]
    frame: &'a Frame,
}

/// Encode a frame into its length-prefixed wire bytes.
pub fn encode(frame: &Frame) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(&Envelope { v: VERSION, frame })?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(SessionError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    let mut bytes = Vec::with_capacity(4 + payload.len());
    bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

pub async fn write_frame<W>(stream: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode(frame)?;
    stream.write_all(&bytes).await?;
    stream.flush().await?;
    Ok(())
}

/// Read the next frame.
///
/// Returns `None` when the peer closes the stream between frames. Frames with
/// an unknown version, an unknown kind or a body that is not JSON are skipped.
pub async fn read_frame<R>(stream: &mut R) -> Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    loop {
        let mut len_buf = [0u8; 4];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(SessionError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }

        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await?;

        let mut envelope: Value = match serde_json::from_slice(&buf) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(len, error = %e, "frame body is not JSON, skipping");
                continue;
            }
        };
        let version = envelope.get("v").and_then(Value::as_u64);
        if version != Some(VERSION as u64) {
            warn!(version = ?version, "unknown frame version, skipping");
            continue;
        }
        if let Some(obj) = envelope.as_object_mut() {
            obj.remove("v");
        }

        match serde_json::from_value::<Frame>(envelope) {
            Ok(frame) => return Ok(Some(frame)),
            Err(e) => {
                warn!(error = %e, "malformed frame, skipping");
            }
        }
    }
}
