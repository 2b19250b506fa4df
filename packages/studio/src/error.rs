use std::path::PathBuf;

/// Errors surfaced by a [`Session`](crate::rpc::Session) or a dialer.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session closed")]
    Closed,

    #[error("failed to dial {endpoint}: {source}")]
    Dial {
        endpoint: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("relay handshake failed: {0}")]
    Relay(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("{method} failed: {message}")]
    Remote { method: String, message: String },
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
