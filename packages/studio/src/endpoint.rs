use std::fmt;
use std::path::{Path, PathBuf};

/// A local socket the agent exposes: the well-known agent socket, or a
/// workspace socket handed out by the agent's `connect` reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub path: PathBuf,
}

impl Endpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Map the URL path of a relay request to the socket it targets. An
    /// empty or root path means the agent; anything else is taken verbatim.
    pub fn from_relay_path(url_path: &str, agent_socket: &Path) -> Self {
        if url_path.is_empty() || url_path == "/" {
            Self::new(agent_socket)
        } else {
            Self::new(url_path)
        }
    }

    /// Inverse of [`Endpoint::from_relay_path`].
    pub fn relay_path(&self, agent_socket: &Path) -> String {
        if self.path == agent_socket {
            "/".to_string()
        } else {
            let path = self.path.to_string_lossy();
            if path.starts_with('/') {
                path.into_owned()
            } else {
                format!("/{path}")
            }
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
