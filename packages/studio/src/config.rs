use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// =============================================================================
// Unified config (figment-deserialized from defaults / studio.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   studio.toml:     [relay]
//                    port = 3001
//
//   env var:         TRACTOR_RELAY__PORT=3001   (double underscore = nesting)
//
//   (single underscore stays within field names: TRACTOR_RECONNECT__RETRY_INTERVAL_MS)

pub const CONFIG_FILE: &str = "studio.toml";

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub relay: RelayFileConfig,
    #[serde(default)]
    pub agent: AgentFileConfig,
    #[serde(default)]
    pub reconnect: ReconnectFileConfig,
}

/// Relay listener (lives under `[relay]` in studio.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayFileConfig {
    #[serde(default = "default_relay_host")]
    pub host: String,
    #[serde(default = "default_relay_port")]
    pub port: u16,
}

impl Default for RelayFileConfig {
    fn default() -> Self {
        Self {
            host: default_relay_host(),
            port: default_relay_port(),
        }
    }
}

/// Agent location (lives under `[agent]` in studio.toml).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AgentFileConfig {
    /// Agent socket. Defaults to `<data_dir>/agent.sock`.
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
}

/// Reconnect timing (lives under `[reconnect]` in studio.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconnectFileConfig {
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Consecutive workspace dial failures before redoing the agent
    /// handshake. 0 keeps retrying the same workspace endpoint forever.
    #[serde(default)]
    pub max_workspace_attempts: u32,
}

impl Default for ReconnectFileConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: default_retry_interval_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            max_workspace_attempts: 0,
        }
    }
}

fn default_relay_host() -> String {
    "127.0.0.1".to_string()
}
fn default_relay_port() -> u16 {
    3001
}
fn default_retry_interval_ms() -> u64 {
    500
}
fn default_shutdown_grace_ms() -> u64 {
    4000
}

/// Build a figment that layers: defaults → studio.toml → TRACTOR_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `TRACTOR_RELAY__PORT=4000`  →  `relay.port = 4000`
///   `TRACTOR_RECONNECT__SHUTDOWN_GRACE_MS=1000`  →  `reconnect.shutdown_grace_ms = 1000`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join(CONFIG_FILE)))
        .merge(Env::prefixed("TRACTOR_").split("__"))
}

// =============================================================================
// Runtime config structs (derived from FileConfig)
// =============================================================================

/// Relay listener configuration (runtime view).
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
}

impl RelayConfig {
    pub fn from_file(fc: &RelayFileConfig) -> Result<Self> {
        let ip: IpAddr = fc
            .host
            .parse()
            .with_context(|| format!("Invalid relay host: {:?}", fc.host))?;
        Ok(Self {
            bind_addr: SocketAddr::new(ip, fc.port),
        })
    }
}

/// Retry and grace timing for the connection manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before retrying a failed agent or workspace dial.
    pub retry_interval: Duration,
    /// Delay before reconnecting after a server `shutdown` push.
    pub shutdown_grace: Duration,
    /// Workspace dial failures tolerated before falling back to the agent
    /// handshake (None = unlimited)
    pub max_workspace_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_file(&ReconnectFileConfig::default())
    }
}

impl ReconnectPolicy {
    pub fn from_file(fc: &ReconnectFileConfig) -> Self {
        Self {
            retry_interval: Duration::from_millis(fc.retry_interval_ms),
            shutdown_grace: Duration::from_millis(fc.shutdown_grace_ms),
            max_workspace_attempts: (fc.max_workspace_attempts > 0)
                .then_some(fc.max_workspace_attempts),
        }
    }
}

// =============================================================================
// Directory layout (not tunable via figment; derived from --data-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct StudioConfig {
    pub data_dir: PathBuf,
    pub agent_socket: PathBuf,
    pub relay: RelayConfig,
    pub reconnect: ReconnectPolicy,
}

impl StudioConfig {
    /// Resolve the data directory (default `~/.tractor`) and load the layered
    /// configuration found there.
    pub fn load(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => default_data_dir()?,
        };
        let fc: FileConfig = load_config(&data_dir)
            .extract()
            .with_context(|| format!("Failed to load {}", data_dir.join(CONFIG_FILE).display()))?;
        let config = Self::from_file(data_dir, &fc)?;
        info!("Data directory: {}", config.data_dir.display());
        Ok(config)
    }

    pub fn from_file(data_dir: PathBuf, fc: &FileConfig) -> Result<Self> {
        let agent_socket = fc
            .agent
            .socket_path
            .clone()
            .unwrap_or_else(|| data_dir.join("agent.sock"));
        Ok(Self {
            agent_socket,
            relay: RelayConfig::from_file(&fc.relay)?,
            reconnect: ReconnectPolicy::from_file(&fc.reconnect),
            data_dir,
        })
    }

    /// Where the agent places per-workspace sockets.
    pub fn sockets_dir(&self) -> PathBuf {
        self.data_dir.join("sockets")
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE)
    }
}

pub fn default_data_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".tractor"))
        .context("Could not find home directory")
}
