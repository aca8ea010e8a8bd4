use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_core::{
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_IDLE_TTL, DEFAULT_REKEY_GRACE, DEFAULT_SWEEP_INTERVAL,
    ReaperPolicy, RegistryConfig, ResumePolicy,
};

/// Default host for the tether server
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default port for the tether server
pub const DEFAULT_PORT: u16 = 7480;
/// Default interval between SSE keep-alive comments
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 15;
/// Default per-stream event buffer
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawTetherConfig {
    #[serde(default)]
    pub server: RawServerConfig,

    #[serde(default)]
    pub session: RawSessionConfig,

    #[serde(default)]
    pub reaper: RawReaperConfig,
}

/// Server config as stored in TOML (optional fields for proper merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub public_url: Option<String>,
    pub keep_alive_secs: Option<u64>,
    pub stream_buffer: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawSessionConfig {
    pub rekey_grace_secs: Option<u64>,
    pub handshake_timeout_secs: Option<u64>,
    pub resume_policy: Option<ResumePolicy>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawReaperConfig {
    pub mode: Option<ReaperMode>,
    pub idle_ttl_secs: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
}

/// Whether idle sessions are ever expired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReaperMode {
    #[default]
    Expiring,
    Never,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TetherConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub session: SessionSection,

    #[serde(default)]
    pub reaper: ReaperSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Externally visible base URL for resume hints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,

    /// Seconds between SSE keep-alive comments
    pub keep_alive_secs: u64,

    /// Events buffered per stream
    pub stream_buffer: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            public_url: None,
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSection {
    /// Seconds a provisional id keeps resolving after a re-key
    pub rekey_grace_secs: u64,

    /// Upper bound on a transport handshake
    pub handshake_timeout_secs: u64,

    /// What a resume does to the session's readiness
    pub resume_policy: ResumePolicy,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            rekey_grace_secs: DEFAULT_REKEY_GRACE.as_secs(),
            handshake_timeout_secs: DEFAULT_HANDSHAKE_TIMEOUT.as_secs(),
            resume_policy: ResumePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperSection {
    pub mode: ReaperMode,

    /// Idle threshold under the expiring mode
    pub idle_ttl_secs: u64,

    pub sweep_interval_secs: u64,
}

impl Default for ReaperSection {
    fn default() -> Self {
        Self {
            mode: ReaperMode::default(),
            idle_ttl_secs: DEFAULT_IDLE_TTL.as_secs(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL.as_secs(),
        }
    }
}

impl ReaperSection {
    pub fn policy(&self) -> ReaperPolicy {
        let interval = Duration::from_secs(self.sweep_interval_secs);
        match self.mode {
            ReaperMode::Expiring => ReaperPolicy::Expiring {
                ttl: Duration::from_secs(self.idle_ttl_secs),
                interval,
            },
            ReaperMode::Never => ReaperPolicy::Never { interval },
        }
    }
}

impl TetherConfig {
    /// Build the server configuration this file describes
    pub fn server_config(&self) -> tether_server::ServerConfig {
        tether_server::ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            public_url: self.server.public_url.clone(),
            registry: RegistryConfig {
                rekey_grace: Duration::from_secs(self.session.rekey_grace_secs),
                handshake_timeout: Duration::from_secs(self.session.handshake_timeout_secs),
                resume_policy: self.session.resume_policy,
            },
            reaper: self.reaper.policy(),
            keep_alive: Duration::from_secs(self.server.keep_alive_secs),
            stream_buffer: self.server.stream_buffer,
        }
    }
}
