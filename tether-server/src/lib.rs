//! tether-server - HTTP server for resumable SSE sessions
//!
//! Clients open a long-lived event stream on [`STREAM_PATH`] and send
//! messages out of band to [`MESSAGE_PATH`]. The server owns the
//! [`SessionRegistry`](tether_core::SessionRegistry) and the reaper that
//! expires idle sessions.

mod error;
pub mod http;
pub mod sse;
mod state;

use std::sync::Arc;
use std::time::Duration;

use tether_core::{Reaper, ReaperPolicy, RegistryConfig};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use error::{ApiError, ErrorBody, ErrorData, ErrorEnvelope, ServerError};
pub use http::{HealthResponse, SessionListResponse, create_router};
pub use sse::{SESSION_ID_HEADER, SseTransport};
pub use state::AppState;

/// Path of the stream-open endpoint
pub const STREAM_PATH: &str = "/sse";
/// Path of the out-of-band message endpoint
pub const MESSAGE_PATH: &str = "/message";

/// The main tether server
pub struct TetherServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl TetherServer {
    /// Create a new server with fresh state
    pub fn new(config: ServerConfig) -> Self {
        let state = Arc::new(AppState::new(&config));
        Self { config, state }
    }

    /// Create a server with custom state (for testing)
    pub fn with_state(config: ServerConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the shared application state
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Cancelling this token stops the server, its streams and the reaper
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    /// Run the server, binding to the configured address
    pub async fn run(self) -> Result<(), ServerError> {
        self.config.validate()?;
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.clone(),
                source: e,
            })?;

        tracing::info!("tether server listening on {}", addr);
        self.run_with_listener(listener).await
    }

    /// Run the server on an already bound listener
    pub async fn run_with_listener(self, listener: TcpListener) -> Result<(), ServerError> {
        let shutdown = self.state.shutdown.clone();
        let reaper = Reaper::new(self.state.registry.clone(), self.state.reaper_policy)
            .spawn(shutdown.child_token());

        let router = create_router(self.state);
        let signal = shutdown.clone();
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .await;

        shutdown.cancel();
        if let Err(e) = reaper.await {
            tracing::warn!(error = %e, "reaper task ended abnormally");
        }
        tracing::info!("tether server stopped");

        result.map_err(|e| ServerError::Internal(e.to_string()))
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Externally visible base URL, used in resume hints and endpoint events
    pub public_url: Option<String>,
    /// Registry tuning
    pub registry: RegistryConfig,
    /// Idle expiry mode
    pub reaper: ReaperPolicy,
    /// Interval between SSE keep-alive comments
    pub keep_alive: Duration,
    /// Events buffered per stream before senders wait
    pub stream_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7480,
            public_url: None,
            registry: RegistryConfig::default(),
            reaper: ReaperPolicy::default(),
            keep_alive: Duration::from_secs(15),
            stream_buffer: 64,
        }
    }
}

impl ServerConfig {
    /// Create a new ServerConfig with the specified host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Returns the socket address string (e.g., "127.0.0.1:7480")
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Address clients reopen their stream at
    pub fn stream_url(&self) -> String {
        self.url_for(STREAM_PATH)
    }

    /// Address clients post messages to
    pub fn message_url(&self) -> String {
        self.url_for(MESSAGE_PATH)
    }

    fn url_for(&self, path: &str) -> String {
        match &self.public_url {
            Some(base) => format!("{}{}", base.trim_end_matches('/'), path),
            None => path.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.stream_buffer == 0 {
            return Err(ServerError::InvalidConfig(
                "stream buffer must be positive".into(),
            ));
        }
        if self.keep_alive.is_zero() {
            return Err(ServerError::InvalidConfig(
                "keep-alive interval must be positive".into(),
            ));
        }
        if self.registry.handshake_timeout.is_zero() {
            return Err(ServerError::InvalidConfig(
                "handshake timeout must be positive".into(),
            ));
        }
        if self.reaper.interval().is_zero() {
            return Err(ServerError::InvalidConfig(
                "sweep interval must be positive".into(),
            ));
        }
        Ok(())
    }
}
