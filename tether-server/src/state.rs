//! Shared application state for the tether server

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tether_core::{ReaperPolicy, RequestDispatcher, SessionRegistry};
use tokio_util::sync::CancellationToken;

use crate::ServerConfig;

/// Shared application state accessible by all handlers
#[derive(Clone)]
pub struct AppState {
    /// Every live session of the process
    pub registry: Arc<SessionRegistry>,
    /// Routes posted messages onto session streams
    pub dispatcher: Arc<RequestDispatcher>,
    /// Mode the background reaper runs in
    pub reaper_policy: ReaperPolicy,
    /// URL of the stream endpoint, sent back in resume hints
    pub stream_url: String,
    /// URL announced in each stream's `endpoint` event
    pub message_url: String,
    /// Interval between SSE keep-alive comments
    pub keep_alive: Duration,
    /// Per-stream event buffer
    pub stream_buffer: usize,
    /// Cancelled when the server shuts down; ends open streams
    pub shutdown: CancellationToken,
    /// When the server started
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create state for `config` with an empty registry
    pub fn new(config: &ServerConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.registry.clone()));
        Self::with_registry(config, registry)
    }

    /// Create state around an existing registry (for testing)
    pub fn with_registry(config: &ServerConfig, registry: Arc<SessionRegistry>) -> Self {
        let stream_url = config.stream_url();
        let dispatcher = Arc::new(RequestDispatcher::new(registry.clone(), stream_url.clone()));
        Self {
            registry,
            dispatcher,
            reaper_policy: config.reaper,
            stream_url,
            message_url: config.message_url(),
            keep_alive: config.keep_alive,
            stream_buffer: config.stream_buffer.max(1),
            shutdown: CancellationToken::new(),
            started_at: Utc::now(),
        }
    }

    /// Returns how long the server has been running
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(&ServerConfig::default())
    }
}
