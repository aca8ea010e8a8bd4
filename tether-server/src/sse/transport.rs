//! [`Transport`] over an SSE response body

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::response::sse::Event;
use serde_json::Value;
use tether_core::{Delivery, SendError, SessionId, Transport, TransportError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// First event on every stream; carries the message URL for the session
pub const ENDPOINT_EVENT: &str = "endpoint";
/// Event carrying a delivered message
pub const MESSAGE_EVENT: &str = "message";

/// Feeds events into one SSE response
///
/// The response body owns the receiving half of the channel, so the stream
/// is alive exactly as long as that body has not been dropped.
pub struct SseTransport {
    events: mpsc::Sender<Event>,
    message_url: String,
    established: AtomicBool,
    closed: CancellationToken,
}

impl SseTransport {
    /// Create a transport and the receiver its response body drains
    pub fn channel(
        message_url: impl Into<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Event>) {
        let (events, rx) = mpsc::channel(capacity.max(1));
        let transport = Self {
            events,
            message_url: message_url.into(),
            established: AtomicBool::new(false),
            closed: CancellationToken::new(),
        };
        (transport, rx)
    }

    /// Cancelled once the transport has been closed by the registry
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    fn endpoint_for(&self, id: &SessionId) -> String {
        format!("{}?sessionId={}", self.message_url, id)
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn attach(
        &self,
        _session: &SessionId,
        durable: Option<&SessionId>,
    ) -> Result<SessionId, TransportError> {
        let id = durable
            .cloned()
            .unwrap_or_else(|| SessionId::from(Uuid::new_v4().to_string()));

        let event = Event::default()
            .event(ENDPOINT_EVENT)
            .data(self.endpoint_for(&id));
        self.events
            .send(event)
            .await
            .map_err(|_| TransportError::Closed)?;

        self.established.store(true, Ordering::SeqCst);
        Ok(id)
    }

    async fn send(&self, payload: Value) -> Result<Delivery, SendError> {
        if !self.established.load(Ordering::SeqCst) {
            return Err(SendError::NotEstablished);
        }
        let event = Event::default()
            .event(MESSAGE_EVENT)
            .json_data(&payload)
            .map_err(|e| SendError::Internal(e.to_string()))?;
        self.events
            .send(event)
            .await
            .map_err(|_| SendError::Disconnected)?;
        Ok(Delivery::accepted())
    }

    fn is_alive(&self) -> bool {
        !self.events.is_closed() && !self.closed.is_cancelled()
    }

    fn close(&self) {
        self.closed.cancel();
    }
}
