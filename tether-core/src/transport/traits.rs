//! Transport trait and related types
//!
//! A transport owns the framing and handshake of one underlying stream. The
//! registry only needs to attach it, push messages through it, and ask
//! whether the stream is still alive.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{SendError, TransportError};
use crate::session::SessionId;

/// Result of a successful delivery, as the transport wants it reported
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Status the request channel should answer with
    pub status: u16,
    /// Optional response body
    pub body: Option<Value>,
}

impl Delivery {
    /// Message queued onto the stream; the reply travels over the stream
    pub fn accepted() -> Self {
        Self {
            status: 202,
            body: None,
        }
    }
}

/// Streaming transport backing one session
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the handshake for `session` and return the durable id the
    /// transport assigned.
    ///
    /// `durable` is set when the session already carries a durable id from an
    /// earlier stream; the transport must hand that id back.
    async fn attach(
        &self,
        session: &SessionId,
        durable: Option<&SessionId>,
    ) -> Result<SessionId, TransportError>;

    /// Deliver a message over the stream
    async fn send(&self, payload: Value) -> Result<Delivery, SendError>;

    /// Whether the underlying stream can currently deliver data
    fn is_alive(&self) -> bool;

    /// Tear down the underlying stream once its session is gone
    fn close(&self) {}
}
