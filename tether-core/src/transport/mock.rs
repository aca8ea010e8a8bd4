//! Mock transport for testing
//!
//! MockTransport lets tests script the handshake outcome, flip liveness and
//! queue send failures, and records every delivered payload.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;

use super::traits::{Delivery, Transport};
use crate::error::{SendError, TransportError};
use crate::session::SessionId;

/// Scriptable [`Transport`] implementation
pub struct MockTransport {
    /// Id handed out by a first handshake (`None` adopts the session's id)
    assigned_id: Option<SessionId>,
    /// Id reported after attach
    alive: AtomicBool,
    reject_attach: Option<String>,
    /// Attach waits on this until released
    gate: Option<Arc<Notify>>,
    send_failures: Mutex<VecDeque<SendError>>,
    sent: Mutex<Vec<Value>>,
}

/// Releases a gated [`MockTransport`] handshake
#[derive(Clone)]
pub struct AttachGate(Arc<Notify>);

impl AttachGate {
    pub fn release(&self) {
        self.0.notify_one();
    }
}

impl MockTransport {
    /// Transport whose handshake adopts the id it is attached with
    pub fn new() -> Self {
        Self {
            assigned_id: None,
            alive: AtomicBool::new(true),
            reject_attach: None,
            gate: None,
            send_failures: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Transport whose handshake assigns `id`
    pub fn with_durable_id(id: impl Into<SessionId>) -> Self {
        Self {
            assigned_id: Some(id.into()),
            ..Self::new()
        }
    }

    /// Transport whose handshake always fails
    pub fn rejecting(reason: &str) -> Self {
        Self {
            reject_attach: Some(reason.to_string()),
            ..Self::new()
        }
    }

    /// Make the handshake wait until the returned gate is released
    pub fn gated(mut self) -> (Self, AttachGate) {
        let notify = Arc::new(Notify::new());
        self.gate = Some(notify.clone());
        (self, AttachGate(notify))
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// Fail the next `send` with `error`
    pub fn queue_send_failure(&self, error: SendError) {
        self.send_failures.lock().push_back(error);
    }

    /// Payloads delivered so far
    pub fn sent(&self) -> Vec<Value> {
        self.sent.lock().clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn attach(
        &self,
        session: &SessionId,
        durable: Option<&SessionId>,
    ) -> Result<SessionId, TransportError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(reason) = &self.reject_attach {
            return Err(TransportError::Rejected(reason.clone()));
        }
        let id = match (durable, &self.assigned_id) {
            (Some(durable), _) => durable.clone(),
            (None, Some(assigned)) => assigned.clone(),
            (None, None) => session.clone(),
        };
        Ok(id)
    }

    async fn send(&self, payload: Value) -> Result<Delivery, SendError> {
        if let Some(err) = self.send_failures.lock().pop_front() {
            return Err(err);
        }
        if !self.is_alive() {
            return Err(SendError::Disconnected);
        }
        self.sent.lock().push(payload);
        Ok(Delivery::accepted())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.set_alive(false);
    }
}
