//! Routes inbound messages to the transport of the session they name

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, instrument};

use crate::error::{DispatchError, SendError};
use crate::session::{LifecycleEvent, LifecycleState, SessionRecord, SessionRegistry};
use crate::transport::Delivery;

/// Resolves a session id and forwards a payload to its transport
pub struct RequestDispatcher {
    registry: Arc<SessionRegistry>,
    /// Address of the stream-open endpoint, used in resume hints
    stream_endpoint: String,
}

impl RequestDispatcher {
    pub fn new(registry: Arc<SessionRegistry>, stream_endpoint: impl Into<String>) -> Self {
        Self {
            registry,
            stream_endpoint: stream_endpoint.into(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Stream-open URL that resumes `session_id`
    pub fn resume_hint(&self, session_id: &str) -> String {
        format!("{}?sessionId={}", self.stream_endpoint, session_id)
    }

    /// Deliver `payload` to the session named by `session_id`
    #[instrument(name = "dispatch", skip(self, payload))]
    pub async fn dispatch(
        &self,
        session_id: Option<&str>,
        payload: Value,
    ) -> Result<Delivery, DispatchError> {
        let result = self.route(session_id, payload).await;
        if let Err(e) = &result {
            if e.is_unexpected() {
                error!(error = %e, "message dispatch failed");
            } else {
                debug!(error = %e, "message not dispatched");
            }
        }
        result
    }

    async fn route(
        &self,
        session_id: Option<&str>,
        payload: Value,
    ) -> Result<Delivery, DispatchError> {
        let id = match session_id.map(str::trim) {
            Some(id) if !id.is_empty() => id,
            _ => return Err(DispatchError::MissingSessionId),
        };

        let record = self
            .registry
            .lookup(id)
            .map_err(|_| DispatchError::NotFound {
                session_id: id.to_string(),
                resume_hint: self.stream_endpoint.clone(),
            })?;

        if !record.state().is_ready() {
            return Err(DispatchError::NotReady {
                session_id: id.to_string(),
            });
        }

        let transport = record.transport();
        if !transport.is_alive() {
            mark_inactive(&record);
            return Err(self.dead_transport(&record));
        }

        record.touch();
        if record.state() == LifecycleState::Inactive {
            let _ = record.apply(LifecycleEvent::RequestServed);
        }

        match transport.send(payload).await {
            Ok(delivery) => Ok(delivery),
            Err(e) if e.is_dead_stream() => {
                mark_inactive(&record);
                Err(self.dead_transport(&record))
            }
            Err(SendError::Internal(message)) => Err(DispatchError::Internal {
                session_id: record.id().to_string(),
                message,
            }),
            Err(other) => Err(DispatchError::Internal {
                session_id: record.id().to_string(),
                message: other.to_string(),
            }),
        }
    }

    fn dead_transport(&self, record: &SessionRecord) -> DispatchError {
        let id = record.id();
        DispatchError::DeadTransport {
            resume_hint: self.resume_hint(id.as_str()),
            session_id: id.to_string(),
        }
    }
}

fn mark_inactive(record: &SessionRecord) {
    if matches!(record.state(), LifecycleState::Ready | LifecycleState::Active) {
        let _ = record.apply(LifecycleEvent::StreamClosed);
    }
}
