//! Error types for tether-core

use thiserror::Error;

use crate::session::{LifecycleEvent, LifecycleState, SessionId};

/// Error codes carried in the client-facing error envelope
pub mod codes {
    pub const INVALID_REQUEST: i32 = -32600;
    pub const SESSION_NOT_FOUND: i32 = -32001;
    pub const SESSION_NOT_READY: i32 = -32002;
    pub const SESSION_GONE: i32 = -32003;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// Errors raised by the session registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("session not found: {0}")]
    NotFound(SessionId),

    #[error("key {key} already belongs to session {owner}")]
    KeyConflict { key: SessionId, owner: SessionId },

    #[error("session {session} already has durable id {existing}, refusing {requested}")]
    DurableIdAlreadySet {
        session: SessionId,
        existing: SessionId,
        requested: SessionId,
    },

    #[error("handshake failed: {0}")]
    Handshake(#[from] TransportError),

    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
}

/// Rejected lifecycle transition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid transition from {from:?} on {event:?}")]
pub struct LifecycleError {
    pub from: LifecycleState,
    pub event: LifecycleEvent,
}

/// Errors from a transport handshake
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport rejected attach: {0}")]
    Rejected(String),

    #[error("transport stream closed before the handshake completed")]
    Closed,

    #[error("handshake timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Why a transport could not deliver a message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The underlying stream was never fully established
    #[error("transport stream was never established")]
    NotEstablished,

    /// The underlying stream has gone away
    #[error("transport stream disconnected")]
    Disconnected,

    #[error("transport failure: {0}")]
    Internal(String),
}

impl SendError {
    /// Whether this failure means the client has to reopen its stream
    pub fn is_dead_stream(&self) -> bool {
        matches!(self, SendError::NotEstablished | SendError::Disconnected)
    }
}

/// Client-visible outcome of routing a message to a session
///
/// Every variant except [`DispatchError::Internal`] is a routine part of the
/// resumption protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("missing sessionId parameter")]
    MissingSessionId,

    #[error("session {session_id} not found, open a new stream")]
    NotFound {
        session_id: String,
        resume_hint: String,
    },

    #[error("session {session_id} is not ready yet, retry shortly")]
    NotReady { session_id: String },

    #[error("stream for session {session_id} is gone, resume via {resume_hint}")]
    DeadTransport {
        session_id: String,
        resume_hint: String,
    },

    #[error("failed to forward message to session {session_id}: {message}")]
    Internal { session_id: String, message: String },
}

impl DispatchError {
    /// HTTP status this outcome maps to
    pub fn status_code(&self) -> u16 {
        match self {
            DispatchError::MissingSessionId => 400,
            DispatchError::NotFound { .. } => 404,
            DispatchError::NotReady { .. } => 503,
            DispatchError::DeadTransport { .. } => 410,
            DispatchError::Internal { .. } => 500,
        }
    }

    /// JSON-RPC style error code used in the error envelope
    pub fn code(&self) -> i32 {
        match self {
            DispatchError::MissingSessionId => codes::INVALID_REQUEST,
            DispatchError::NotFound { .. } => codes::SESSION_NOT_FOUND,
            DispatchError::NotReady { .. } => codes::SESSION_NOT_READY,
            DispatchError::DeadTransport { .. } => codes::SESSION_GONE,
            DispatchError::Internal { .. } => codes::INTERNAL_ERROR,
        }
    }

    /// Session the error refers to, if one was given
    pub fn session_id(&self) -> Option<&str> {
        match self {
            DispatchError::MissingSessionId => None,
            DispatchError::NotFound { session_id, .. }
            | DispatchError::NotReady { session_id }
            | DispatchError::DeadTransport { session_id, .. }
            | DispatchError::Internal { session_id, .. } => Some(session_id),
        }
    }

    /// Where the client should reopen its stream
    pub fn resume_hint(&self) -> Option<&str> {
        match self {
            DispatchError::NotFound { resume_hint, .. }
            | DispatchError::DeadTransport { resume_hint, .. } => Some(resume_hint),
            _ => None,
        }
    }

    /// Only internal failures are unexpected
    pub fn is_unexpected(&self) -> bool {
        matches!(self, DispatchError::Internal { .. })
    }
}
