//! Connection lifecycle state machine
//!
//! ```text
//!            handshake ok           stream attached
//!  Pending ───────────────▶ Ready ─────────────────▶ Active ◀─┐
//!     │                       │                       │  ▲    │ attached /
//!     │ handshake failed      │ stream closed         │  │    │ request served
//!     ▼                       ▼                       ▼  │    │
//!  Expired ◀──── expire ── Inactive ◀── stream closed ─┘  └────┘
//! ```
//!
//! Every non-terminal state can move to `Expired`; nothing leaves it.

use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;

/// State of a session record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Record exists, handshake not confirmed yet
    Pending,
    /// Handshake confirmed, durable id assigned
    Ready,
    /// Ready with a live stream attached
    Active,
    /// Ready, but the stream has closed
    Inactive,
    /// Removed from the registry
    Expired,
}

/// Something that happened to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleEvent {
    HandshakeSucceeded,
    HandshakeFailed,
    StreamAttached,
    StreamClosed,
    RequestServed,
    Expire,
}

impl LifecycleState {
    /// Apply an event, returning the next state
    pub fn on(self, event: LifecycleEvent) -> Result<LifecycleState, LifecycleError> {
        use LifecycleEvent as E;
        use LifecycleState as S;

        let next = match (self, event) {
            (S::Pending, E::HandshakeSucceeded) => S::Ready,
            (S::Pending, E::HandshakeFailed) => S::Expired,
            (S::Ready | S::Active | S::Inactive, E::StreamAttached) => S::Active,
            (S::Ready | S::Active, E::StreamClosed) => S::Inactive,
            (S::Inactive, E::StreamClosed) => S::Inactive,
            (S::Inactive, E::RequestServed) => S::Active,
            (S::Ready | S::Active, E::RequestServed) => self,
            (S::Pending | S::Ready | S::Active | S::Inactive, E::Expire) => S::Expired,
            (from, event) => return Err(LifecycleError { from, event }),
        };
        Ok(next)
    }

    /// Handshake done, messages may be dispatched
    pub fn is_ready(self) -> bool {
        matches!(
            self,
            LifecycleState::Ready | LifecycleState::Active | LifecycleState::Inactive
        )
    }

    /// A live stream is attached
    pub fn is_active(self) -> bool {
        matches!(self, LifecycleState::Active)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Expired)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Pending => "pending",
            LifecycleState::Ready => "ready",
            LifecycleState::Active => "active",
            LifecycleState::Inactive => "inactive",
            LifecycleState::Expired => "expired",
        };
        f.write_str(s)
    }
}
