//! Session records
//!
//! A record is the single authoritative instance of one logical session. The
//! registry hands out `Arc<SessionRecord>`; fields sit behind short
//! synchronous locks that are never held across an await.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::id::{SessionId, SessionIdentity};
use super::lifecycle::{LifecycleEvent, LifecycleState};
use crate::error::{LifecycleError, RegistryError};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy)]
struct Activity {
    at: Instant,
    wall: DateTime<Utc>,
}

/// One logical, resumable session
pub struct SessionRecord {
    identity: RwLock<SessionIdentity>,
    transport: RwLock<Arc<dyn Transport>>,
    state: Mutex<LifecycleState>,
    last_activity: Mutex<Activity>,
    created_at: DateTime<Utc>,
    created: Instant,
}

impl SessionRecord {
    pub(crate) fn new(provisional: SessionId, transport: Arc<dyn Transport>) -> Self {
        let now = Instant::now();
        let wall = Utc::now();
        Self {
            identity: RwLock::new(SessionIdentity::new(provisional)),
            transport: RwLock::new(transport),
            state: Mutex::new(LifecycleState::Pending),
            last_activity: Mutex::new(Activity { at: now, wall }),
            created_at: wall,
            created: now,
        }
    }

    /// The id the session currently answers to
    pub fn id(&self) -> SessionId {
        self.identity.read().current().clone()
    }

    pub fn provisional_id(&self) -> SessionId {
        self.identity.read().provisional().clone()
    }

    pub fn durable_id(&self) -> Option<SessionId> {
        self.identity.read().durable().cloned()
    }

    pub(crate) fn set_durable_id(&self, id: SessionId) -> Result<(), RegistryError> {
        self.identity.write().set_durable(id)
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Apply a lifecycle event, returning the new state
    pub(crate) fn apply(&self, event: LifecycleEvent) -> Result<LifecycleState, LifecycleError> {
        let mut state = self.state.lock();
        let next = state.on(event)?;
        *state = next;
        Ok(next)
    }

    /// Force the record back to `Pending` for a fresh handshake
    pub(crate) fn reset_to_pending(&self) -> Result<(), LifecycleError> {
        let mut state = self.state.lock();
        if state.is_terminal() {
            return Err(LifecycleError {
                from: *state,
                event: LifecycleEvent::StreamAttached,
            });
        }
        *state = LifecycleState::Pending;
        Ok(())
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.read().clone()
    }

    /// Swap in a new transport, handing back the one it replaced
    pub(crate) fn replace_transport(&self, transport: Arc<dyn Transport>) -> Arc<dyn Transport> {
        std::mem::replace(&mut *self.transport.write(), transport)
    }

    /// Whether `transport` is the one currently attached
    pub fn is_current_transport(&self, transport: &Arc<dyn Transport>) -> bool {
        Arc::ptr_eq(&*self.transport.read(), transport)
    }

    /// Refresh the activity timestamp. Never moves it backwards.
    pub fn touch(&self) {
        let now = Instant::now();
        let mut activity = self.last_activity.lock();
        if now > activity.at {
            activity.at = now;
            activity.wall = Utc::now();
        }
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity.lock().wall
    }

    /// Time since the last activity, measured at `now`
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity.lock().at)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    /// Point-in-time view for listings
    pub fn summary(&self) -> SessionSummary {
        let identity = self.identity.read().clone();
        let state = self.state();
        SessionSummary {
            id: identity.current().clone(),
            provisional_id: identity.provisional().clone(),
            durable_id: identity.durable().cloned(),
            state,
            ready: state.is_ready(),
            active: state.is_active(),
            alive: self.transport().is_alive(),
            last_activity: self.last_activity(),
            created_at: self.created_at,
            age_secs: self.age().as_secs(),
            idle_secs: self.idle_for(Instant::now()).as_secs(),
        }
    }
}

impl std::fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRecord")
            .field("identity", &*self.identity.read())
            .field("state", &self.state())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Diagnostic snapshot of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub provisional_id: SessionId,
    pub durable_id: Option<SessionId>,
    pub state: LifecycleState,
    pub ready: bool,
    pub active: bool,
    /// Transport liveness at the time of the snapshot
    pub alive: bool,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub age_secs: u64,
    pub idle_secs: u64,
}
