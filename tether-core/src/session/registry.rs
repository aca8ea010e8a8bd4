//! SessionRegistry: identity, lookup, re-keying, resumption and expiry
//!
//! The registry owns every [`SessionRecord`]. Records live in a primary index
//! keyed by their current id. A single secondary index covers the two windows
//! where a session is reachable under a key that is not its primary one:
//!
//! - provisional ids kept alive for a grace period after a re-key
//! - durable ids reported by a transport that have not been promoted yet
//!
//! Both indexes sit behind one synchronous mutex, so every mutation is a
//! single step with respect to lookups. No lock is held across an await.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::id::SessionId;
use super::lifecycle::{LifecycleEvent, LifecycleState};
use super::record::{SessionRecord, SessionSummary};
use crate::error::{RegistryError, TransportError};
use crate::transport::Transport;

/// Default window during which a pre-re-key id still resolves
pub const DEFAULT_REKEY_GRACE: Duration = Duration::from_secs(3);
/// Default bound on a transport handshake
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// What a resume does to a session's readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResumePolicy {
    /// A handshaken session goes straight back to `Active`
    #[default]
    Preserve,
    /// The session returns to `Pending` and must handshake again
    Reset,
}

impl std::str::FromStr for ResumePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preserve" => Ok(ResumePolicy::Preserve),
            "reset" => Ok(ResumePolicy::Reset),
            other => Err(format!("unknown resume policy: {other}")),
        }
    }
}

/// Registry tuning
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub rekey_grace: Duration,
    pub handshake_timeout: Duration,
    pub resume_policy: ResumePolicy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            rekey_grace: DEFAULT_REKEY_GRACE,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            resume_policy: ResumePolicy::default(),
        }
    }
}

/// Result of opening a stream against the registry
#[derive(Debug, Clone)]
pub struct Opened {
    pub record: Arc<SessionRecord>,
    /// An existing session was resumed rather than a new one created
    pub resumed: bool,
}

#[derive(Debug, Clone)]
enum AliasKind {
    /// Old key after a re-key, resolvable until the deadline
    Grace { until: Instant },
    /// Durable id known to the transport, not yet the primary key
    Unpromoted,
}

#[derive(Debug, Clone)]
struct Alias {
    record: Arc<SessionRecord>,
    kind: AliasKind,
}

#[derive(Default)]
struct Index {
    primary: HashMap<SessionId, Arc<SessionRecord>>,
    secondary: HashMap<SessionId, Alias>,
}

impl Index {
    fn contains(&self, key: &str) -> bool {
        self.primary.contains_key(key) || self.secondary.contains_key(key)
    }

    /// Key the record is stored under in the primary index
    fn primary_key_of(&self, record: &Arc<SessionRecord>) -> Option<SessionId> {
        let candidates = [record.durable_id(), Some(record.provisional_id())];
        candidates.into_iter().flatten().find(|key| {
            self.primary
                .get(key.as_str())
                .is_some_and(|r| Arc::ptr_eq(r, record))
        })
    }

    /// Whether `key` resolves to a record other than `record`
    fn owned_by_other(
        &self,
        key: &str,
        record: &Arc<SessionRecord>,
        now: Instant,
    ) -> Option<SessionId> {
        if let Some(owner) = self.primary.get(key) {
            if !Arc::ptr_eq(owner, record) {
                return Some(owner.id());
            }
        }
        if let Some(alias) = self.secondary.get(key) {
            let live = match alias.kind {
                AliasKind::Grace { until } => now < until,
                AliasKind::Unpromoted => true,
            };
            if live && !Arc::ptr_eq(&alias.record, record) {
                return Some(alias.record.id());
            }
        }
        None
    }

    /// Move `record` from its current primary key to `new_key`
    fn rekey(
        &mut self,
        record: &Arc<SessionRecord>,
        new_key: SessionId,
        grace: Duration,
        now: Instant,
    ) -> Result<(), RegistryError> {
        let old_key = self
            .primary_key_of(record)
            .ok_or_else(|| RegistryError::NotFound(new_key.clone()))?;
        if old_key == new_key {
            self.drop_unpromoted(new_key.as_str(), record);
            return Ok(());
        }
        if let Some(owner) = self.owned_by_other(new_key.as_str(), record, now) {
            return Err(RegistryError::KeyConflict {
                key: new_key,
                owner,
            });
        }
        record.set_durable_id(new_key.clone())?;

        self.primary.remove(&old_key);
        self.secondary.remove(&new_key);
        self.primary.insert(new_key, record.clone());
        self.secondary.insert(
            old_key,
            Alias {
                record: record.clone(),
                kind: AliasKind::Grace { until: now + grace },
            },
        );
        Ok(())
    }

    fn drop_unpromoted(&mut self, key: &str, record: &Arc<SessionRecord>) {
        let stale = self.secondary.get(key).is_some_and(|alias| {
            matches!(alias.kind, AliasKind::Unpromoted) && Arc::ptr_eq(&alias.record, record)
        });
        if stale {
            self.secondary.remove(key);
        }
    }

    /// Drop every key that resolves to `record`
    fn remove_record(&mut self, record: &Arc<SessionRecord>) {
        self.primary.retain(|_, r| !Arc::ptr_eq(r, record));
        self.secondary
            .retain(|_, alias| !Arc::ptr_eq(&alias.record, record));
    }

    fn prune_lapsed(&mut self, now: Instant) -> usize {
        let before = self.secondary.len();
        self.secondary.retain(|_, alias| match alias.kind {
            AliasKind::Grace { until } => now < until,
            AliasKind::Unpromoted => true,
        });
        before - self.secondary.len()
    }
}

/// Owns every session record of the process
pub struct SessionRegistry {
    index: Mutex<Index>,
    config: RegistryConfig,
}

impl SessionRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            index: Mutex::new(Index::default()),
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Create a `Pending` session under a fresh provisional id
    ///
    /// A requested id is never adopted: an unknown one is replaced, a known
    /// one belongs to an existing session and callers resume that instead.
    /// The record resolves by its provisional id as soon as this returns.
    #[instrument(name = "session::create", skip(self, transport))]
    pub fn create(
        &self,
        requested: Option<&str>,
        transport: Arc<dyn Transport>,
    ) -> Arc<SessionRecord> {
        let mut index = self.index.lock();
        let id = loop {
            let candidate = SessionId::generate();
            if !index.contains(candidate.as_str()) {
                break candidate;
            }
        };
        if let Some(requested) = requested {
            debug!(requested = %requested, allocated = %id, "requested id not adopted");
        }
        let record = Arc::new(SessionRecord::new(id.clone(), transport));
        index.primary.insert(id.clone(), record.clone());
        info!(session_id = %id, "session created");
        record
    }

    /// Resolve a key to its session
    ///
    /// Falls back to the secondary index. A hit on a durable id that was
    /// never promoted completes the re-key on the spot.
    pub fn lookup(&self, id: &str) -> Result<Arc<SessionRecord>, RegistryError> {
        let now = Instant::now();
        let mut index = self.index.lock();

        if let Some(record) = index.primary.get(id) {
            return Self::live(record.clone(), id);
        }

        let Some(alias) = index.secondary.get(id).cloned() else {
            return Err(RegistryError::NotFound(id.into()));
        };
        match alias.kind {
            AliasKind::Grace { until } if now < until => Self::live(alias.record, id),
            AliasKind::Grace { .. } => {
                index.secondary.remove(id);
                debug!(session_id = %id, "grace alias lapsed");
                Err(RegistryError::NotFound(id.into()))
            }
            AliasKind::Unpromoted => {
                index.rekey(&alias.record, id.into(), self.config.rekey_grace, now)?;
                debug!(session_id = %id, "promoted transport-reported id");
                Self::live(alias.record, id)
            }
        }
    }

    fn live(record: Arc<SessionRecord>, id: &str) -> Result<Arc<SessionRecord>, RegistryError> {
        if record.state().is_terminal() {
            Err(RegistryError::NotFound(id.into()))
        } else {
            Ok(record)
        }
    }

    /// Attach a new transport to an existing session
    #[instrument(name = "session::resume", skip(self, transport))]
    pub fn resume(
        &self,
        id: &str,
        transport: Arc<dyn Transport>,
    ) -> Result<Arc<SessionRecord>, RegistryError> {
        let record = self.lookup(id)?;
        let previous = record.replace_transport(transport.clone());
        if !Arc::ptr_eq(&previous, &transport) {
            previous.close();
        }
        match self.config.resume_policy {
            ResumePolicy::Reset => record.reset_to_pending()?,
            ResumePolicy::Preserve => {
                if record.state().is_ready() {
                    record.apply(LifecycleEvent::StreamAttached)?;
                }
            }
        }
        record.touch();
        info!(session_id = %record.id(), state = %record.state(), "session resumed");
        Ok(record)
    }

    /// Resume `requested` when it resolves, otherwise create a new session
    pub fn open(&self, requested: Option<&str>, transport: Arc<dyn Transport>) -> Opened {
        if let Some(id) = requested {
            match self.resume(id, transport.clone()) {
                Ok(record) => {
                    return Opened {
                        record,
                        resumed: true,
                    };
                }
                Err(e) => debug!(session_id = %id, error = %e, "resume failed, creating"),
            }
        }
        Opened {
            record: self.create(requested, transport),
            resumed: false,
        }
    }

    /// Move the session answering to `old` onto `new`
    ///
    /// `old` keeps resolving for `grace`; there is no instant at which
    /// neither key resolves.
    #[instrument(name = "session::rekey", skip(self))]
    pub fn rekey(
        &self,
        old: &str,
        new: &str,
        grace: Duration,
    ) -> Result<Arc<SessionRecord>, RegistryError> {
        let now = Instant::now();
        let mut index = self.index.lock();
        let record = match index.primary.get(old) {
            Some(record) => record.clone(),
            None => match index.secondary.get(old) {
                Some(Alias {
                    record,
                    kind: AliasKind::Grace { until },
                }) if now < *until => record.clone(),
                Some(Alias {
                    record,
                    kind: AliasKind::Unpromoted,
                }) => record.clone(),
                _ => return Err(RegistryError::NotFound(old.into())),
            },
        };
        index.rekey(&record, new.into(), grace, now)?;
        debug!(old = %old, new = %new, "session re-keyed");
        Ok(record)
    }

    /// Identity callback: the transport has assigned `durable`
    ///
    /// The id resolves immediately through the secondary index, before the
    /// re-key moves the primary entry.
    pub fn register_durable_id(
        &self,
        record: &Arc<SessionRecord>,
        durable: SessionId,
    ) -> Result<(), RegistryError> {
        let now = Instant::now();
        let mut index = self.index.lock();
        let current = index
            .primary_key_of(record)
            .ok_or_else(|| RegistryError::NotFound(record.id()))?;
        if let Some(owner) = index.owned_by_other(durable.as_str(), record, now) {
            return Err(RegistryError::KeyConflict {
                key: durable,
                owner,
            });
        }
        record.set_durable_id(durable.clone())?;
        if current != durable {
            index.secondary.insert(
                durable,
                Alias {
                    record: record.clone(),
                    kind: AliasKind::Unpromoted,
                },
            );
        }
        Ok(())
    }

    /// Record a successful handshake: index the durable id, mark the session
    /// `Ready`, then re-key onto the durable id
    #[instrument(name = "session::handshake_complete", skip(self, record))]
    pub fn complete_handshake(
        &self,
        record: &Arc<SessionRecord>,
        durable: SessionId,
    ) -> Result<LifecycleState, RegistryError> {
        self.register_durable_id(record, durable.clone())?;
        if record.state() == LifecycleState::Pending {
            record.apply(LifecycleEvent::HandshakeSucceeded)?;
        }
        let now = Instant::now();
        self.index
            .lock()
            .rekey(record, durable, self.config.rekey_grace, now)?;
        record.touch();
        Ok(record.state())
    }

    /// Record a failed handshake; the session is expired and dropped
    pub fn fail_handshake(&self, record: &Arc<SessionRecord>) {
        if let Err(e) = record.apply(LifecycleEvent::HandshakeFailed) {
            debug!(session_id = %record.id(), error = %e, "handshake failure on settled session");
            let _ = record.apply(LifecycleEvent::Expire);
        }
        self.index.lock().remove_record(record);
        info!(session_id = %record.id(), "session dropped after failed handshake");
    }

    /// Run the transport handshake for `record`, bounded by the configured
    /// timeout, and settle the outcome in the registry
    pub async fn handshake(
        &self,
        record: &Arc<SessionRecord>,
    ) -> Result<LifecycleState, RegistryError> {
        let transport = record.transport();
        let id = record.id();
        let durable = record.durable_id();
        let fresh = record.state() == LifecycleState::Pending;
        let result = tokio::time::timeout(
            self.config.handshake_timeout,
            transport.attach(&id, durable.as_ref()),
        )
        .await
        .unwrap_or(Err(TransportError::Timeout(self.config.handshake_timeout)));

        let err = match result {
            Ok(durable) => match self.complete_handshake(record, durable) {
                Ok(state) => return Ok(state),
                Err(e) => {
                    warn!(session_id = %id, error = %e, "handshake could not be recorded");
                    e
                }
            },
            Err(e) => {
                warn!(session_id = %id, error = %e, "handshake failed");
                RegistryError::Handshake(e)
            }
        };

        if fresh {
            self.fail_handshake(record);
        } else {
            // a resumed session survives a failed reattach; only this stream is lost
            self.stream_closed(record, &transport);
        }
        Err(err)
    }

    /// A live stream is now attached through `transport`
    pub fn stream_opened(
        &self,
        record: &Arc<SessionRecord>,
        transport: &Arc<dyn Transport>,
    ) -> Result<LifecycleState, RegistryError> {
        if !record.is_current_transport(transport) {
            return Ok(record.state());
        }
        let state = record.apply(LifecycleEvent::StreamAttached)?;
        record.touch();
        Ok(state)
    }

    /// The stream behind `transport` has closed
    ///
    /// Ignored when `transport` has since been replaced by a resume.
    pub fn stream_closed(&self, record: &Arc<SessionRecord>, transport: &Arc<dyn Transport>) {
        if !record.is_current_transport(transport) {
            debug!(session_id = %record.id(), "close from replaced transport ignored");
            return;
        }
        let state = record.state();
        if matches!(state, LifecycleState::Ready | LifecycleState::Active) {
            let _ = record.apply(LifecycleEvent::StreamClosed);
            info!(session_id = %record.id(), "stream closed, session inactive");
        }
    }

    /// Remove every session idle for longer than `ttl`
    pub fn expire_idle(&self, ttl: Duration) -> Vec<SessionId> {
        let now = Instant::now();
        let mut index = self.index.lock();

        let idle: Vec<Arc<SessionRecord>> = index
            .primary
            .values()
            .filter(|record| record.idle_for(now) > ttl)
            .cloned()
            .collect();

        for record in &idle {
            index.remove_record(record);
            let _ = record.apply(LifecycleEvent::Expire);
        }
        index.prune_lapsed(now);
        drop(index);

        idle.iter()
            .map(|record| {
                record.transport().close();
                record.id()
            })
            .collect()
    }

    /// Drop re-key aliases whose grace window has passed
    pub fn prune_aliases(&self) -> usize {
        self.index.lock().prune_lapsed(Instant::now())
    }

    /// Administrative removal
    #[instrument(name = "session::remove", skip(self))]
    pub fn remove(&self, id: &str) -> Result<Arc<SessionRecord>, RegistryError> {
        let now = Instant::now();
        let mut index = self.index.lock();
        let record = match index.primary.get(id) {
            Some(record) => record.clone(),
            None => match index.secondary.get(id) {
                Some(Alias {
                    kind: AliasKind::Grace { until },
                    ..
                }) if now >= *until => return Err(RegistryError::NotFound(id.into())),
                Some(alias) => alias.record.clone(),
                None => return Err(RegistryError::NotFound(id.into())),
            },
        };
        index.remove_record(&record);
        drop(index);
        let _ = record.apply(LifecycleEvent::Expire);
        record.transport().close();
        info!(session_id = %record.id(), "session removed");
        Ok(record)
    }

    /// Snapshot of every session, oldest first
    pub fn list(&self) -> Vec<SessionSummary> {
        let records: Vec<Arc<SessionRecord>> =
            self.index.lock().primary.values().cloned().collect();
        let mut summaries: Vec<SessionSummary> = records.iter().map(|r| r.summary()).collect();
        summaries.sort_by_key(|s| s.created_at);
        summaries
    }

    pub fn len(&self) -> usize {
        self.index.lock().primary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn registry() -> SessionRegistry {
        SessionRegistry::default()
    }

    fn mock() -> Arc<dyn Transport> {
        Arc::new(MockTransport::new())
    }

    // ==================== Creation ====================

    #[test]
    fn create_is_resolvable_immediately() {
        let registry = registry();
        let record = registry.create(None, mock());
        let id = record.id();

        let found = registry.lookup(id.as_str()).unwrap();
        assert!(Arc::ptr_eq(&found, &record));
        assert_eq!(found.state(), LifecycleState::Pending);
    }

    #[test]
    fn create_never_adopts_requested_id() {
        let registry = registry();
        let first = registry.create(None, mock());
        let second = registry.create(Some(first.id().as_str()), mock());
        let third = registry.create(Some("made-up"), mock());

        assert_ne!(first.id(), second.id());
        assert_ne!(third.id().as_str(), "made-up");
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn lookup_unknown_is_not_found() {
        let registry = registry();
        assert_eq!(
            registry.lookup("nope").unwrap_err(),
            RegistryError::NotFound("nope".into())
        );
    }

    // ==================== Re-keying ====================

    #[tokio::test(start_paused = true)]
    async fn rekey_keeps_both_keys_during_grace() {
        let registry = registry();
        let record = registry.create(None, mock());
        let old = record.id();

        registry
            .rekey(old.as_str(), "d1", Duration::from_secs(3))
            .unwrap();

        let by_old = registry.lookup(old.as_str()).unwrap();
        let by_new = registry.lookup("d1").unwrap();
        assert!(Arc::ptr_eq(&by_old, &by_new));
        assert_eq!(record.id().as_str(), "d1");

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(registry.lookup(old.as_str()).is_ok());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(matches!(
            registry.lookup(old.as_str()),
            Err(RegistryError::NotFound(_))
        ));
        assert!(registry.lookup("d1").is_ok());
    }

    #[test]
    fn rekey_onto_another_sessions_key_conflicts() {
        let registry = registry();
        let a = registry.create(None, mock());
        let b = registry.create(None, mock());

        let err = registry
            .rekey(a.id().as_str(), b.id().as_str(), DEFAULT_REKEY_GRACE)
            .unwrap_err();
        assert!(matches!(err, RegistryError::KeyConflict { .. }));

        // both still resolve to their own record
        assert!(Arc::ptr_eq(&registry.lookup(a.id().as_str()).unwrap(), &a));
        assert!(Arc::ptr_eq(&registry.lookup(b.id().as_str()).unwrap(), &b));
    }

    #[test]
    fn rekey_onto_grace_alias_of_other_session_conflicts() {
        let registry = registry();
        let a = registry.create(None, mock());
        let a_old = a.id();
        registry
            .rekey(a_old.as_str(), "a-durable", DEFAULT_REKEY_GRACE)
            .unwrap();

        let b = registry.create(None, mock());
        let err = registry
            .rekey(b.id().as_str(), a_old.as_str(), DEFAULT_REKEY_GRACE)
            .unwrap_err();
        assert!(matches!(err, RegistryError::KeyConflict { .. }));
    }

    #[test]
    fn durable_id_cannot_change() {
        let registry = registry();
        let record = registry.create(None, mock());
        registry
            .rekey(record.id().as_str(), "d1", DEFAULT_REKEY_GRACE)
            .unwrap();

        let err = registry.rekey("d1", "d2", DEFAULT_REKEY_GRACE).unwrap_err();
        assert!(matches!(err, RegistryError::DurableIdAlreadySet { .. }));
        assert!(registry.lookup("d2").is_err());
    }

    #[test]
    fn rekey_to_same_id_is_noop() {
        let registry = registry();
        let record = registry.create(None, mock());
        registry
            .rekey(record.id().as_str(), "d1", DEFAULT_REKEY_GRACE)
            .unwrap();
        registry.rekey("d1", "d1", DEFAULT_REKEY_GRACE).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unique_keys_across_create_and_rekey() {
        let registry = registry();
        let mut records = Vec::new();
        for n in 0..20 {
            let record = registry.create(None, mock());
            if n % 2 == 0 {
                registry
                    .rekey(record.id().as_str(), &format!("d{n}"), DEFAULT_REKEY_GRACE)
                    .unwrap();
            }
            records.push(record);
        }

        for (i, record) in records.iter().enumerate() {
            for key in [Some(record.provisional_id()), record.durable_id()]
                .into_iter()
                .flatten()
            {
                let found = registry.lookup(key.as_str()).unwrap();
                assert!(Arc::ptr_eq(&found, record));
                for (j, other) in records.iter().enumerate() {
                    if i != j {
                        assert!(!Arc::ptr_eq(&found, other));
                    }
                }
            }
        }
        assert_eq!(registry.len(), 20);
    }

    // ==================== Durable id before re-key ====================

    #[test]
    fn transport_reported_id_resolves_and_self_heals() {
        let registry = registry();
        let record = registry.create(None, mock());
        let provisional = record.id();

        registry
            .register_durable_id(&record, "d1".into())
            .unwrap();

        // lookup by the durable id promotes it into the primary index
        let found = registry.lookup("d1").unwrap();
        assert!(Arc::ptr_eq(&found, &record));
        // the provisional id still resolves through its grace alias
        assert!(registry.lookup(provisional.as_str()).is_ok());
        // a later re-key is a no-op
        registry
            .rekey(provisional.as_str(), "d1", DEFAULT_REKEY_GRACE)
            .unwrap();
        assert_eq!(registry.len(), 1);
    }

    // ==================== Handshake ====================

    #[tokio::test]
    async fn handshake_makes_session_ready_under_durable_id() {
        let registry = registry();
        let record = registry.create(None, Arc::new(MockTransport::with_durable_id("d1")));
        let provisional = record.id();

        let state = registry.handshake(&record).await.unwrap();
        assert_eq!(state, LifecycleState::Ready);
        assert_eq!(record.id().as_str(), "d1");
        assert!(registry.lookup("d1").is_ok());
        assert!(registry.lookup(provisional.as_str()).is_ok());
    }

    #[tokio::test]
    async fn provisional_id_resolves_during_handshake() {
        let registry = Arc::new(registry());
        let (transport, gate) = MockTransport::with_durable_id("d1").gated();
        let record = registry.create(None, Arc::new(transport));
        let provisional = record.id();

        let task = {
            let registry = registry.clone();
            let record = record.clone();
            tokio::spawn(async move { registry.handshake(&record).await })
        };
        tokio::task::yield_now().await;

        let found = registry.lookup(provisional.as_str()).unwrap();
        assert_eq!(found.state(), LifecycleState::Pending);

        gate.release();
        assert_eq!(task.await.unwrap().unwrap(), LifecycleState::Ready);
    }

    #[tokio::test]
    async fn failed_handshake_expires_session() {
        let registry = registry();
        let record = registry.create(None, Arc::new(MockTransport::rejecting("bad")));
        let id = record.id();

        let err = registry.handshake(&record).await.unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Handshake(TransportError::Rejected(_))
        ));
        assert_eq!(record.state(), LifecycleState::Expired);
        assert!(registry.lookup(id.as_str()).is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_handshake_times_out() {
        let registry = SessionRegistry::new(RegistryConfig {
            handshake_timeout: Duration::from_secs(2),
            ..RegistryConfig::default()
        });
        let (transport, _gate) = MockTransport::new().gated();
        let record = registry.create(None, Arc::new(transport));

        let err = registry.handshake(&record).await.unwrap_err();
        assert_eq!(
            err,
            RegistryError::Handshake(TransportError::Timeout(Duration::from_secs(2)))
        );
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn handshake_after_removal_does_not_resurrect() {
        let registry = Arc::new(registry());
        let (transport, gate) = MockTransport::with_durable_id("d1").gated();
        let record = registry.create(None, Arc::new(transport));
        let provisional = record.id();

        let task = {
            let registry = registry.clone();
            let record = record.clone();
            tokio::spawn(async move { registry.handshake(&record).await })
        };
        tokio::task::yield_now().await;
        registry.remove(provisional.as_str()).unwrap();
        gate.release();

        assert!(task.await.unwrap().is_err());
        assert!(registry.lookup("d1").is_err());
        assert!(registry.is_empty());
    }

    // ==================== Stream events & resume ====================

    #[tokio::test]
    async fn resume_round_trip_preserves_identity() {
        let registry = registry();
        let first = mock();
        let record = registry.create(None, first.clone());
        registry.handshake(&record).await.unwrap();
        registry.stream_opened(&record, &first).unwrap();
        assert_eq!(record.state(), LifecycleState::Active);
        let created_at = record.created_at();
        let id = record.id();

        registry.stream_closed(&record, &first);
        assert_eq!(record.state(), LifecycleState::Inactive);

        let second = mock();
        let resumed = registry.resume(id.as_str(), second.clone()).unwrap();
        assert!(Arc::ptr_eq(&resumed, &record));

        let found = registry.lookup(id.as_str()).unwrap();
        assert_eq!(found.state(), LifecycleState::Active);
        assert!(found.is_current_transport(&second));
        assert_eq!(found.created_at(), created_at);
    }

    #[tokio::test]
    async fn stale_close_after_resume_is_ignored() {
        let registry = registry();
        let first = mock();
        let record = registry.create(None, first.clone());
        registry.handshake(&record).await.unwrap();
        registry.stream_opened(&record, &first).unwrap();

        let second = mock();
        registry.resume(record.id().as_str(), second).unwrap();
        registry.stream_closed(&record, &first);

        assert_eq!(record.state(), LifecycleState::Active);
    }

    #[tokio::test]
    async fn resume_closes_replaced_transport() {
        let registry = registry();
        let first = mock();
        let record = registry.create(None, first.clone());
        registry.handshake(&record).await.unwrap();
        registry.stream_opened(&record, &first).unwrap();

        let second = mock();
        registry.resume(record.id().as_str(), second.clone()).unwrap();

        assert!(!first.is_alive());
        assert!(second.is_alive());
        assert_eq!(record.state(), LifecycleState::Active);
    }

    #[tokio::test]
    async fn failed_reattach_keeps_resumed_session() {
        let registry = registry();
        let first = mock();
        let record = registry.create(None, first.clone());
        registry.handshake(&record).await.unwrap();
        registry.stream_opened(&record, &first).unwrap();
        let id = record.id();

        let second: Arc<dyn Transport> = Arc::new(MockTransport::rejecting("bad"));
        let resumed = registry.resume(id.as_str(), second).unwrap();
        assert!(registry.handshake(&resumed).await.is_err());

        assert_eq!(resumed.state(), LifecycleState::Inactive);
        assert!(registry.lookup(id.as_str()).is_ok());
    }

    #[tokio::test]
    async fn reset_policy_requires_new_handshake() {
        let registry = SessionRegistry::new(RegistryConfig {
            resume_policy: ResumePolicy::Reset,
            ..RegistryConfig::default()
        });
        let record = registry.create(None, mock());
        registry.handshake(&record).await.unwrap();
        let id = record.id();

        let resumed = registry.resume(id.as_str(), mock()).unwrap();
        assert_eq!(resumed.state(), LifecycleState::Pending);

        assert_eq!(
            registry.handshake(&resumed).await.unwrap(),
            LifecycleState::Ready
        );
        assert_eq!(resumed.id(), id);
    }

    #[test]
    fn open_creates_when_requested_id_unknown() {
        let registry = registry();
        let opened = registry.open(Some("ghost"), mock());
        assert!(!opened.resumed);
        assert_ne!(opened.record.id().as_str(), "ghost");

        let again = registry.open(Some(opened.record.id().as_str()), mock());
        assert!(again.resumed);
        assert!(Arc::ptr_eq(&again.record, &opened.record));
    }

    #[test]
    fn resume_missing_is_not_found() {
        let registry = registry();
        assert!(matches!(
            registry.resume("nope", mock()),
            Err(RegistryError::NotFound(_))
        ));
    }

    // ==================== Expiry & removal ====================

    #[tokio::test(start_paused = true)]
    async fn expire_idle_removes_only_old_sessions() {
        let registry = registry();
        let old = registry.create(None, mock());
        tokio::time::advance(Duration::from_secs(60)).await;
        let young = registry.create(None, mock());
        tokio::time::advance(Duration::from_secs(10)).await;

        let expired = registry.expire_idle(Duration::from_secs(30));

        assert_eq!(expired, vec![old.id()]);
        assert_eq!(old.state(), LifecycleState::Expired);
        assert!(registry.lookup(old.id().as_str()).is_err());
        assert!(registry.lookup(young.id().as_str()).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn expire_idle_drops_grace_aliases_of_expired_session() {
        let registry = registry();
        let record = registry.create(None, mock());
        let provisional = record.id();
        registry
            .rekey(provisional.as_str(), "d1", Duration::from_secs(600))
            .unwrap();

        tokio::time::advance(Duration::from_secs(120)).await;
        registry.expire_idle(Duration::from_secs(60));

        assert!(registry.lookup(provisional.as_str()).is_err());
        assert!(registry.lookup("d1").is_err());
    }

    #[test]
    fn remove_expires_and_forgets_session() {
        let registry = registry();
        let record = registry.create(None, mock());
        let id = record.id();

        let removed = registry.remove(id.as_str()).unwrap();
        assert_eq!(removed.state(), LifecycleState::Expired);
        assert!(!removed.transport().is_alive());
        assert!(registry.lookup(id.as_str()).is_err());
        assert!(registry.remove(id.as_str()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn prune_aliases_drops_lapsed_entries() {
        let registry = registry();
        let record = registry.create(None, mock());
        registry
            .rekey(record.id().as_str(), "d1", Duration::from_secs(1))
            .unwrap();
        assert_eq!(registry.prune_aliases(), 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(registry.prune_aliases(), 1);
    }

    #[test]
    fn list_is_oldest_first() {
        let registry = registry();
        let a = registry.create(None, mock());
        std::thread::sleep(Duration::from_millis(2));
        let b = registry.create(None, mock());

        let listed = registry.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, a.id());
        assert_eq!(listed[1].id, b.id());
        assert_eq!(listed[0].state, LifecycleState::Pending);
    }
}
