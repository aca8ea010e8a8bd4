//! Background expiry of idle sessions
//!
//! Expiring sessions on a timer and resuming after arbitrary downtime are
//! mutually exclusive, so the reaper runs in one of two explicit modes.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::session::{SessionId, SessionRegistry};

/// Default idle threshold under the expiring policy
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(30 * 60);
/// Default sweep interval
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Deployment mode of the reaper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaperPolicy {
    /// Remove sessions idle longer than `ttl`, checking every `interval`
    Expiring { ttl: Duration, interval: Duration },
    /// Keep sessions until removed explicitly; sweeps only drop lapsed
    /// re-key aliases
    Never { interval: Duration },
}

impl ReaperPolicy {
    pub fn interval(&self) -> Duration {
        match self {
            ReaperPolicy::Expiring { interval, .. } | ReaperPolicy::Never { interval } => {
                *interval
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReaperPolicy::Expiring { .. } => "expiring",
            ReaperPolicy::Never { .. } => "never",
        }
    }
}

impl Default for ReaperPolicy {
    fn default() -> Self {
        ReaperPolicy::Expiring {
            ttl: DEFAULT_IDLE_TTL,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Periodic sweeper over a [`SessionRegistry`]
pub struct Reaper {
    registry: Arc<SessionRegistry>,
    policy: ReaperPolicy,
}

impl Reaper {
    pub fn new(registry: Arc<SessionRegistry>, policy: ReaperPolicy) -> Self {
        Self { registry, policy }
    }

    pub fn policy(&self) -> ReaperPolicy {
        self.policy
    }

    /// One pass; returns the sessions it expired
    pub fn sweep(&self) -> Vec<SessionId> {
        match self.policy {
            ReaperPolicy::Expiring { ttl, .. } => {
                let expired = self.registry.expire_idle(ttl);
                if !expired.is_empty() {
                    info!(count = expired.len(), "expired idle sessions");
                }
                expired
            }
            ReaperPolicy::Never { .. } => {
                let pruned = self.registry.prune_aliases();
                if pruned > 0 {
                    debug!(pruned, "dropped lapsed re-key aliases");
                }
                Vec::new()
            }
        }
    }

    /// Sweep on a fixed interval until `shutdown` is cancelled
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.policy.interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;
            info!(policy = self.policy.name(), "reaper started");

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("reaper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.sweep();
                    }
                }
            }
        })
    }
}
