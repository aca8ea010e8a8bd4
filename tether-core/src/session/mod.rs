//! Session identity, lifecycle and registry

pub mod id;
pub mod lifecycle;
pub mod record;
pub mod registry;

// Re-export key types for convenience
pub use id::{SessionId, SessionIdentity};
pub use lifecycle::{LifecycleEvent, LifecycleState};
pub use record::{SessionRecord, SessionSummary};
pub use registry::{
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_REKEY_GRACE, Opened, RegistryConfig, ResumePolicy,
    SessionRegistry,
};
