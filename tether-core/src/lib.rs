//! tether-core: session registry and resumption protocol
//!
//! This crate keeps long-lived streaming sessions addressable while the
//! stream underneath them comes and goes:
//!
//! - **Registry** - [`SessionRegistry`] creates, resolves, re-keys, resumes
//!   and expires [`SessionRecord`]s
//! - **Lifecycle** - [`LifecycleState`] transitions enforced on every record
//! - **Dispatch** - [`RequestDispatcher`] routes out-of-band messages to the
//!   session's [`Transport`]
//! - **Reaper** - [`Reaper`] sweeps idle sessions under an explicit
//!   [`ReaperPolicy`]
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tether_core::{MockTransport, RequestDispatcher, SessionRegistry, Transport};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(SessionRegistry::default());
//!     let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
//!
//!     // Provisional id resolves right away, before the handshake
//!     let record = registry.create(None, transport.clone());
//!     registry.handshake(&record).await?;
//!     registry.stream_opened(&record, &transport)?;
//!
//!     let dispatcher = RequestDispatcher::new(registry, "/sse");
//!     dispatcher
//!         .dispatch(Some(record.id().as_str()), serde_json::json!({"ping": 1}))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod dispatch;
pub mod error;
pub mod reaper;
pub mod session;
pub mod transport;

// Re-export key types for convenience
pub use dispatch::RequestDispatcher;
pub use error::{
    DispatchError, LifecycleError, RegistryError, SendError, TransportError, codes,
};
pub use reaper::{DEFAULT_IDLE_TTL, DEFAULT_SWEEP_INTERVAL, Reaper, ReaperPolicy};
pub use session::{
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_REKEY_GRACE, LifecycleEvent, LifecycleState, Opened,
    RegistryConfig, ResumePolicy, SessionId, SessionRecord, SessionRegistry, SessionSummary,
};
pub use transport::{AttachGate, Delivery, MockTransport, Transport};
