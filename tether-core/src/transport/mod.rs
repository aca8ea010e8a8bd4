//! Transport abstraction
//!
//! Transports are interchangeable: the server ships an SSE transport, tests
//! use [`MockTransport`].

pub mod mock;
pub mod traits;

pub use mock::{AttachGate, MockTransport};
pub use traits::{Delivery, Transport};
