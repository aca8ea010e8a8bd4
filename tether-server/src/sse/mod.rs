//! Server-sent event streams
//!
//! Each stream-open request gets its own [`SseTransport`]; the session
//! registry decides whether it starts a new session or resumes one.

mod stream;
mod transport;

pub use stream::{SESSION_ID_HEADER, StreamParams, open_stream};
pub use transport::{ENDPOINT_EVENT, MESSAGE_EVENT, SseTransport};
