//! Stream-open endpoint

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::{Query, State};
use axum::http::HeaderValue;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::Deserialize;
use tether_core::{SessionRecord, SessionRegistry, Transport};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use super::transport::SseTransport;
use crate::{ApiError, AppState};

/// Response header carrying the session's current id
pub const SESSION_ID_HEADER: &str = "x-session-id";

#[derive(Debug, Default, Deserialize)]
pub struct StreamParams {
    /// Session to resume
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// GET /sse - open a new session or resume an existing one
pub async fn open_stream(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StreamParams>,
) -> Response {
    let (transport, events) = SseTransport::channel(&state.message_url, state.stream_buffer);
    let closed = transport.closed();
    let transport: Arc<dyn Transport> = Arc::new(transport);

    let requested = params
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());
    let opened = state.registry.open(requested, transport.clone());
    let record = opened.record;

    if let Err(e) = state.registry.handshake(&record).await {
        return ApiError::handshake(record.id().as_str(), &e).into_response();
    }
    if let Err(e) = state.registry.stream_opened(&record, &transport) {
        return ApiError::internal(Some(record.id().to_string()), e.to_string()).into_response();
    }

    let id = record.id();
    info!(session_id = %id, resumed = opened.resumed, "stream opened");

    let ended = futures::future::select(
        Box::pin(state.shutdown.clone().cancelled_owned()),
        Box::pin(closed.cancelled_owned()),
    );
    let events = ReceiverStream::new(events).take_until(ended).boxed();
    let stream = SessionStream {
        events,
        _guard: CloseGuard {
            registry: state.registry.clone(),
            record,
            transport,
        },
    };

    let mut response = Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(state.keep_alive))
        .into_response();
    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
        response.headers_mut().insert(SESSION_ID_HEADER, value);
    }
    response
}

/// Event stream of one SSE response
struct SessionStream {
    events: BoxStream<'static, Event>,
    _guard: CloseGuard,
}

impl Stream for SessionStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.as_mut().poll_next(cx).map(|event| event.map(Ok))
    }
}

/// Reports the stream closed once the response body is dropped
struct CloseGuard {
    registry: Arc<SessionRegistry>,
    record: Arc<SessionRecord>,
    transport: Arc<dyn Transport>,
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        debug!(session_id = %self.record.id(), "stream body dropped");
        self.registry.stream_closed(&self.record, &self.transport);
    }
}
