//! HTTP server module

mod api;
mod message;

use std::sync::Arc;

use axum::http::{HeaderName, Method};
use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::sse::{SESSION_ID_HEADER, open_stream};
use crate::{AppState, MESSAGE_PATH, STREAM_PATH};

pub use api::{HealthResponse, SessionListResponse};
pub use message::MessageParams;

/// Create the HTTP router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(STREAM_PATH, get(open_stream))
        .route(MESSAGE_PATH, post(message::post_message))
        .route("/api/health", get(api::health))
        .route("/api/sessions", get(api::list_sessions))
        .route("/api/sessions/:id", delete(api::delete_session))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(SESSION_ID_HEADER)])
}
