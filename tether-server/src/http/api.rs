//! REST API handlers for session diagnostics

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tether_core::SessionSummary;
use tracing::info;

use crate::{ApiError, AppState};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status of the server
    pub status: String,
    /// Server version
    pub version: String,
    /// Seconds since server started
    pub uptime_seconds: i64,
    /// Number of registered sessions
    pub sessions: usize,
    /// Reaper mode ("expiring" or "never")
    pub reaper: String,
}

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        sessions: state.registry.len(),
        reaper: state.reaper_policy.name().to_string(),
    })
}

/// Response for listing sessions
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionListResponse {
    /// Number of sessions
    pub count: usize,
    /// Sessions, oldest first
    pub sessions: Vec<SessionSummary>,
}

/// GET /api/sessions - list every registered session
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<SessionListResponse> {
    let sessions = state.registry.list();
    Json(SessionListResponse {
        count: sessions.len(),
        sessions,
    })
}

/// DELETE /api/sessions/:id - expire a session and close its stream
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.registry.remove(&id) {
        Ok(record) => {
            info!(session_id = %record.id(), "session removed via api");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(_) => ApiError::not_found(&id, &state.stream_url).into_response(),
    }
}
