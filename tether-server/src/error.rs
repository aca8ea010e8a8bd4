//! Server error types and the client-facing error envelope

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tether_core::{DispatchError, RegistryError, codes};
use thiserror::Error;

/// Errors that can occur running the tether server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid server configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal server error
    #[error("internal error: {0}")]
    Internal(String),
}

/// `{"error": {...}}` body returned for every failed request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i32,
    pub message: String,
    pub data: ErrorData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_hint: Option<String>,
}

/// An error response: HTTP status plus envelope
#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: i32,
        message: impl Into<String>,
        session_id: Option<String>,
    ) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
                data: ErrorData {
                    session_id,
                    resume_hint: None,
                },
            },
        }
    }

    pub fn with_resume_hint(mut self, hint: impl Into<String>) -> Self {
        self.body.data.resume_hint = Some(hint.into());
        self
    }

    /// Malformed request
    pub fn bad_request(session_id: Option<String>, message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_REQUEST,
            message,
            session_id,
        )
    }

    /// No session under `session_id`
    pub fn not_found(session_id: &str, stream_url: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            codes::SESSION_NOT_FOUND,
            format!("session {session_id} not found, open a new stream"),
            Some(session_id.to_string()),
        )
        .with_resume_hint(stream_url)
    }

    pub fn internal(session_id: Option<String>, message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL_ERROR,
            message,
            session_id,
        )
    }

    /// The stream could not be set up for `session_id`
    pub fn handshake(session_id: &str, error: &RegistryError) -> Self {
        Self::internal(
            Some(session_id.to_string()),
            format!("failed to open stream: {error}"),
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: self.body.clone(),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        let status = StatusCode::from_u16(err.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let api = Self::new(
            status,
            err.code(),
            err.to_string(),
            err.session_id().map(str::to_string),
        );
        match err.resume_hint() {
            Some(hint) => api.with_resume_hint(hint),
            None => api,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(ErrorEnvelope { error: self.body })).into_response()
    }
}
