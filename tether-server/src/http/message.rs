//! Out-of-band message endpoint

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::Value;
use tether_core::Delivery;

use crate::{ApiError, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct MessageParams {
    /// Session the message is addressed to
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// POST /message?sessionId=... - deliver a message onto a session's stream
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MessageParams>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            return ApiError::bad_request(params.session_id, rejection.body_text())
                .into_response();
        }
    };

    match state
        .dispatcher
        .dispatch(params.session_id.as_deref(), payload)
        .await
    {
        Ok(delivery) => delivery_response(delivery),
        Err(e) => ApiError::from(e).into_response(),
    }
}

fn delivery_response(delivery: Delivery) -> Response {
    let status = StatusCode::from_u16(delivery.status).unwrap_or(StatusCode::ACCEPTED);
    match delivery.body {
        Some(body) => (status, Json(body)).into_response(),
        None => (status, "Accepted").into_response(),
    }
}
