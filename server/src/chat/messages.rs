//! Publish endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde_json::{json, Value};

use crate::chat::ingress::{self, Dispatch};
use crate::chat::ChatMessage;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /ping
/// Liveness check.
pub async fn ping() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}

/// POST /send
/// Accept a message and relay it to every connected subscriber.
/// Zero subscribers is still a success.
pub async fn send_message(
    State(state): State<AppState>,
    body: Result<Json<ChatMessage>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(message) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    match ingress::accept(&state, message).await? {
        Dispatch::Broadcast(report) => {
            tracing::debug!(
                recipients = report.recipients,
                delivered = report.delivered,
                "Message relayed"
            );
        }
        Dispatch::Published => {}
    }

    Ok(Json(json!({ "status": "success" })))
}
