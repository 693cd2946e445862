//! Ingress adapter: turns an accepted publish into a persisted record and a
//! dispatched payload.

use crate::chat::ChatMessage;
use crate::db::{messages, run_blocking};
use crate::error::ApiError;
use crate::state::AppState;
use crate::ws::{BroadcastReport, Payload};

/// Where an accepted message went.
#[derive(Debug)]
pub enum Dispatch {
    /// Broadcast in-process to the connected subscribers.
    Broadcast(BroadcastReport),
    /// Handed to the broker; a consumer broadcasts it.
    Published,
}

/// Reject messages that cannot be relayed. The body itself is kept verbatim.
pub fn validate(message: &ChatMessage) -> Result<(), ApiError> {
    if message.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_string()));
    }
    Ok(())
}

/// Validate, persist (when a store is configured), then publish or broadcast.
///
/// The message is encoded exactly once. A store or broker failure fails the
/// request and nothing is broadcast; per-subscriber delivery failures never
/// surface here.
pub async fn accept(state: &AppState, message: ChatMessage) -> Result<Dispatch, ApiError> {
    validate(&message)?;
    let payload = Payload::encode(&message).map_err(ApiError::Encode)?;

    if let Some(db) = &state.db {
        let created_at = state.clock.now().timestamp_millis();
        let id = run_blocking(db, move |conn| messages::insert_message(conn, &message, created_at))
            .await?;
        tracing::debug!(message_id = id, "Message persisted");
    }

    if let Some(publisher) = &state.publisher {
        publisher.publish(payload.to_bytes()).await?;
        tracing::debug!("Message published to broker");
        return Ok(Dispatch::Published);
    }

    Ok(Dispatch::Broadcast(state.broadcaster.broadcast(&payload).await))
}
