//! POST /history: paged reads from the durable message log.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Deserialize;

use crate::chat::ChatMessage;
use crate::db::{messages, run_blocking};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequest {
    /// Empty: newest page. Otherwise: messages strictly older than this.
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub user_id: String,
}

/// POST /history
/// Returns at most `history_page_size` messages, newest first.
pub async fn history(
    State(state): State<AppState>,
    body: Result<Json<HistoryRequest>, JsonRejection>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let Json(request) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let Some(db) = state.db.as_ref() else {
        return Err(ApiError::BadRequest("message history is not enabled".to_string()));
    };
    let limit = state.history_page_size;

    let rows = run_blocking(db, move |conn| {
        if request.time.is_empty() {
            messages::recent_messages(conn, limit)
        } else {
            messages::messages_before(conn, &request.time, &request.user_id, limit)
        }
    })
    .await?;

    Ok(Json(rows.into_iter().map(|row| row.message).collect()))
}
