use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
};

use crate::state::AppState;
use crate::ws::actor;

/// GET /ws
/// Upgrades to a subscriber connection. Failed upgrades are logged and
/// dropped; nothing is registered for them.
pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_failed_upgrade(|err| {
        tracing::warn!(error = %err, "WebSocket upgrade failed");
    })
    .on_upgrade(move |socket| actor::run_connection(socket, state))
}
