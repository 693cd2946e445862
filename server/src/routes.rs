use axum::Router;

use crate::chat::{history, messages};
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the full axum Router.
/// `/history` is only routed when a message store is configured.
pub fn build_router(state: AppState) -> Router {
    let publish_routes = Router::new()
        .route("/ping", axum::routing::get(messages::ping))
        .route("/send", axum::routing::post(messages::send_message));

    // WebSocket subscriber endpoint
    let ws_routes = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    // Health check
    let health = Router::new().route("/health", axum::routing::get(health_check));

    let mut router = Router::new()
        .merge(publish_routes)
        .merge(ws_routes)
        .merge(health);

    if state.db.is_some() {
        router = router.route("/history", axum::routing::post(history::history));
    }

    router.with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
