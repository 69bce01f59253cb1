//! Axum router setup

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use crate::{
    ServerState,
    handlers::{
        create_share, get_diff, get_share, get_state, get_workspace, health_check, put_workspace,
        save_workspace,
    },
    websocket::ws_handler,
};

/// Create the axum router with all routes
pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        // WebSocket endpoint for events and effects
        .route("/ws", get(ws_handler))
        // REST API endpoints
        .route("/api/health", get(health_check))
        .route("/api/state", get(get_state))
        .route("/api/diff", get(get_diff))
        .route("/api/workspace/:side", get(get_workspace).put(put_workspace))
        .route("/api/share", post(create_share))
        .route("/api/share/:key", get(get_share))
        .route("/api/save/:side", post(save_workspace))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
