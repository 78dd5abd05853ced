//! API layer - HTTP and WebSocket entry points.

use std::sync::Arc;

use axum::{routing::get, Router};

pub mod connections;
pub mod http;
pub mod websocket;

pub use connections::AgentConnections;
pub use websocket::WsState;

/// Full router: health endpoints plus the agent WebSocket.
pub fn router(state: Arc<WsState>) -> Router {
    http::routes()
        .route("/ws", get(websocket::ws_handler))
        .with_state(state)
}
