//! HTTP routes.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use super::websocket::WsState;
use crate::infrastructure::event_emitter::EmitterStats;

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<WsState>> {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Health {
    status: &'static str,
    bot: String,
    connections: usize,
    backlog: usize,
    in_flight: usize,
    active_movement: Option<String>,
    events: EmitterStats,
}

async fn health(State(state): State<Arc<WsState>>) -> Json<Health> {
    let app = &state.app;
    Json(Health {
        status: "ok",
        bot: app.events.source().to_string(),
        connections: state.connections.len(),
        backlog: state.connections.backlog_len(),
        in_flight: app.use_cases.commands.in_flight(),
        active_movement: app.use_cases.pathfinder.active_operation(),
        events: app.events.stats(),
    })
}
