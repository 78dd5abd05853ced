//! WebSocket handling for agent connections.
//!
//! Agents send commands, cancellations and heartbeats; the engine answers
//! each command with exactly one response and pushes world events.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use blockbot_shared::{ClientMessage, CommandEnvelope, ServerMessage};

use super::connections::AgentConnections;
use crate::app::App;

/// Buffer size for per-connection message channel.
const CONNECTION_CHANNEL_BUFFER: usize = 256;

/// Combined state for WebSocket handlers.
pub struct WsState {
    pub app: Arc<App>,
    pub connections: Arc<AgentConnections>,
}

/// WebSocket upgrade handler - entry point for new connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WsState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an individual WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<WsState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let connection_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(CONNECTION_CHANNEL_BUFFER);

    // Commands issued over this connection die with it.
    let session = CancellationToken::new();

    state.connections.register(connection_id, tx.clone());
    tracing::info!(connection_id = %connection_id, "Agent connected");

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!(error = %e, "Failed to serialize outbound message"),
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => handle_message(msg, &state, connection_id, &tx, &session),
                Err(e) => {
                    tracing::warn!(connection_id = %connection_id, error = %e, "Failed to parse message");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!(connection_id = %connection_id, "WebSocket closed by agent");
                break;
            }
            Err(e) => {
                tracing::error!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    state.connections.unregister(connection_id);
    session.cancel();
    send_task.abort();

    tracing::info!(connection_id = %connection_id, "Agent connection terminated");
}

/// Dispatch a parsed client message.
fn handle_message(
    msg: ClientMessage,
    state: &Arc<WsState>,
    connection_id: Uuid,
    tx: &mpsc::Sender<ServerMessage>,
    session: &CancellationToken,
) {
    match msg {
        ClientMessage::Command(envelope) => spawn_command(envelope, state, connection_id, session),
        ClientMessage::Cancel { id } => {
            if !state.app.use_cases.commands.cancel(&id) {
                tracing::debug!(connection_id = %connection_id, command_id = %id, "Cancel for unknown command");
            }
        }
        ClientMessage::Heartbeat => {
            if tx.try_send(ServerMessage::Pong).is_err() {
                tracing::warn!(connection_id = %connection_id, "Failed to send pong, channel full or closed");
            }
        }
        ClientMessage::Unknown => {
            tracing::warn!(connection_id = %connection_id, "Ignoring unknown message type");
        }
    }
}

fn spawn_command(
    envelope: CommandEnvelope,
    state: &Arc<WsState>,
    connection_id: Uuid,
    session: &CancellationToken,
) {
    let state = state.clone();
    let session = session.clone();
    tokio::spawn(async move {
        let response = state.app.use_cases.commands.execute(envelope, &session).await;
        state.connections.respond(connection_id, response).await;
    });
}

#[cfg(test)]
pub(crate) mod test_support;
