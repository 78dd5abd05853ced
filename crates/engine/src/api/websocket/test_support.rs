use std::{net::SocketAddr, sync::Arc, time::Duration};

use blockbot_domain::{MovementConfig, Position};
use blockbot_shared::{ClientMessage, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use super::WsState;
use crate::api::connections::AgentConnections;
use crate::app::App;
use crate::infrastructure::event_emitter::EventEmitter;
use crate::infrastructure::simulated_world::SimulatedWorld;
use crate::test_fixtures::fixed_clock;

pub(crate) type WsClient =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Fast sampling so movement tests finish in real time.
pub(crate) fn quick_movement() -> MovementConfig {
    MovementConfig {
        sample_interval: Duration::from_millis(50),
        ..MovementConfig::default()
    }
}

pub(crate) fn build_state(world: SimulatedWorld, movement: MovementConfig) -> Arc<WsState> {
    let connections = Arc::new(AgentConnections::new(64));
    let events = Arc::new(EventEmitter::new(
        "test-bot",
        connections.clone(),
        fixed_clock(),
    ));
    let app = Arc::new(App::new(Arc::new(world), events, movement));
    Arc::new(WsState { app, connections })
}

pub(crate) fn default_world() -> SimulatedWorld {
    SimulatedWorld::new(Position::new(0.5, 64.0, 0.5), 40.0).with_item("oak_log", 2)
}

pub(crate) async fn spawn_ws_server(
    state: Arc<WsState>,
) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let router = crate::api::router(state);

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (addr, handle)
}

pub(crate) async fn ws_connect(addr: SocketAddr) -> WsClient {
    let url = format!("ws://{}/ws", addr);
    let (ws, _resp) = connect_async(url).await.unwrap();
    ws
}

pub(crate) async fn ws_send_client(ws: &mut WsClient, msg: &ClientMessage) {
    let json = serde_json::to_string(msg).unwrap();
    ws.send(WsMessage::Text(json)).await.unwrap();
}

pub(crate) async fn ws_send_raw(ws: &mut WsClient, text: &str) {
    ws.send(WsMessage::Text(text.to_string())).await.unwrap();
}

pub(crate) async fn ws_recv_server(ws: &mut WsClient) -> ServerMessage {
    loop {
        let msg = ws.next().await.unwrap().unwrap();
        match msg {
            WsMessage::Text(text) => {
                return serde_json::from_str::<ServerMessage>(&text).unwrap();
            }
            WsMessage::Binary(bin) => {
                let text = String::from_utf8(bin).unwrap();
                return serde_json::from_str::<ServerMessage>(&text).unwrap();
            }
            _ => {}
        }
    }
}

pub(crate) async fn ws_expect_message<F>(
    ws: &mut WsClient,
    timeout: Duration,
    mut predicate: F,
) -> ServerMessage
where
    F: FnMut(&ServerMessage) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            let msg = ws_recv_server(ws).await;
            if predicate(&msg) {
                return msg;
            }
        }
    })
    .await
    .unwrap()
}

/// Wait for the response to command `id`, skipping events.
pub(crate) async fn ws_expect_response(
    ws: &mut WsClient,
    id: &str,
    timeout: Duration,
) -> blockbot_shared::CommandResponse {
    match ws_expect_message(ws, timeout, |m| matches!(m, ServerMessage::Response(r) if r.id == id)).await {
        ServerMessage::Response(response) => response,
        other => panic!("expected response, got {other:?}"),
    }
}
