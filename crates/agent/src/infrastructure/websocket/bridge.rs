//! WebSocket Bridge - connects the dispatcher and event bus to the transport.
//!
//! The bridge task is the only consumer of transport events. It resolves
//! waiters from responses, publishes events, and fails every pending waiter
//! whenever the link leaves `Connected` so no caller waits out its full
//! timeout on a dead socket.

use std::sync::Arc;
use std::time::Duration;

use blockbot_shared::{ClientMessage, ServerMessage};
use tokio::sync::{mpsc, watch};

use super::client::ExecutorClient;
use super::core::{lock_pending, SharedPending};
use super::shared::{TransportConfig, TransportError, TransportEvent};
use crate::infrastructure::messaging::event_bus::DEFAULT_EVENT_BUS_CAPACITY;
use crate::infrastructure::messaging::{
    CommandDispatcher, ConnectionState, DispatchError, DispatcherConfig, EventBus,
};

/// Everything needed to talk to one executor.
pub struct Connection {
    dispatcher: CommandDispatcher,
    events: EventBus,
    client: ExecutorClient,
    state_rx: watch::Receiver<ConnectionState>,
}

impl Connection {
    /// Start the transport and the bridge task.
    pub fn open(transport: TransportConfig, dispatch: DispatcherConfig) -> Self {
        let pending: SharedPending = Arc::default();
        let (client, transport_events) = ExecutorClient::spawn(transport, Arc::clone(&pending));
        Self::with_client(client, transport_events, pending, dispatch)
    }

    pub(crate) fn with_client(
        client: ExecutorClient,
        transport_events: mpsc::UnboundedReceiver<TransportEvent>,
        pending: SharedPending,
        dispatch: DispatcherConfig,
    ) -> Self {
        let events = EventBus::new(DEFAULT_EVENT_BUS_CAPACITY);
        let (state_tx, state_rx) = watch::channel(client.state());

        tokio::spawn(bridge_task(
            transport_events,
            Arc::clone(&pending),
            events.clone(),
            state_tx,
        ));

        Self {
            dispatcher: CommandDispatcher::new(client.clone(), pending, dispatch),
            events,
            client,
            state_rx,
        }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn state(&self) -> ConnectionState {
        self.client.state()
    }

    /// Wait for the first successful connection.
    pub async fn wait_until_connected(&self, timeout: Duration) -> Result<(), TransportError> {
        let mut state_rx = self.state_rx.clone();
        let settled = tokio::time::timeout(
            timeout,
            state_rx.wait_for(|state| *state == ConnectionState::Connected || state.is_terminal()),
        )
        .await;

        match settled {
            Ok(Ok(state)) => match *state {
                ConnectionState::Connected => Ok(()),
                ConnectionState::Failed => Err(TransportError::Failed),
                _ => Err(TransportError::Closed),
            },
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::NotConnected),
        }
    }

    /// Close the link. Pending commands fail with a transport error.
    pub fn shutdown(&self) {
        self.client.shutdown();
    }
}

async fn bridge_task(
    mut transport: mpsc::UnboundedReceiver<TransportEvent>,
    pending: SharedPending,
    events: EventBus,
    state_tx: watch::Sender<ConnectionState>,
) {
    let mut previous = *state_tx.borrow();

    while let Some(event) = transport.recv().await {
        match event {
            TransportEvent::State(state) => {
                let error = match state {
                    ConnectionState::Failed => Some(DispatchError::Transport(TransportError::Failed)),
                    ConnectionState::Disconnected => {
                        Some(DispatchError::Transport(TransportError::Closed))
                    }
                    _ if previous == ConnectionState::Connected && state != previous => {
                        Some(DispatchError::Disconnected)
                    }
                    _ => None,
                };
                if let Some(error) = error {
                    let failed = lock_pending(&pending).fail_all(|| error.clone());
                    if failed > 0 {
                        tracing::warn!(failed, %state, "Failed pending commands on connection loss");
                    }
                }
                previous = state;
                state_tx.send_replace(state);
            }
            TransportEvent::Message(message) => route(*message, &pending, &events),
            TransportEvent::Evicted(ClientMessage::Command(envelope)) => {
                let id = envelope.id;
                if lock_pending(&pending).fail(&id, DispatchError::Evicted(id.clone())) {
                    tracing::warn!(command_id = %id, "Command evicted from outbound backlog");
                }
            }
            TransportEvent::Evicted(other) => {
                tracing::debug!(message = ?other, "Queued message evicted from outbound backlog");
            }
        }
    }

    lock_pending(&pending).fail_all(|| DispatchError::Transport(TransportError::Closed));
}

fn route(message: ServerMessage, pending: &SharedPending, events: &EventBus) {
    match message {
        ServerMessage::Response(response) => {
            let id = response.id.clone();
            if !lock_pending(pending).resolve(response) {
                tracing::debug!(command_id = %id, "Discarding response with no waiter");
            }
        }
        ServerMessage::Event(event) => {
            tracing::trace!(event_type = %event.event_type, "Event received");
            events.publish(event);
        }
        ServerMessage::Pong => tracing::trace!("Heartbeat acknowledged"),
        ServerMessage::Unknown => tracing::debug!("Ignoring unknown message type from executor"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::messaging::Command;
    use crate::infrastructure::websocket::ReconnectPolicy;
    use crate::test_support::quick_dispatch;
    use blockbot_shared::{
        ActionRequest, CommandResponse, InventoryResult, ItemStack, ServerMessage,
    };
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;
    use url::Url;

    const WAIT: Duration = Duration::from_secs(5);

    fn transport(port: u16, max_attempts: u32) -> TransportConfig {
        let url = Url::parse(&format!("ws://127.0.0.1:{port}/ws")).unwrap();
        TransportConfig {
            reconnect: ReconnectPolicy {
                initial_delay: Duration::from_millis(20),
                max_delay: Duration::from_millis(100),
                max_attempts,
                jitter: 0.0,
                ..ReconnectPolicy::default()
            },
            ..TransportConfig::new(url)
        }
    }

    fn inventory_reply(id: &str) -> String {
        let result = InventoryResult::from_items(vec![ItemStack {
            name: "stick".into(),
            count: 4,
        }]);
        serde_json::to_string(&ServerMessage::Response(CommandResponse::success(id, &result)))
            .unwrap()
    }

    /// Read client frames until a command arrives.
    async fn next_command<S>(ws: &mut S) -> String
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let frame = ws.next().await.unwrap().unwrap();
            if let Message::Text(text) = frame {
                if let Ok(ClientMessage::Command(command)) = serde_json::from_str(&text) {
                    return command.id;
                }
            }
        }
    }

    #[tokio::test]
    async fn reconnect_fails_the_stranded_waiter_then_serves_new_commands() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Executor that drops the first connection mid-command and answers
        // normally on the second.
        let executor = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            next_command(&mut ws).await;
            drop(ws);

            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            loop {
                let id = next_command(&mut ws).await;
                ws.send(Message::Text(inventory_reply(&id))).await.unwrap();
            }
        });

        let connection = Connection::open(transport(port, 5), quick_dispatch());
        connection.wait_until_connected(WAIT).await.unwrap();

        let stranded = connection
            .dispatcher()
            .send(Command::new(ActionRequest::Inventory).with_timeout_ms(30_000))
            .await;
        assert_eq!(stranded.unwrap_err(), DispatchError::Disconnected);

        let inventory: InventoryResult = tokio::time::timeout(
            WAIT,
            connection.dispatcher().call(ActionRequest::Inventory),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(inventory.count_of("stick"), 4);
        assert_eq!(connection.state(), ConnectionState::Connected);

        connection.shutdown();
        executor.abort();
    }

    #[tokio::test]
    async fn exhausted_reconnects_fail_every_later_send_immediately() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let connection = Connection::open(transport(port, 2), quick_dispatch());
        let err = connection.wait_until_connected(WAIT).await.unwrap_err();
        assert_eq!(err, TransportError::Failed);
        assert_eq!(connection.state(), ConnectionState::Failed);

        let started = tokio::time::Instant::now();
        let err = connection
            .dispatcher()
            .send(Command::new(ActionRequest::Position))
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::Transport(TransportError::Failed));
        assert!(started.elapsed() < Duration::from_millis(100));
    }
}
