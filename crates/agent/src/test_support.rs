//! Scripted executor for driving the agent without a socket.

use std::sync::atomic::AtomicU8;
use std::sync::Arc;
use std::time::Duration;

use blockbot_shared::{
    event_types, ClientMessage, CommandEnvelope, CommandResponse, EventEnvelope,
    PathfindingProgress, ServerMessage,
};
use tokio::sync::mpsc;

use crate::infrastructure::messaging::connection::set_connection_state;
use crate::infrastructure::messaging::{ConnectionState, DispatcherConfig};
use crate::infrastructure::websocket::{Connection, ExecutorClient, TransportEvent};

/// The executor end of a [`fake_connection`].
pub(crate) struct FakeExecutor {
    outbound: mpsc::Receiver<ClientMessage>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
    state: Arc<AtomicU8>,
}

impl FakeExecutor {
    /// Next message the agent sent, of any kind.
    pub(crate) async fn recv(&mut self) -> ClientMessage {
        self.outbound.recv().await.expect("agent side dropped")
    }

    pub(crate) fn try_recv(&mut self) -> Option<ClientMessage> {
        self.outbound.try_recv().ok()
    }

    /// Next command, skipping cancels and heartbeats.
    pub(crate) async fn next_command(&mut self) -> CommandEnvelope {
        loop {
            if let ClientMessage::Command(command) = self.recv().await {
                return command;
            }
        }
    }

    pub(crate) fn respond(&self, response: CommandResponse) {
        self.deliver(ServerMessage::Response(response));
    }

    pub(crate) fn event(&self, event: EventEnvelope) {
        self.deliver(ServerMessage::Event(event));
    }

    pub(crate) fn progress(&self, progress: &PathfindingProgress) {
        self.event(EventEnvelope {
            event_type: event_types::PATHFINDER_PROGRESS.into(),
            timestamp: chrono::Utc::now(),
            source: "fake-bot".into(),
            event_id: uuid::Uuid::new_v4(),
            data: serde_json::to_value(progress).expect("progress serializes"),
            priority: None,
        });
    }

    /// Move the link to `state` the way the transport task would.
    pub(crate) fn set_state(&self, state: ConnectionState) {
        set_connection_state(&self.state, state);
        let _ = self.inbound.send(TransportEvent::State(state));
    }

    fn deliver(&self, message: ServerMessage) {
        let _ = self.inbound.send(TransportEvent::Message(Box::new(message)));
    }
}

/// A connected [`Connection`] whose far end is scripted by the test.
pub(crate) fn fake_connection(dispatch: DispatcherConfig) -> (Connection, FakeExecutor) {
    let state = Arc::new(AtomicU8::new(ConnectionState::Connected.to_u8()));
    let (client, outbound) = ExecutorClient::loopback(Arc::clone(&state));
    let (inbound, transport_events) = mpsc::unbounded_channel();
    let connection = Connection::with_client(client, transport_events, Arc::default(), dispatch);

    let executor = FakeExecutor {
        outbound,
        inbound,
        state,
    };
    executor.set_state(ConnectionState::Connected);
    (connection, executor)
}

/// Dispatcher settings with a short grace period.
pub(crate) fn quick_dispatch() -> DispatcherConfig {
    DispatcherConfig {
        response_grace: Duration::from_millis(200),
        ..DispatcherConfig::default()
    }
}
