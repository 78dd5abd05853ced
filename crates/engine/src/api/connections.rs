//! Connection management for agent WebSocket clients.
//!
//! Tracks connected agents and fans events out to them. While no agent is
//! connected, outbound messages are held in a bounded backlog that is flushed
//! to the next agent to connect.

use std::sync::{Mutex, MutexGuard};

use blockbot_shared::{CommandResponse, EventEnvelope, OutboundClass, OutboundQueue, ServerMessage};
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::infrastructure::ports::{Delivery, EventSink};

/// Manages all active agent connections.
pub struct AgentConnections {
    agents: DashMap<Uuid, mpsc::Sender<ServerMessage>>,
    /// Guards both the backlog and the empty/non-empty transition of
    /// `agents`, so nothing is queued after a flush.
    backlog: Mutex<OutboundQueue<ServerMessage>>,
}

impl AgentConnections {
    pub fn new(backlog_capacity: usize) -> Self {
        Self {
            agents: DashMap::new(),
            backlog: Mutex::new(OutboundQueue::new(backlog_capacity)),
        }
    }

    /// Register a new connection and hand it everything queued so far.
    pub fn register(&self, connection_id: Uuid, sender: mpsc::Sender<ServerMessage>) {
        let mut backlog = self.lock_backlog();
        let queued = backlog.drain();
        if !queued.is_empty() {
            tracing::info!(connection_id = %connection_id, count = queued.len(), "Flushing backlog to agent");
        }
        for message in queued {
            if let Err(e) = sender.try_send(message) {
                tracing::warn!(connection_id = %connection_id, error = %e, "Failed to flush queued message");
            }
        }
        self.agents.insert(connection_id, sender);
        tracing::debug!(connection_id = %connection_id, "Connection registered");
    }

    /// Unregister a connection.
    pub fn unregister(&self, connection_id: Uuid) {
        let _backlog = self.lock_backlog();
        if self.agents.remove(&connection_id).is_some() {
            tracing::debug!(connection_id = %connection_id, "Connection unregistered");
        }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Messages currently held for the next agent.
    pub fn backlog_len(&self) -> usize {
        self.lock_backlog().len()
    }

    /// Send a command response to the connection that issued the command.
    ///
    /// Waits for room in a full channel rather than dropping the reply. If
    /// that connection is gone the response is queued like any other
    /// outbound command.
    pub async fn respond(&self, connection_id: Uuid, response: CommandResponse) {
        let message = ServerMessage::Response(response);
        let sender = self.agents.get(&connection_id).map(|s| s.value().clone());
        let message = match sender {
            Some(sender) => match sender.send(message).await {
                Ok(()) => return,
                Err(mpsc::error::SendError(message)) => message,
            },
            None => message,
        };
        self.enqueue_response(message);
    }

    /// Send a message to one connection only.
    pub fn send_to(&self, connection_id: Uuid, message: ServerMessage) -> bool {
        match self.agents.get(&connection_id) {
            Some(sender) => sender.try_send(message).is_ok(),
            None => false,
        }
    }

    fn enqueue_response(&self, message: ServerMessage) {
        let mut backlog = self.lock_backlog();
        if let Some((OutboundClass::Command, _)) = backlog.push(message, OutboundClass::Command) {
            tracing::warn!("Backlog full of responses, oldest response evicted");
        }
    }

    fn lock_backlog(&self) -> MutexGuard<'_, OutboundQueue<ServerMessage>> {
        self.backlog.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventSink for AgentConnections {
    fn publish(&self, event: EventEnvelope) -> Delivery {
        let mut backlog = self.lock_backlog();
        if self.agents.is_empty() {
            let event_id = event.event_id;
            return match backlog.push(ServerMessage::Event(event), OutboundClass::Event) {
                None => Delivery::Queued { evicted: false },
                Some((_, ServerMessage::Event(evicted))) if evicted.event_id == event_id => {
                    Delivery::Dropped
                }
                Some(_) => Delivery::Queued { evicted: true },
            };
        }
        drop(backlog);

        let mut sent = 0;
        for entry in self.agents.iter() {
            match entry.value().try_send(ServerMessage::Event(event.clone())) {
                Ok(()) => sent += 1,
                Err(e) => tracing::warn!(
                    connection_id = %entry.key(),
                    event_type = %event.event_type,
                    error = %e,
                    "Failed to deliver event"
                ),
            }
        }
        if sent == 0 {
            Delivery::Dropped
        } else {
            Delivery::Sent(sent)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::event_emitter::{EventEmitter, EventPayload};
    use crate::test_fixtures::fixed_clock;
    use blockbot_shared::{event_types, ErrorCode};
    use std::sync::Arc;

    fn emitter(connections: &Arc<AgentConnections>) -> EventEmitter {
        EventEmitter::new("bot", connections.clone(), fixed_clock())
    }

    #[tokio::test]
    async fn events_reach_every_agent() {
        let connections = Arc::new(AgentConnections::new(8));
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        connections.register(Uuid::new_v4(), tx_a);
        connections.register(Uuid::new_v4(), tx_b);

        emitter(&connections).emit(event_types::HEALTH, EventPayload::new().field("health", &20), None);

        assert!(matches!(rx_a.recv().await, Some(ServerMessage::Event(e)) if e.is(event_types::HEALTH)));
        assert!(matches!(rx_b.recv().await, Some(ServerMessage::Event(_))));
    }

    #[tokio::test]
    async fn backlog_is_flushed_in_order_to_next_agent() {
        let connections = Arc::new(AgentConnections::new(8));
        let events = emitter(&connections);
        events.emit(event_types::SPAWN, EventPayload::new(), None);
        events.emit(event_types::HEALTH, EventPayload::new(), None);
        assert_eq!(connections.backlog_len(), 2);

        let (tx, mut rx) = mpsc::channel(8);
        connections.register(Uuid::new_v4(), tx);
        assert_eq!(connections.backlog_len(), 0);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(first, ServerMessage::Event(e) if e.is(event_types::SPAWN)));
        assert!(matches!(second, ServerMessage::Event(e) if e.is(event_types::HEALTH)));
    }

    #[tokio::test]
    async fn full_backlog_drops_events_before_responses() {
        let connections = Arc::new(AgentConnections::new(2));
        let gone = Uuid::new_v4();
        connections
            .respond(gone, CommandResponse::failure("c-1", ErrorCode::Timeout, "late"))
            .await;
        connections
            .respond(gone, CommandResponse::failure("c-2", ErrorCode::Timeout, "late"))
            .await;

        let events = emitter(&connections);
        events.emit(event_types::POSITION, EventPayload::new(), None);
        assert_eq!(connections.backlog_len(), 2);
        assert_eq!(events.stats().dropped, 1);
    }

    #[test]
    fn oldest_event_is_evicted_for_a_new_one() {
        let connections = Arc::new(AgentConnections::new(2));
        let events = emitter(&connections);
        for _ in 0..3 {
            events.emit(event_types::POSITION, EventPayload::new(), None);
        }
        assert_eq!(connections.backlog_len(), 2);
        assert_eq!(events.stats().dropped, 1);
    }

    #[tokio::test]
    async fn response_to_live_connection_is_sent_directly() {
        let connections = AgentConnections::new(4);
        let id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(4);
        connections.register(id, tx);

        connections
            .respond(id, CommandResponse::failure("c-9", ErrorCode::Busy, "busy"))
            .await;
        assert!(matches!(rx.try_recv(), Ok(ServerMessage::Response(r)) if r.id == "c-9"));
        assert_eq!(connections.backlog_len(), 0);

        connections.unregister(id);
        assert!(connections.is_empty());
    }

    #[tokio::test]
    async fn event_burst_cannot_crowd_out_a_response() {
        let connections = Arc::new(AgentConnections::new(4));
        let id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(2);
        connections.register(id, tx);

        let events = emitter(&connections);
        for _ in 0..3 {
            events.emit(event_types::POSITION, EventPayload::new(), None);
        }

        let reply = {
            let connections = connections.clone();
            tokio::spawn(async move {
                connections
                    .respond(id, CommandResponse::success("c-10", &serde_json::json!({})))
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert!(!reply.is_finished());

        assert!(matches!(rx.recv().await, Some(ServerMessage::Event(_))));
        assert!(matches!(rx.recv().await, Some(ServerMessage::Event(_))));
        reply.await.unwrap();
        assert!(matches!(rx.recv().await, Some(ServerMessage::Response(r)) if r.id == "c-10"));
    }
}
