//! Event Bus for world-state events pushed by the executor.
//!
//! Backed by a broadcast channel: a slow subscriber lags and loses the
//! oldest events rather than blocking the transport.

use blockbot_shared::EventEnvelope;
use tokio::sync::broadcast;

pub const DEFAULT_EVENT_BUS_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Deliver to current subscribers. Returns how many received it.
    pub fn publish(&self, event: EventEnvelope) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUS_CAPACITY)
    }
}
