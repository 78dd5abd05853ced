//! Shared helpers for engine tests.

use std::sync::{Arc, Mutex};

use blockbot_shared::{EventEnvelope, PathfindingProgress};
use chrono::TimeZone;

use crate::infrastructure::clock::FixedClock;
use crate::infrastructure::event_emitter::EventEmitter;
use crate::infrastructure::ports::{ClockPort, Delivery, EventSink};

/// Sink that records every event it is handed.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<EventEnvelope>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<EventEnvelope> {
        self.events.lock().unwrap().clone()
    }

    pub fn of_type(&self, event_type: &str) -> Vec<EventEnvelope> {
        self.events()
            .into_iter()
            .filter(|e| e.is(event_type))
            .collect()
    }

    pub fn progress(&self) -> Vec<PathfindingProgress> {
        self.events().iter().filter_map(EventEnvelope::progress).collect()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: EventEnvelope) -> Delivery {
        self.events.lock().unwrap().push(event);
        Delivery::Sent(1)
    }
}

pub fn fixed_clock() -> Arc<dyn ClockPort> {
    Arc::new(FixedClock(
        chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    ))
}

/// An emitter wired to a fresh recording sink.
pub fn recording_emitter() -> (Arc<EventEmitter>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let emitter = Arc::new(EventEmitter::new("test-bot", sink.clone(), fixed_clock()));
    (emitter, sink)
}
