//! Event emission.
//!
//! Each bot instance owns one [`EventEmitter`], injected wherever events are
//! raised. Payloads are assembled field by field so that one value that fails
//! to serialize degrades to a string instead of losing the whole event.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use blockbot_shared::{EventEnvelope, EventPriority};
use serde::Serialize;
use uuid::Uuid;

use super::ports::{ClockPort, Delivery, EventSink};

/// Nesting depth past which a value is flattened to its JSON text.
const MAX_DEPTH: usize = 16;

// =============================================================================
// Payload
// =============================================================================

/// Builder for an event's `data` object.
#[derive(Debug, Default)]
pub struct EventPayload {
    fields: serde_json::Map<String, serde_json::Value>,
    sanitized: u64,
    errors: u64,
}

impl EventPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one field. Values that cannot be serialized are stored as their
    /// debug representation.
    pub fn field<T: Serialize + Debug + ?Sized>(mut self, key: &str, value: &T) -> Self {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(field = key, error = %e, "Event field not serializable, using string fallback");
                self.errors += 1;
                self.sanitized += 1;
                serde_json::Value::String(format!("{value:?}"))
            }
        };
        let value = self.limit_depth(value, 0);
        self.fields.insert(key.to_string(), value);
        self
    }

    /// Spread a serializable struct into top-level fields.
    pub fn from_struct<T: Serialize + Debug>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(serde_json::Value::Object(map)) => {
                let mut payload = Self::new();
                for (key, value) in map {
                    let value = payload.limit_depth(value, 0);
                    payload.fields.insert(key, value);
                }
                payload
            }
            Ok(other) => Self::new().field("value", &other),
            Err(_) => Self::new().field("value", value),
        }
    }

    fn limit_depth(&mut self, value: serde_json::Value, depth: usize) -> serde_json::Value {
        use serde_json::Value;
        if depth >= MAX_DEPTH && matches!(value, Value::Array(_) | Value::Object(_)) {
            self.sanitized += 1;
            return Value::String(value.to_string());
        }
        match value {
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|v| self.limit_depth(v, depth + 1))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| {
                        let v = self.limit_depth(v, depth + 1);
                        (k, v)
                    })
                    .collect(),
            ),
            other => other,
        }
    }
}

// =============================================================================
// Stats
// =============================================================================

/// Snapshot of emitter counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EmitterStats {
    pub emitted: u64,
    pub sanitized: u64,
    pub errors: u64,
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    emitted: AtomicU64,
    sanitized: AtomicU64,
    errors: AtomicU64,
    dropped: AtomicU64,
}

// =============================================================================
// Emitter
// =============================================================================

pub struct EventEmitter {
    source: String,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn ClockPort>,
    counters: Counters,
}

impl EventEmitter {
    pub fn new(source: impl Into<String>, sink: Arc<dyn EventSink>, clock: Arc<dyn ClockPort>) -> Self {
        Self {
            source: source.into(),
            sink,
            clock,
            counters: Counters::default(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Build an envelope, hand it to the sink, and return it.
    ///
    /// Never fails: delivery problems are counted and logged.
    pub fn emit(
        &self,
        event_type: &str,
        payload: EventPayload,
        priority: Option<EventPriority>,
    ) -> EventEnvelope {
        if payload.sanitized > 0 {
            self.counters
                .sanitized
                .fetch_add(payload.sanitized, Ordering::Relaxed);
        }
        if payload.errors > 0 {
            self.counters.errors.fetch_add(payload.errors, Ordering::Relaxed);
        }

        let envelope = EventEnvelope {
            event_type: event_type.to_string(),
            timestamp: self.clock.now(),
            source: self.source.clone(),
            event_id: Uuid::new_v4(),
            data: serde_json::Value::Object(payload.fields),
            priority,
        };

        match self.sink.publish(envelope.clone()) {
            Delivery::Sent(_) => {}
            Delivery::Queued { evicted } => {
                if evicted {
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            Delivery::Dropped => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(event_type, "Event dropped");
            }
        }
        self.counters.emitted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(event_type, event_id = %envelope.event_id, "Event emitted");

        envelope
    }

    pub fn stats(&self) -> EmitterStats {
        EmitterStats {
            emitted: self.counters.emitted.load(Ordering::Relaxed),
            sanitized: self.counters.sanitized.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}
