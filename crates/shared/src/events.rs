//! World-state event envelopes
//!
//! Events are fire-and-forget: no acknowledgment, no ordering. `event_id` is
//! for dedup and logging only and never correlates with a command.

use blockbot_domain::{PathStatus, Position};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type names emitted by the executor.
pub mod event_types {
    pub const SPAWN: &str = "minecraft:spawn";
    pub const CHAT: &str = "minecraft:chat";
    pub const PLAYER_JOINED: &str = "minecraft:player_joined";
    pub const POSITION: &str = "minecraft:position";
    pub const HEALTH: &str = "minecraft:health";
    pub const BLOCK_UPDATE: &str = "minecraft:block_update";
    pub const INVENTORY_CHANGE: &str = "minecraft:inventory_change";
    pub const PATHFINDER_PROGRESS: &str = "pathfinder:progress";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventPriority {
    Low,
    #[default]
    Normal,
    High,
}

/// `{ eventType, timestamp, source, eventId, data, priority? }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub event_id: Uuid,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<EventPriority>,
}

impl EventEnvelope {
    pub fn is(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }

    /// Decode a progress notification, if this is one.
    pub fn progress(&self) -> Option<PathfindingProgress> {
        if !self.is(event_types::PATHFINDER_PROGRESS) {
            return None;
        }
        serde_json::from_value(self.data.clone()).ok()
    }
}

/// Payload of a `pathfinder:progress` event.
///
/// Correlated with its movement by `target`, not by command id; `operation_id`
/// is informational.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathfindingProgress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    pub target: Position,
    pub current_position: Position,
    pub distance_remaining: f64,
    pub path_status: PathStatus,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub progress_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_remaining_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status_message: String,
}

impl PathfindingProgress {
    /// True when this notification belongs to a movement toward `target`.
    pub fn targets(&self, target: &Position) -> bool {
        self.target.same_block(target)
    }
}
