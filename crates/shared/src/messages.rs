//! WebSocket message types for Engine-Agent communication
//!
//! The agent sends [`ClientMessage`] and receives [`ServerMessage`]; the engine
//! does the reverse. Both are JSON objects tagged by `type`.
//!
//! ## Versioning Policy
//!
//! - New variants can be added at the end (forward compatible)
//! - Renaming variants is a breaking change
//! - Unknown message types deserialize to `Unknown` for forward compatibility

use serde::{Deserialize, Serialize};

use crate::actions::ActionRequest;
use crate::events::EventEnvelope;
use crate::responses::CommandResponse;

// =============================================================================
// Client Messages (Agent → Engine)
// =============================================================================

/// Messages from the command-issuing agent to the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Perform one action; answered by exactly one `response`
    Command(CommandEnvelope),
    /// Abort the in-flight command with this id (best effort, no reply)
    Cancel { id: String },
    /// Heartbeat ping
    Heartbeat,
    /// Unknown message type for forward compatibility
    #[serde(other)]
    Unknown,
}

/// A correlated request: `{ id, method, args, timeoutMs? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnvelope {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl CommandEnvelope {
    /// Build an envelope for a typed action.
    pub fn new(id: impl Into<String>, request: &ActionRequest, timeout_ms: Option<u64>) -> Self {
        Self {
            id: id.into(),
            method: request.method().to_string(),
            args: request.args(),
            timeout_ms,
        }
    }
}

// =============================================================================
// Server Messages (Engine → Agent)
// =============================================================================

/// Messages from the executor to the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Terminal result of a command
    Response(CommandResponse),
    /// Uncorrelated world-state notification
    Event(EventEnvelope),
    /// Heartbeat reply
    Pong,
    /// Unknown message type for forward compatibility
    #[serde(other)]
    Unknown,
}
