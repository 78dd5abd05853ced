//! Blockbot Shared - Wire protocol shared by the Engine and the Agent
//!
//! This crate contains the types both processes agree on:
//! - WebSocket message types (`ClientMessage`, `ServerMessage`)
//! - The closed set of actions with typed arguments and results
//! - Command responses and error classification
//! - Event envelopes and the pathfinding progress payload
//! - The bounded outbound backlog used while a peer is unreachable
//!
//! # Design Principles
//!
//! 1. **No I/O** - pure data types and serialization
//! 2. **Closed action set** - method strings are checked once, in `ActionRequest::parse`
//! 3. **Forward compatible** - unknown message types and error codes deserialize to `Unknown`

pub mod actions;
pub mod events;
pub mod messages;
pub mod outbound;
pub mod responses;

// =============================================================================
// WebSocket Message Types
// =============================================================================
pub use messages::{ClientMessage, CommandEnvelope, ServerMessage};

// =============================================================================
// Actions
// =============================================================================
pub use actions::{
    methods, ActionRequest, BlockArgs, BlockResult, ChatArgs, ChatResult, CraftArgs,
    CraftResult, DigResult, FindBlocksArgs, FindBlocksResult, GotoArgs, GotoResult,
    InventoryResult, ItemStack, NearbyPlayer, NearbyPlayersArgs, NearbyPlayersResult, PlaceArgs,
    PlaceResult, PositionResult, StopResult, GOTO_COMPLETED, MAX_CHAT_LENGTH, MAX_CRAFT_COUNT,
    MAX_SEARCH_DISTANCE,
};

// =============================================================================
// Responses and Events
// =============================================================================
pub use events::{event_types, EventEnvelope, EventPriority, PathfindingProgress};
pub use outbound::{OutboundClass, OutboundQueue};
pub use responses::{CommandError, CommandResponse, ErrorCode};
