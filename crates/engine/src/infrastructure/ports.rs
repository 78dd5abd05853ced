//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. Everything else is concrete types.
//! Ports exist for:
//! - The game world (simulated in-process, or a live server connection)
//! - Event delivery to connected agents
//! - Clock (for testing)

use async_trait::async_trait;
use blockbot_domain::{BlockPos, Face, GoalShape, PathStatus, Position};
use blockbot_shared::{EventEnvelope, ItemStack};
use chrono::{DateTime, Utc};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorldError {
    #[error("No path to target: {0}")]
    NoPath(String),
    #[error("Pathfinding is not available on this bot")]
    PluginUnavailable,
    #[error("{0}")]
    ActionFailed(String),
    #[error("Not connected to the game server")]
    NotConnected,
}

// =============================================================================
// Infrastructure Types
// =============================================================================

/// How a path the world was following came to an end.
#[derive(Debug, Clone, PartialEq)]
pub enum PathCompletion {
    /// The world's pathfinder considers the goal satisfied.
    Reached,
    /// The world's pathfinder gave up.
    Failed(String),
}

/// One poll of the world's pathfinder.
#[derive(Debug, Clone, PartialEq)]
pub struct PathState {
    pub position: Position,
    pub status: PathStatus,
    /// Set once the path is over; `None` while it is still running
    pub completion: Option<PathCompletion>,
}

/// A block as the world reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    pub name: String,
    pub position: BlockPos,
}

/// Blocks that cannot be mined in survival.
pub const UNBREAKABLE_BLOCKS: &[&str] = &["bedrock", "barrier", "command_block"];

impl BlockInfo {
    pub fn new(name: impl Into<String>, position: BlockPos) -> Self {
        Self {
            name: name.into(),
            position,
        }
    }

    pub fn is_air(&self) -> bool {
        matches!(self.name.as_str(), "air" | "cave_air" | "void_air")
    }

    pub fn is_unbreakable(&self) -> bool {
        UNBREAKABLE_BLOCKS.contains(&self.name.as_str())
    }

    pub fn is_diggable(&self) -> bool {
        !self.is_air() && !self.is_unbreakable()
    }
}

/// Another player the bot can see.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSighting {
    pub username: String,
    pub position: Position,
}

/// Outcome of handing one event to the delivery layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written to this many live connections.
    Sent(usize),
    /// No agent connected; held in the backlog. `evicted` is set when an
    /// older event was dropped to make room.
    Queued { evicted: bool },
    /// Could not be written or queued.
    Dropped,
}

// =============================================================================
// Ports
// =============================================================================

/// The bot's view of the game world.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GameWorld: Send + Sync {
    async fn position(&self) -> Result<Position, WorldError>;

    /// Begin walking toward `target`. Returns once the path request is accepted.
    async fn start_pathfinding(&self, target: Position, goal: GoalShape) -> Result<(), WorldError>;

    async fn path_state(&self) -> Result<PathState, WorldError>;

    /// Abort the current path. Returns whether anything was running.
    async fn stop_pathfinding(&self) -> Result<bool, WorldError>;

    async fn block_at(&self, position: BlockPos) -> Result<BlockInfo, WorldError>;

    /// Mine the block, returning what was there.
    async fn dig(&self, position: BlockPos) -> Result<BlockInfo, WorldError>;

    /// Place a block against `reference` on `face`, returning the new block.
    async fn place_block(
        &self,
        reference: BlockPos,
        face: Face,
        item: Option<String>,
    ) -> Result<BlockInfo, WorldError>;

    /// Apply `recipe` `times` times, returning how many items were produced.
    async fn craft(&self, recipe: &str, times: u32) -> Result<u32, WorldError>;

    async fn inventory(&self) -> Result<Vec<ItemStack>, WorldError>;

    async fn chat(&self, message: &str) -> Result<(), WorldError>;

    /// Blocks whose name contains `name` within `max_distance` of the bot,
    /// nearest first, at most `count`.
    async fn find_blocks(
        &self,
        name: &str,
        max_distance: u32,
        count: u32,
    ) -> Result<Vec<BlockInfo>, WorldError>;

    /// Players currently in view, excluding the bot itself.
    async fn players(&self) -> Result<Vec<PlayerSighting>, WorldError>;
}

/// Where emitted events go.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    fn publish(&self, event: EventEnvelope) -> Delivery;
}

#[cfg_attr(test, mockall::automock)]
pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dig_rules() {
        let at = BlockPos::new(0, 10, 0);
        assert!(BlockInfo::new("stone", at).is_diggable());
        assert!(!BlockInfo::new("air", at).is_diggable());
        assert!(!BlockInfo::new("cave_air", at).is_diggable());
        assert!(BlockInfo::new("bedrock", at).is_unbreakable());
        assert!(!BlockInfo::new("command_block", at).is_diggable());
    }
}
