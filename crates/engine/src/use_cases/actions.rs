//! Action handlers for the non-movement commands.
//!
//! Each handler validates against the world before acting, performs the
//! action, and publishes the world events the action caused.

use std::sync::Arc;

use blockbot_domain::{BlockPos, Position};
use blockbot_shared::{
    event_types, BlockArgs, BlockResult, ChatArgs, ChatResult, CommandError, CraftArgs,
    CraftResult, DigResult, ErrorCode, FindBlocksArgs, FindBlocksResult, InventoryResult,
    NearbyPlayer, NearbyPlayersArgs, NearbyPlayersResult, PlaceArgs, PlaceResult,
};

use crate::infrastructure::event_emitter::{EventEmitter, EventPayload};
use crate::infrastructure::ports::{GameWorld, WorldError};

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error(transparent)]
    Rejected(#[from] CommandError),
    #[error(transparent)]
    World(#[from] WorldError),
}

impl ActionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ActionError::Rejected(e) => e.code,
            ActionError::World(WorldError::PluginUnavailable) => ErrorCode::PluginUnavailable,
            ActionError::World(WorldError::NoPath(_)) => ErrorCode::NoPath,
            ActionError::World(WorldError::ActionFailed(_)) => ErrorCode::ActionFailed,
            ActionError::World(WorldError::NotConnected) => ErrorCode::Internal,
        }
    }
}

pub struct ActionHandlers {
    world: Arc<dyn GameWorld>,
    events: Arc<EventEmitter>,
}

impl ActionHandlers {
    pub fn new(world: Arc<dyn GameWorld>, events: Arc<EventEmitter>) -> Self {
        Self { world, events }
    }

    pub async fn dig(&self, args: &BlockArgs) -> Result<DigResult, ActionError> {
        let position = args.position();
        let block = self.world.block_at(position).await?;
        if block.is_air() {
            return Err(CommandError::new(
                ErrorCode::ActionFailed,
                "No block to dig at this position - it's already air",
            )
            .into());
        }
        if block.is_unbreakable() {
            return Err(CommandError::new(
                ErrorCode::ActionFailed,
                format!("Cannot dig {} - it's unbreakable", block.name),
            )
            .into());
        }

        tracing::info!(block = %block.name, %position, "Digging block");
        let dug = self.world.dig(position).await?;

        self.block_changed(position, &dug.name, "air");
        self.inventory_changed("dig").await;
        Ok(DigResult {
            block: dug.name,
            position,
        })
    }

    pub async fn place(&self, args: &PlaceArgs) -> Result<PlaceResult, ActionError> {
        let reference = args.position();
        let target = reference.offset(args.face);
        target
            .validate_bounds()
            .map_err(|e| CommandError::invalid_argument(e.to_string()))?;

        tracing::info!(%reference, face = ?args.face, item = ?args.block, "Placing block");
        let placed = self
            .world
            .place_block(reference, args.face, args.block.clone())
            .await?;

        self.block_changed(placed.position, "air", &placed.name);
        self.inventory_changed("place").await;
        Ok(PlaceResult {
            block: placed.name,
            position: placed.position,
        })
    }

    pub async fn craft(&self, args: &CraftArgs) -> Result<CraftResult, ActionError> {
        tracing::info!(recipe = %args.recipe, count = args.count, "Crafting");
        let produced = self.world.craft(&args.recipe, args.count).await?;
        self.inventory_changed("craft").await;
        Ok(CraftResult {
            crafted: args.recipe.clone(),
            count: produced,
        })
    }

    pub async fn inventory(&self) -> Result<InventoryResult, ActionError> {
        let items = self.world.inventory().await?;
        Ok(InventoryResult::from_items(items))
    }

    pub async fn position(&self) -> Result<Position, ActionError> {
        Ok(self.world.position().await?)
    }

    pub async fn get_block(&self, args: &BlockArgs) -> Result<BlockResult, ActionError> {
        let block = self.world.block_at(args.position()).await?;
        Ok(BlockResult {
            diggable: block.is_diggable(),
            name: block.name,
            position: block.position,
        })
    }

    pub async fn chat(&self, args: &ChatArgs) -> Result<ChatResult, ActionError> {
        self.world.chat(&args.message).await?;
        self.events.emit(
            event_types::CHAT,
            EventPayload::new()
                .field("username", self.events.source())
                .field("message", &args.message),
            None,
        );
        Ok(ChatResult {
            message: args.message.clone(),
            length: args.message.chars().count(),
        })
    }

    pub async fn find_blocks(&self, args: &FindBlocksArgs) -> Result<FindBlocksResult, ActionError> {
        tracing::info!(block = %args.name, max_distance = args.max_distance, "Searching for blocks");
        let found = self
            .world
            .find_blocks(&args.name, args.max_distance, args.count)
            .await?;
        let positions: Vec<BlockPos> = found.into_iter().map(|block| block.position).collect();
        Ok(FindBlocksResult {
            block: args.name.clone(),
            count: positions.len(),
            positions,
        })
    }

    /// Players within `max_distance`, nearest first.
    pub async fn nearby_players(
        &self,
        args: &NearbyPlayersArgs,
    ) -> Result<NearbyPlayersResult, ActionError> {
        let origin = self.world.position().await?;
        let mut players: Vec<NearbyPlayer> = self
            .world
            .players()
            .await?
            .into_iter()
            .map(|player| NearbyPlayer {
                distance: origin.distance_to(&player.position),
                username: player.username,
                position: player.position,
            })
            .filter(|player| player.distance <= f64::from(args.max_distance))
            .collect();
        players.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(NearbyPlayersResult {
            count: players.len(),
            players,
        })
    }

    fn block_changed(&self, position: BlockPos, old_block: &str, new_block: &str) {
        self.events.emit(
            event_types::BLOCK_UPDATE,
            EventPayload::new()
                .field("position", &position)
                .field("oldBlock", old_block)
                .field("newBlock", new_block),
            None,
        );
    }

    async fn inventory_changed(&self, cause: &str) {
        match self.world.inventory().await {
            Ok(items) => {
                let inventory = InventoryResult::from_items(items);
                self.events.emit(
                    event_types::INVENTORY_CHANGE,
                    EventPayload::new()
                        .field("cause", cause)
                        .field("summary", &inventory.summary)
                        .field("totalItems", &inventory.total_items),
                    None,
                );
            }
            Err(e) => tracing::warn!(error = %e, "Failed to read inventory for change event"),
        }
    }
}
