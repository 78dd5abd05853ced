//! Typed calls for the non-movement actions.

use blockbot_domain::{BlockPos, Face, Position};
use blockbot_shared::{
    ActionRequest, BlockArgs, BlockResult, ChatArgs, ChatResult, CraftArgs, CraftResult,
    DigResult, FindBlocksArgs, FindBlocksResult, InventoryResult, NearbyPlayersArgs,
    NearbyPlayersResult, PlaceArgs, PlaceResult, PositionResult, StopResult,
};

use crate::infrastructure::messaging::{CommandDispatcher, DispatchError};

/// The action surface a planner drives, one method per executor action.
#[derive(Clone)]
pub struct BotActions {
    dispatcher: CommandDispatcher,
}

impl BotActions {
    pub fn new(dispatcher: CommandDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Halt any pathfinding on the executor.
    pub async fn stop(&self) -> Result<StopResult, DispatchError> {
        self.dispatcher.call(ActionRequest::Stop).await
    }

    pub async fn dig(&self, block: BlockPos) -> Result<DigResult, DispatchError> {
        self.dispatcher
            .call(ActionRequest::Dig(BlockArgs::from(block)))
            .await
    }

    /// Place against `face` of the block at `against`. Without `item`, the
    /// executor places whatever the bot is holding.
    pub async fn place(
        &self,
        against: BlockPos,
        face: Face,
        item: Option<String>,
    ) -> Result<PlaceResult, DispatchError> {
        let args = PlaceArgs {
            x: against.x,
            y: against.y,
            z: against.z,
            face,
            block: item,
        };
        self.dispatcher.call(ActionRequest::PlaceBlock(args)).await
    }

    pub async fn craft(&self, recipe: &str, count: u32) -> Result<CraftResult, DispatchError> {
        let args = CraftArgs {
            recipe: recipe.to_string(),
            count,
        };
        self.dispatcher.call(ActionRequest::Craft(args)).await
    }

    pub async fn inventory(&self) -> Result<InventoryResult, DispatchError> {
        self.dispatcher.call(ActionRequest::Inventory).await
    }

    pub async fn position(&self) -> Result<Position, DispatchError> {
        self.dispatcher
            .call::<PositionResult>(ActionRequest::Position)
            .await
    }

    pub async fn block_at(&self, block: BlockPos) -> Result<BlockResult, DispatchError> {
        self.dispatcher
            .call(ActionRequest::GetBlock(BlockArgs::from(block)))
            .await
    }

    pub async fn chat(&self, message: &str) -> Result<ChatResult, DispatchError> {
        let args = ChatArgs {
            message: message.to_string(),
        };
        self.dispatcher.call(ActionRequest::Chat(args)).await
    }

    /// Up to `count` blocks whose name contains `name`, nearest first.
    pub async fn find_blocks(
        &self,
        name: &str,
        max_distance: u32,
        count: u32,
    ) -> Result<FindBlocksResult, DispatchError> {
        let args = FindBlocksArgs {
            name: name.to_string(),
            max_distance,
            count,
        };
        self.dispatcher.call(ActionRequest::FindBlocks(args)).await
    }

    pub async fn nearby_players(&self, max_distance: u32) -> Result<NearbyPlayersResult, DispatchError> {
        self.dispatcher
            .call(ActionRequest::NearbyPlayers(NearbyPlayersArgs { max_distance }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockbot_shared::{methods, CommandResponse, ErrorCode};

    use crate::test_support::{fake_connection, quick_dispatch};

    #[tokio::test(start_paused = true)]
    async fn dig_sends_block_coordinates_and_decodes_result() {
        let (connection, mut executor) = fake_connection(quick_dispatch());
        let actions = BotActions::new(connection.dispatcher().clone());

        let call = tokio::spawn(async move { actions.dig(BlockPos::new(3, 63, -7)).await });
        let command = executor.next_command().await;
        assert_eq!(command.method, methods::DIG);
        assert_eq!(command.args["x"], 3);
        assert_eq!(command.args["y"], 63);
        assert_eq!(command.args["z"], -7);

        executor.respond(CommandResponse::success(
            command.id,
            &DigResult {
                block: "dirt".into(),
                position: BlockPos::new(3, 63, -7),
            },
        ));
        assert_eq!(call.await.unwrap().unwrap().block, "dirt");
    }

    #[tokio::test(start_paused = true)]
    async fn action_failure_surfaces_its_code() {
        let (connection, mut executor) = fake_connection(quick_dispatch());
        let actions = BotActions::new(connection.dispatcher().clone());

        let call = tokio::spawn(async move { actions.craft("diamond_pickaxe", 1).await });
        let command = executor.next_command().await;
        assert_eq!(command.method, methods::CRAFT);
        assert_eq!(command.args["recipe"], "diamond_pickaxe");
        executor.respond(CommandResponse::failure(
            command.id,
            ErrorCode::ActionFailed,
            "missing ingredients",
        ));

        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err.remote_code(), Some(ErrorCode::ActionFailed));
    }

    #[tokio::test(start_paused = true)]
    async fn find_blocks_decodes_positions() {
        let (connection, mut executor) = fake_connection(quick_dispatch());
        let actions = BotActions::new(connection.dispatcher().clone());

        let call = tokio::spawn(async move { actions.find_blocks("log", 32, 2).await });
        let command = executor.next_command().await;
        assert_eq!(command.method, methods::FIND_BLOCKS);
        assert_eq!(command.args["maxDistance"], 32);
        executor.respond(CommandResponse::success(
            command.id,
            &FindBlocksResult {
                block: "log".into(),
                count: 1,
                positions: vec![BlockPos::new(4, 64, -2)],
            },
        ));
        assert_eq!(call.await.unwrap().unwrap().positions, vec![BlockPos::new(4, 64, -2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn search_bounds_are_checked_before_sending() {
        let (connection, mut executor) = fake_connection(quick_dispatch());
        let actions = BotActions::new(connection.dispatcher().clone());

        assert!(matches!(
            actions.find_blocks("oak_log", 257, 1).await,
            Err(DispatchError::Rejected(_))
        ));
        assert!(matches!(
            actions.find_blocks("oak_log", 16, 0).await,
            Err(DispatchError::Rejected(_))
        ));
        assert!(matches!(actions.nearby_players(0).await, Err(DispatchError::Rejected(_))));
        assert!(executor.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_craft_count_is_rejected_locally() {
        let (connection, mut executor) = fake_connection(quick_dispatch());
        let actions = BotActions::new(connection.dispatcher().clone());

        let err = actions.craft("stick", 0).await.unwrap_err();
        assert!(matches!(err, DispatchError::Rejected(_)));
        assert!(executor.try_recv().is_none());
    }
}
