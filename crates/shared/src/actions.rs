//! The closed set of actions the executor understands
//!
//! Every command crosses the process boundary as a `method` string plus a JSON
//! `args` object. [`ActionRequest::parse`] is the single place where that pair
//! is checked and turned into a typed request; nothing past it dispatches on
//! strings.

use std::collections::BTreeMap;

use blockbot_domain::{BlockPos, Face, GoalShape, Position};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::responses::CommandError;

/// Wire names of the supported methods.
pub mod methods {
    pub const GOTO: &str = "pathfinder.goto";
    pub const STOP: &str = "pathfinder.stop";
    pub const DIG: &str = "dig";
    pub const PLACE_BLOCK: &str = "placeBlock";
    pub const CRAFT: &str = "craft";
    pub const INVENTORY: &str = "inventory.items";
    pub const POSITION: &str = "entity.position";
    pub const GET_BLOCK: &str = "world.getBlock";
    pub const CHAT: &str = "chat";
    pub const FIND_BLOCKS: &str = "world.findBlocks";
    pub const NEARBY_PLAYERS: &str = "players.nearby";
}

/// Longest chat line the server accepts.
pub const MAX_CHAT_LENGTH: usize = 256;
/// Largest number of items one craft request may produce.
pub const MAX_CRAFT_COUNT: u32 = 64;
/// Widest radius a block or player search may cover.
pub const MAX_SEARCH_DISTANCE: u32 = 256;
/// Radius of a player search when none is given.
pub const DEFAULT_PLAYER_SEARCH_DISTANCE: u32 = 64;

// =============================================================================
// Action Request
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ActionRequest {
    Goto(GotoArgs),
    Stop,
    Dig(BlockArgs),
    PlaceBlock(PlaceArgs),
    Craft(CraftArgs),
    Inventory,
    Position,
    GetBlock(BlockArgs),
    Chat(ChatArgs),
    FindBlocks(FindBlocksArgs),
    NearbyPlayers(NearbyPlayersArgs),
}

impl ActionRequest {
    /// Check a method/args pair at the boundary.
    pub fn parse(method: &str, args: serde_json::Value) -> Result<Self, CommandError> {
        let request = match method {
            methods::GOTO => ActionRequest::Goto(decode_args(method, args)?),
            methods::STOP => ActionRequest::Stop,
            methods::DIG => ActionRequest::Dig(decode_args(method, args)?),
            methods::PLACE_BLOCK => ActionRequest::PlaceBlock(decode_args(method, args)?),
            methods::CRAFT => ActionRequest::Craft(decode_args(method, args)?),
            methods::INVENTORY => ActionRequest::Inventory,
            methods::POSITION => ActionRequest::Position,
            methods::GET_BLOCK => ActionRequest::GetBlock(decode_args(method, args)?),
            methods::CHAT => ActionRequest::Chat(decode_args(method, args)?),
            methods::FIND_BLOCKS => ActionRequest::FindBlocks(decode_args(method, args)?),
            methods::NEARBY_PLAYERS => ActionRequest::NearbyPlayers(decode_args(method, args)?),
            other => return Err(CommandError::unknown_method(other)),
        };
        request.validate()?;
        Ok(request)
    }

    pub fn method(&self) -> &'static str {
        match self {
            ActionRequest::Goto(_) => methods::GOTO,
            ActionRequest::Stop => methods::STOP,
            ActionRequest::Dig(_) => methods::DIG,
            ActionRequest::PlaceBlock(_) => methods::PLACE_BLOCK,
            ActionRequest::Craft(_) => methods::CRAFT,
            ActionRequest::Inventory => methods::INVENTORY,
            ActionRequest::Position => methods::POSITION,
            ActionRequest::GetBlock(_) => methods::GET_BLOCK,
            ActionRequest::Chat(_) => methods::CHAT,
            ActionRequest::FindBlocks(_) => methods::FIND_BLOCKS,
            ActionRequest::NearbyPlayers(_) => methods::NEARBY_PLAYERS,
        }
    }

    /// Arguments as they appear on the wire.
    pub fn args(&self) -> serde_json::Value {
        let value = match self {
            ActionRequest::Goto(args) => serde_json::to_value(args),
            ActionRequest::Dig(args) | ActionRequest::GetBlock(args) => serde_json::to_value(args),
            ActionRequest::PlaceBlock(args) => serde_json::to_value(args),
            ActionRequest::Craft(args) => serde_json::to_value(args),
            ActionRequest::Chat(args) => serde_json::to_value(args),
            ActionRequest::FindBlocks(args) => serde_json::to_value(args),
            ActionRequest::NearbyPlayers(args) => serde_json::to_value(args),
            ActionRequest::Stop | ActionRequest::Inventory | ActionRequest::Position => {
                Ok(serde_json::Value::Object(serde_json::Map::new()))
            }
        };
        value.unwrap_or(serde_json::Value::Null)
    }

    /// Movement is the only action that must carry its own timeout.
    pub fn is_movement(&self) -> bool {
        matches!(self, ActionRequest::Goto(_))
    }

    /// Read-only queries that may interleave with a running movement.
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            ActionRequest::Inventory
                | ActionRequest::Position
                | ActionRequest::GetBlock(_)
                | ActionRequest::FindBlocks(_)
                | ActionRequest::NearbyPlayers(_)
        )
    }

    fn validate(&self) -> Result<(), CommandError> {
        match self {
            ActionRequest::Goto(args) => args.validate(),
            ActionRequest::Dig(args) | ActionRequest::GetBlock(args) => args.validate(),
            ActionRequest::PlaceBlock(args) => args.position().validate_bounds().map_err(out_of_bounds),
            ActionRequest::Craft(args) => args.validate(),
            ActionRequest::Chat(args) => args.validate(),
            ActionRequest::FindBlocks(args) => args.validate(),
            ActionRequest::NearbyPlayers(args) => check_search_distance(args.max_distance),
            ActionRequest::Stop | ActionRequest::Inventory | ActionRequest::Position => Ok(()),
        }
    }
}

fn decode_args<T: DeserializeOwned>(method: &str, args: serde_json::Value) -> Result<T, CommandError> {
    let args = match args {
        serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
        other => other,
    };
    serde_json::from_value(args).map_err(|e| {
        let message = format!("{method}: {e}");
        if e.to_string().starts_with("missing field") {
            CommandError::missing_argument(message)
        } else {
            CommandError::invalid_argument(message)
        }
    })
}

fn out_of_bounds(e: blockbot_domain::DomainError) -> CommandError {
    CommandError::invalid_argument(format!("invalid coordinates: {e}"))
}

fn check_search_distance(max_distance: u32) -> Result<(), CommandError> {
    if max_distance == 0 || max_distance > MAX_SEARCH_DISTANCE {
        return Err(CommandError::invalid_argument(format!(
            "max distance must be between 1 and {MAX_SEARCH_DISTANCE} blocks, got {max_distance}"
        )));
    }
    Ok(())
}

// =============================================================================
// Arguments
// =============================================================================

/// `pathfinder.goto` arguments: `{x, y, z, timeout, goalType?, range?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GotoArgs {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Hard timeout in milliseconds; required, no default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<f64>,
}

impl GotoArgs {
    pub fn new(target: Position, timeout_ms: u64, goal: GoalShape) -> Self {
        Self {
            x: target.x,
            y: target.y,
            z: target.z,
            timeout: Some(timeout_ms),
            goal_type: Some(goal.kind().to_string()),
            range: goal.range(),
        }
    }

    pub fn target(&self) -> Position {
        Position::new(self.x, self.y, self.z)
    }

    pub fn goal(&self, default_range: f64) -> Result<GoalShape, CommandError> {
        GoalShape::from_wire(self.goal_type.as_deref(), self.range, default_range)
            .map_err(|e| CommandError::invalid_argument(e.to_string()))
    }

    fn validate(&self) -> Result<(), CommandError> {
        match self.timeout {
            None => {
                return Err(CommandError::missing_argument(
                    "timeout is required for pathfinder.goto",
                ))
            }
            Some(0) => {
                return Err(CommandError::invalid_argument(
                    "timeout for pathfinder.goto must be positive",
                ))
            }
            Some(_) => {}
        }
        self.target().validate_bounds().map_err(out_of_bounds)?;
        self.goal(0.0).map(|_| ())
    }
}

/// A single block coordinate: `dig`, `world.getBlock`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockArgs {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockArgs {
    pub fn position(&self) -> BlockPos {
        BlockPos::new(self.x, self.y, self.z)
    }

    fn validate(&self) -> Result<(), CommandError> {
        self.position().validate_bounds().map_err(out_of_bounds)
    }
}

impl From<BlockPos> for BlockArgs {
    fn from(value: BlockPos) -> Self {
        Self {
            x: value.x,
            y: value.y,
            z: value.z,
        }
    }
}

/// `placeBlock` arguments: the reference block, the face to place against,
/// and optionally which item to place (defaults to the first placeable item).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceArgs {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    #[serde(default)]
    pub face: Face,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<String>,
}

impl PlaceArgs {
    pub fn position(&self) -> BlockPos {
        BlockPos::new(self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CraftArgs {
    pub recipe: String,
    #[serde(default = "default_craft_count")]
    pub count: u32,
}

fn default_craft_count() -> u32 {
    1
}

impl CraftArgs {
    fn validate(&self) -> Result<(), CommandError> {
        if self.recipe.trim().is_empty() {
            return Err(CommandError::invalid_argument("recipe must not be empty"));
        }
        if self.count == 0 || self.count > MAX_CRAFT_COUNT {
            return Err(CommandError::invalid_argument(format!(
                "craft count must be between 1 and {MAX_CRAFT_COUNT}, got {}",
                self.count
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatArgs {
    pub message: String,
}

impl ChatArgs {
    fn validate(&self) -> Result<(), CommandError> {
        if self.message.trim().is_empty() {
            return Err(CommandError::invalid_argument("cannot send empty message"));
        }
        let length = self.message.chars().count();
        if length > MAX_CHAT_LENGTH {
            return Err(CommandError::invalid_argument(format!(
                "message too long: {length} characters (maximum {MAX_CHAT_LENGTH})"
            )));
        }
        Ok(())
    }
}

/// `world.findBlocks` arguments. `name` matches any block whose name
/// contains it, so `"log"` finds every kind of log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindBlocksArgs {
    pub name: String,
    pub max_distance: u32,
    pub count: u32,
}

impl FindBlocksArgs {
    fn validate(&self) -> Result<(), CommandError> {
        if self.name.trim().is_empty() {
            return Err(CommandError::invalid_argument("block name must not be empty"));
        }
        check_search_distance(self.max_distance)?;
        if self.count == 0 {
            return Err(CommandError::invalid_argument("count must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyPlayersArgs {
    #[serde(default = "default_player_search_distance")]
    pub max_distance: u32,
}

impl Default for NearbyPlayersArgs {
    fn default() -> Self {
        Self {
            max_distance: DEFAULT_PLAYER_SEARCH_DISTANCE,
        }
    }
}

fn default_player_search_distance() -> u32 {
    DEFAULT_PLAYER_SEARCH_DISTANCE
}

// =============================================================================
// Results
// =============================================================================

/// Value of `GotoResult::status` on success.
pub const GOTO_COMPLETED: &str = "completed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GotoResult {
    pub target_position: Position,
    pub actual_position: Position,
    pub distance_to_target: f64,
    pub status: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopResult {
    pub stopped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigResult {
    pub block: String,
    pub position: BlockPos,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceResult {
    pub block: String,
    pub position: BlockPos,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CraftResult {
    pub crafted: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub name: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryResult {
    pub items: Vec<ItemStack>,
    /// Total count per item name
    pub summary: BTreeMap<String, u32>,
    pub total_items: u32,
}

impl InventoryResult {
    pub fn from_items(items: Vec<ItemStack>) -> Self {
        let mut summary = BTreeMap::new();
        let mut total_items = 0u32;
        for item in &items {
            *summary.entry(item.name.clone()).or_insert(0) += item.count;
            total_items = total_items.saturating_add(item.count);
        }
        Self {
            items,
            summary,
            total_items,
        }
    }

    pub fn count_of(&self, name: &str) -> u32 {
        self.summary.get(name).copied().unwrap_or(0)
    }
}

/// `entity.position` returns the bare `{x, y, z}`.
pub type PositionResult = Position;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockResult {
    pub name: String,
    pub position: BlockPos,
    pub diggable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResult {
    pub message: String,
    pub length: usize,
}

/// Matches nearest first, at most `count` of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindBlocksResult {
    pub block: String,
    pub count: usize,
    pub positions: Vec<BlockPos>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyPlayer {
    pub username: String,
    pub position: Position,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyPlayersResult {
    pub count: usize,
    pub players: Vec<NearbyPlayer>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responses::ErrorCode;
    use serde_json::json;

    #[test]
    fn parses_goto() {
        let request = ActionRequest::parse(
            methods::GOTO,
            json!({"x": 100, "y": 64, "z": -200, "timeout": 30000, "goalType": "near", "range": 2}),
        )
        .unwrap();
        match request {
            ActionRequest::Goto(args) => {
                assert_eq!(args.target(), Position::new(100.0, 64.0, -200.0));
                assert_eq!(args.goal(3.0).unwrap(), GoalShape::Near { range: 2.0 });
            }
            other => panic!("expected goto, got {other:?}"),
        }
    }

    #[test]
    fn goto_without_timeout_is_missing_argument() {
        let err = ActionRequest::parse(methods::GOTO, json!({"x": 1, "y": 64, "z": 1})).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingArgument);
        assert!(err.message.contains("timeout"));
    }

    #[test]
    fn goto_with_zero_timeout_is_invalid() {
        let err = ActionRequest::parse(
            methods::GOTO,
            json!({"x": 1, "y": 64, "z": 1, "timeout": 0}),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgument);
    }

    #[test]
    fn missing_coordinate_is_missing_argument() {
        let err = ActionRequest::parse(methods::DIG, json!({"x": 1, "z": 1})).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingArgument);

        let err = ActionRequest::parse(methods::CHAT, serde_json::Value::Null).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingArgument);
    }

    #[test]
    fn wrong_type_is_invalid_argument() {
        let err = ActionRequest::parse(methods::DIG, json!({"x": "one", "y": 64, "z": 1})).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgument);
    }

    #[test]
    fn unknown_method_is_rejected() {
        let err = ActionRequest::parse("teleport", json!({})).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownMethod);
    }

    #[test]
    fn out_of_world_coordinates_are_rejected() {
        let err = ActionRequest::parse(methods::DIG, json!({"x": 40000, "y": 64, "z": 0})).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgument);

        let err = ActionRequest::parse(
            methods::GOTO,
            json!({"x": 0, "y": 400, "z": 0, "timeout": 1000}),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgument);
    }

    #[test]
    fn chat_and_craft_limits() {
        assert!(ActionRequest::parse(methods::CHAT, json!({"message": "  "})).is_err());
        let long = "a".repeat(MAX_CHAT_LENGTH + 1);
        assert!(ActionRequest::parse(methods::CHAT, json!({ "message": long })).is_err());

        let craft = ActionRequest::parse(methods::CRAFT, json!({"recipe": "stick"})).unwrap();
        assert_eq!(
            craft,
            ActionRequest::Craft(CraftArgs {
                recipe: "stick".into(),
                count: 1
            })
        );
        assert!(ActionRequest::parse(methods::CRAFT, json!({"recipe": "stick", "count": 65})).is_err());
    }

    #[test]
    fn search_bounds() {
        let find = |args| ActionRequest::parse(methods::FIND_BLOCKS, args);
        assert!(find(json!({"name": "oak_log", "maxDistance": 256, "count": 5})).is_ok());

        let err = find(json!({"name": "oak_log", "maxDistance": 0, "count": 5})).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgument);
        assert!(err.message.contains("between 1 and 256"));
        assert!(find(json!({"name": "oak_log", "maxDistance": 257, "count": 5})).is_err());
        assert!(find(json!({"name": "oak_log", "maxDistance": 16, "count": 0})).is_err());
        assert!(find(json!({"name": " ", "maxDistance": 16, "count": 1})).is_err());

        let err = find(json!({"name": "oak_log", "count": 1})).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingArgument);

        assert_eq!(
            ActionRequest::parse(methods::NEARBY_PLAYERS, serde_json::Value::Null).unwrap(),
            ActionRequest::NearbyPlayers(NearbyPlayersArgs::default())
        );
        assert!(ActionRequest::parse(methods::NEARBY_PLAYERS, json!({"maxDistance": 300})).is_err());
    }

    #[test]
    fn request_reencodes_to_same_method_and_args() {
        let request = ActionRequest::PlaceBlock(PlaceArgs {
            x: 1,
            y: 64,
            z: 2,
            face: Face::North,
            block: Some("cobblestone".into()),
        });
        let parsed = ActionRequest::parse(request.method(), request.args()).unwrap();
        assert_eq!(parsed, request);
        assert_eq!(ActionRequest::Stop.args(), json!({}));
    }

    #[test]
    fn inventory_summary() {
        let inventory = InventoryResult::from_items(vec![
            ItemStack {
                name: "oak_log".into(),
                count: 10,
            },
            ItemStack {
                name: "oak_log".into(),
                count: 5,
            },
            ItemStack {
                name: "stick".into(),
                count: 4,
            },
        ]);
        assert_eq!(inventory.total_items, 19);
        assert_eq!(inventory.count_of("oak_log"), 15);
        assert_eq!(inventory.count_of("diamond"), 0);
    }

    #[test]
    fn query_classification() {
        assert!(ActionRequest::Position.is_query());
        assert!(!ActionRequest::Stop.is_query());
        assert!(ActionRequest::Goto(GotoArgs::new(
            Position::new(0.0, 64.0, 0.0),
            1_000,
            GoalShape::Exact
        ))
        .is_movement());
    }
}
