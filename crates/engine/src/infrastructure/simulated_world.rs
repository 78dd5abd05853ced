//! In-process game world.
//!
//! Stands in for a live server connection. The bot walks in a straight line
//! toward its goal at a fixed speed measured on the tokio clock, so tests
//! running with a paused clock see deterministic movement.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use blockbot_domain::{BlockPos, Face, GoalShape, PathStatus, Position};
use blockbot_shared::ItemStack;
use tokio::time::{Duration, Instant};

use super::ports::{BlockInfo, GameWorld, PathCompletion, PathState, PlayerSighting, WorldError};

/// Default walking speed in blocks per second.
pub const DEFAULT_WALK_SPEED: f64 = 4.3;
/// Time the pathfinder spends computing before the bot starts walking.
const COMPUTE_DELAY: Duration = Duration::from_millis(250);
/// Furthest block the bot can dig or place against.
const REACH: f64 = 4.5;
/// Surface height of the flat generated terrain.
const GROUND_Y: i32 = 63;

/// A recipe: inputs consumed and items produced per craft.
struct Recipe {
    name: &'static str,
    inputs: &'static [(&'static str, u32)],
    output: u32,
}

const RECIPES: &[Recipe] = &[
    Recipe {
        name: "oak_planks",
        inputs: &[("oak_log", 1)],
        output: 4,
    },
    Recipe {
        name: "stick",
        inputs: &[("oak_planks", 2)],
        output: 4,
    },
    Recipe {
        name: "crafting_table",
        inputs: &[("oak_planks", 4)],
        output: 1,
    },
    Recipe {
        name: "wooden_pickaxe",
        inputs: &[("oak_planks", 3), ("stick", 2)],
        output: 1,
    },
];

/// Items that cannot be placed as blocks.
const NON_PLACEABLE: &[&str] = &["stick", "wooden_pickaxe"];

#[derive(Debug)]
struct ActivePath {
    target: Position,
    tolerance: f64,
    started_at: Instant,
    last_update: Instant,
    completion: Option<PathCompletion>,
}

#[derive(Debug)]
struct WorldState {
    position: Position,
    path: Option<ActivePath>,
    blocks: HashMap<BlockPos, String>,
    inventory: BTreeMap<String, u32>,
    chat_log: Vec<String>,
    players: BTreeMap<String, Position>,
    /// Remaining distance at which the bot stops advancing, to simulate
    /// an obstacle the pathfinder cannot get around.
    blocked_at: Option<f64>,
}

/// In-memory [`GameWorld`].
pub struct SimulatedWorld {
    state: Mutex<WorldState>,
    walk_speed: f64,
    pathfinding_available: bool,
}

impl SimulatedWorld {
    pub fn new(spawn: Position, walk_speed: f64) -> Self {
        Self {
            state: Mutex::new(WorldState {
                position: spawn,
                path: None,
                blocks: HashMap::new(),
                inventory: BTreeMap::new(),
                chat_log: Vec::new(),
                players: BTreeMap::new(),
                blocked_at: None,
            }),
            walk_speed: walk_speed.max(0.1),
            pathfinding_available: true,
        }
    }

    pub fn with_item(self, name: &str, count: u32) -> Self {
        self.with_state(|state| {
            *state.inventory.entry(name.to_string()).or_insert(0) += count;
        });
        self
    }

    pub fn with_block(self, position: BlockPos, name: &str) -> Self {
        self.with_state(|state| {
            state.blocks.insert(position, name.to_string());
        });
        self
    }

    pub fn with_player(self, username: &str, position: Position) -> Self {
        self.with_state(|state| {
            state.players.insert(username.to_string(), position);
        });
        self
    }

    /// Make the bot stop advancing once it is `distance` blocks from any goal.
    pub fn with_obstacle_at(self, distance: f64) -> Self {
        self.with_state(|state| state.blocked_at = Some(distance));
        self
    }

    /// Simulate a bot without the pathfinder capability.
    pub fn without_pathfinding(mut self) -> Self {
        self.pathfinding_available = false;
        self
    }

    pub fn chat_log(&self) -> Vec<String> {
        self.lock().chat_log.clone()
    }

    fn with_state(&self, f: impl FnOnce(&mut WorldState)) {
        let mut state = self.lock();
        f(&mut state);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WorldState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move the bot along its path up to `now`.
    fn advance(&self, state: &mut WorldState, now: Instant) {
        let Some(path) = state.path.as_mut() else {
            return;
        };
        if path.completion.is_some() {
            return;
        }

        let walking_since = path.started_at + COMPUTE_DELAY;
        if now <= walking_since {
            return;
        }
        let from = path.last_update.max(walking_since);
        path.last_update = now;

        let remaining = state.position.distance_to(&path.target);
        let floor = state.blocked_at.unwrap_or(0.0).max(path.tolerance.min(remaining));
        let step = (self.walk_speed * (now - from).as_secs_f64()).min((remaining - floor).max(0.0));
        state.position = state.position.step_toward(&path.target, step);

        if state.position.distance_to(&path.target) <= path.tolerance + 1e-9 {
            path.completion = Some(PathCompletion::Reached);
        }
    }

    fn block_name(state: &WorldState, position: BlockPos) -> String {
        if let Some(name) = state.blocks.get(&position) {
            return name.clone();
        }
        match position.y {
            y if y == blockbot_domain::WORLD_MIN_Y as i32 => "bedrock".to_string(),
            y if y < GROUND_Y => "stone".to_string(),
            y if y == GROUND_Y => "grass_block".to_string(),
            _ => "air".to_string(),
        }
    }

    fn within_reach(state: &WorldState, position: BlockPos) -> Result<(), WorldError> {
        let distance = state.position.distance_to(&position.centre());
        if distance > REACH {
            return Err(WorldError::ActionFailed(format!(
                "block at {position} is out of reach ({distance:.1} blocks away)"
            )));
        }
        Ok(())
    }

    fn drop_for(block: &str) -> &str {
        match block {
            "grass_block" => "dirt",
            "stone" => "cobblestone",
            other => other,
        }
    }

    fn take_items(state: &mut WorldState, name: &str, count: u32) {
        if let Some(have) = state.inventory.get_mut(name) {
            *have = have.saturating_sub(count);
            if *have == 0 {
                state.inventory.remove(name);
            }
        }
    }
}

#[async_trait]
impl GameWorld for SimulatedWorld {
    async fn position(&self) -> Result<Position, WorldError> {
        let mut state = self.lock();
        self.advance(&mut state, Instant::now());
        Ok(state.position)
    }

    async fn start_pathfinding(&self, target: Position, goal: GoalShape) -> Result<(), WorldError> {
        if !self.pathfinding_available {
            return Err(WorldError::PluginUnavailable);
        }
        target
            .validate_bounds()
            .map_err(|e| WorldError::NoPath(e.to_string()))?;

        let mut state = self.lock();
        let goal_block = Self::block_name(&state, target.block());
        if goal == GoalShape::Exact && goal_block != "air" {
            return Err(WorldError::NoPath(format!(
                "goal block at {} is {goal_block}",
                target.block()
            )));
        }

        let now = Instant::now();
        state.path = Some(ActivePath {
            target,
            tolerance: goal.tolerance(),
            started_at: now,
            last_update: now,
            completion: None,
        });
        Ok(())
    }

    async fn path_state(&self) -> Result<PathState, WorldError> {
        let mut state = self.lock();
        let now = Instant::now();
        self.advance(&mut state, now);

        let position = state.position;
        let blocked_at = state.blocked_at;
        let Some(path) = state.path.as_ref() else {
            return Ok(PathState {
                position,
                status: PathStatus::Idle,
                completion: None,
            });
        };

        let status = if path.completion.is_some() {
            PathStatus::Idle
        } else if now < path.started_at + COMPUTE_DELAY {
            PathStatus::Computing
        } else if blocked_at
            .is_some_and(|d| position.distance_to(&path.target) <= d + 1e-9)
        {
            PathStatus::Idle
        } else {
            PathStatus::Moving
        };

        Ok(PathState {
            position,
            status,
            completion: path.completion.clone(),
        })
    }

    async fn stop_pathfinding(&self) -> Result<bool, WorldError> {
        let mut state = self.lock();
        self.advance(&mut state, Instant::now());
        let was_running = state
            .path
            .take()
            .is_some_and(|path| path.completion.is_none());
        Ok(was_running)
    }

    async fn block_at(&self, position: BlockPos) -> Result<BlockInfo, WorldError> {
        let state = self.lock();
        Ok(BlockInfo::new(Self::block_name(&state, position), position))
    }

    async fn dig(&self, position: BlockPos) -> Result<BlockInfo, WorldError> {
        let mut state = self.lock();
        self.advance(&mut state, Instant::now());
        Self::within_reach(&state, position)?;

        let block = BlockInfo::new(Self::block_name(&state, position), position);
        if !block.is_diggable() {
            return Err(WorldError::ActionFailed(format!("cannot dig {}", block.name)));
        }
        state.blocks.insert(position, "air".to_string());
        let drop = Self::drop_for(&block.name).to_string();
        *state.inventory.entry(drop).or_insert(0) += 1;
        Ok(block)
    }

    async fn place_block(
        &self,
        reference: BlockPos,
        face: Face,
        item: Option<String>,
    ) -> Result<BlockInfo, WorldError> {
        let mut state = self.lock();
        self.advance(&mut state, Instant::now());
        Self::within_reach(&state, reference)?;

        if Self::block_name(&state, reference) == "air" {
            return Err(WorldError::ActionFailed(format!(
                "no block at {reference} to place against"
            )));
        }
        let target = reference.offset(face);
        let occupant = Self::block_name(&state, target);
        if occupant != "air" {
            return Err(WorldError::ActionFailed(format!(
                "{target} is already occupied by {occupant}"
            )));
        }

        let item = match item {
            Some(name) if state.inventory.contains_key(&name) => name,
            Some(name) => {
                return Err(WorldError::ActionFailed(format!("no {name} in inventory")))
            }
            None => state
                .inventory
                .keys()
                .find(|name| !NON_PLACEABLE.contains(&name.as_str()))
                .cloned()
                .ok_or_else(|| WorldError::ActionFailed("no placeable block in inventory".into()))?,
        };
        if NON_PLACEABLE.contains(&item.as_str()) {
            return Err(WorldError::ActionFailed(format!("{item} cannot be placed")));
        }

        Self::take_items(&mut state, &item, 1);
        state.blocks.insert(target, item.clone());
        Ok(BlockInfo::new(item, target))
    }

    async fn craft(&self, recipe: &str, times: u32) -> Result<u32, WorldError> {
        let recipe = RECIPES
            .iter()
            .find(|r| r.name == recipe)
            .ok_or_else(|| WorldError::ActionFailed(format!("unknown recipe '{recipe}'")))?;

        let mut state = self.lock();
        for (input, per_craft) in recipe.inputs {
            let needed = per_craft * times;
            let have = state.inventory.get(*input).copied().unwrap_or(0);
            if have < needed {
                return Err(WorldError::ActionFailed(format!(
                    "not enough {input}: need {needed}, have {have}"
                )));
            }
        }
        for (input, per_craft) in recipe.inputs {
            Self::take_items(&mut state, input, per_craft * times);
        }
        let produced = recipe.output * times;
        *state.inventory.entry(recipe.name.to_string()).or_insert(0) += produced;
        Ok(produced)
    }

    async fn inventory(&self) -> Result<Vec<ItemStack>, WorldError> {
        let state = self.lock();
        Ok(state
            .inventory
            .iter()
            .map(|(name, count)| ItemStack {
                name: name.clone(),
                count: *count,
            })
            .collect())
    }

    async fn chat(&self, message: &str) -> Result<(), WorldError> {
        self.lock().chat_log.push(message.to_string());
        Ok(())
    }

    /// Only blocks recorded in the world are searched; generated terrain
    /// is not.
    async fn find_blocks(
        &self,
        name: &str,
        max_distance: u32,
        count: u32,
    ) -> Result<Vec<BlockInfo>, WorldError> {
        let mut state = self.lock();
        self.advance(&mut state, Instant::now());
        let origin = state.position;

        let mut found: Vec<(f64, BlockInfo)> = state
            .blocks
            .iter()
            .filter(|(_, block)| block.contains(name))
            .map(|(position, block)| {
                (
                    origin.distance_to(&position.centre()),
                    BlockInfo::new(block.clone(), *position),
                )
            })
            .filter(|(distance, _)| *distance <= f64::from(max_distance))
            .collect();
        found.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(found
            .into_iter()
            .take(count as usize)
            .map(|(_, block)| block)
            .collect())
    }

    async fn players(&self) -> Result<Vec<PlayerSighting>, WorldError> {
        let state = self.lock();
        Ok(state
            .players
            .iter()
            .map(|(username, position)| PlayerSighting {
                username: username.clone(),
                position: *position,
            })
            .collect())
    }
}
