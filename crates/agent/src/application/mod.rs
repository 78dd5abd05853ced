//! Application layer: what a planner calls.
//!
//! - `movement`: supervised `pathfinder.goto`
//! - `actions`: typed calls for every other action

pub mod actions;
pub mod movement;

pub use actions::BotActions;
pub use movement::{MoveRequest, MovementController, MovementError, ProgressNarrator};
