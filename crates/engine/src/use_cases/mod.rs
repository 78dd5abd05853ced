//! Use cases - command execution against the game world.

pub mod actions;
pub mod commands;
pub mod pathfinder;

pub use actions::{ActionError, ActionHandlers};
pub use commands::CommandRouter;
pub use pathfinder::{Pathfinder, PathfinderError};
