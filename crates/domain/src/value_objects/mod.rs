//! Value objects: coordinates and navigation goals.

mod goal;
mod position;

pub use goal::GoalShape;
pub use position::{BlockPos, Face, Position, WORLD_MAX_XZ, WORLD_MAX_Y, WORLD_MIN_Y};
