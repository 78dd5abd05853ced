//! Blockbot Domain - pure types shared by the executor and the agent.
//!
//! Nothing in this crate performs I/O or reads a clock. Time enters the
//! movement state machine only as elapsed milliseconds carried by samples,
//! so every transition can be exercised from a plain unit test.

pub mod error;
pub mod movement;
pub mod value_objects;

pub use error::DomainError;

pub use movement::{
    Arrival, MovementConfig, MovementFailure, MovementOutcome, MovementStatus, MovementTracker,
    PathStatus, ProgressSample, Transition,
};

pub use value_objects::{BlockPos, Face, GoalShape, Position, WORLD_MAX_Y, WORLD_MIN_Y};
