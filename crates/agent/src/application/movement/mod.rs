//! Agent-side movement supervision.

mod controller;
mod narration;

pub use controller::{MoveRequest, MovementController, MovementError};
pub use narration::ProgressNarrator;
