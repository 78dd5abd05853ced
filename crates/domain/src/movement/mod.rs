//! Movement supervision: the navigate-to-point state machine.
//!
//! ```text
//! computing -> moving <-> stuck -> { arrived | timed-out | failed }
//! ```
//!
//! The tracker never sleeps or reads a clock. Callers feed it samples and
//! elapsed times, which keeps the executor-side pathfinder and the agent-side
//! controller on exactly the same rules.

mod config;
mod outcome;
mod sample;
mod tracker;

pub use config::MovementConfig;
pub use outcome::{Arrival, MovementFailure, MovementOutcome};
pub use sample::{MovementStatus, PathStatus, ProgressSample};
pub use tracker::{MovementTracker, Transition};
