use thiserror::Error;

use super::MovementStatus;
use crate::Position;

/// Successful end of a movement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arrival {
    pub position: Position,
    pub distance_to_target: f64,
    pub elapsed_ms: u64,
}

/// Why a movement ended without arriving.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MovementFailure {
    #[error("movement timed out after {elapsed_ms}ms (limit {timeout_ms}ms)")]
    Timeout {
        timeout_ms: u64,
        elapsed_ms: u64,
        last_position: Position,
    },

    #[error("bot is stuck {distance_remaining:.1} blocks from target after {stalled_samples} samples without progress")]
    Stuck {
        distance_remaining: f64,
        stalled_samples: u32,
    },

    #[error("no path to target: {reason}")]
    NoPath { reason: String },

    #[error("movement was cancelled")]
    Cancelled,
}

/// Terminal result of a movement.
#[derive(Debug, Clone, PartialEq)]
pub enum MovementOutcome {
    Arrived(Arrival),
    Failed(MovementFailure),
}

impl MovementOutcome {
    pub fn status(&self) -> MovementStatus {
        match self {
            MovementOutcome::Arrived(_) => MovementStatus::Arrived,
            MovementOutcome::Failed(MovementFailure::Timeout { .. }) => MovementStatus::TimedOut,
            MovementOutcome::Failed(_) => MovementStatus::Failed,
        }
    }

    pub fn is_arrived(&self) -> bool {
        matches!(self, MovementOutcome::Arrived(_))
    }

    pub fn into_result(self) -> Result<Arrival, MovementFailure> {
        match self {
            MovementOutcome::Arrived(arrival) => Ok(arrival),
            MovementOutcome::Failed(failure) => Err(failure),
        }
    }
}
