use serde::{Deserialize, Serialize};

use crate::Position;

/// What the executor's pathfinder reports it is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStatus {
    Computing,
    Moving,
    Idle,
}

impl std::fmt::Display for PathStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathStatus::Computing => write!(f, "computing"),
            PathStatus::Moving => write!(f, "moving"),
            PathStatus::Idle => write!(f, "idle"),
        }
    }
}

/// Supervisor-level status of one movement operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MovementStatus {
    Computing,
    Moving,
    Stuck,
    Arrived,
    TimedOut,
    Failed,
}

impl MovementStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MovementStatus::Arrived | MovementStatus::TimedOut | MovementStatus::Failed
        )
    }
}

impl std::fmt::Display for MovementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MovementStatus::Computing => "computing",
            MovementStatus::Moving => "moving",
            MovementStatus::Stuck => "stuck",
            MovementStatus::Arrived => "arrived",
            MovementStatus::TimedOut => "timed-out",
            MovementStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One progress observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    pub position: Position,
    pub distance_remaining: f64,
    pub path_status: PathStatus,
    pub elapsed_ms: u64,
}

impl ProgressSample {
    pub fn new(
        position: Position,
        distance_remaining: f64,
        path_status: PathStatus,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            position,
            distance_remaining: distance_remaining.max(0.0),
            path_status,
            elapsed_ms,
        }
    }
}
