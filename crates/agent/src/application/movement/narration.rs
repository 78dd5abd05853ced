//! Human-readable movement narration at a bounded rate.

use std::time::Duration;

use blockbot_domain::{MovementTracker, Transition};
use blockbot_shared::PathfindingProgress;
use tokio::time::Instant;

/// Turns progress samples into status lines, at most one per `interval`.
///
/// Entering or leaving `stuck` always produces a line so an observer can
/// tell slow progress from no progress.
#[derive(Debug, Clone)]
pub struct ProgressNarrator {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressNarrator {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn narrate(
        &mut self,
        now: Instant,
        tracker: &MovementTracker,
        progress: &PathfindingProgress,
        transition: &Transition,
    ) -> Option<String> {
        let remaining = progress.distance_remaining;
        let line = match transition {
            Transition::BecameStuck { stalled_samples } => format!(
                "Stuck {remaining:.1} blocks from {} ({stalled_samples} samples without progress)",
                tracker.target()
            ),
            Transition::Recovered => format!("Moving again, {remaining:.1} blocks to go"),
            Transition::Progressing | Transition::NoProgress { .. } => {
                if self.last.is_some_and(|last| now.duration_since(last) < self.interval) {
                    return None;
                }
                let mut line = format!(
                    "{:.0}% of the way to {}, {remaining:.1} blocks left",
                    tracker.progress_percent(remaining),
                    tracker.target()
                );
                if let Some(eta) = progress.estimated_remaining_ms {
                    line.push_str(&format!(" (about {}s remaining)", eta.div_ceil(1_000)));
                }
                line
            }
            Transition::Stale | Transition::AlreadyFinished | Transition::Finished(_) => {
                return None
            }
        };
        self.last = Some(now);
        Some(line)
    }
}
