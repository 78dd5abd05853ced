use super::{
    Arrival, MovementConfig, MovementFailure, MovementOutcome, MovementStatus, PathStatus,
    ProgressSample,
};
use crate::{DomainError, GoalShape, Position};

/// Rounding allowance when the executor says the path ended at the goal edge.
const COMPLETION_SLACK: f64 = 1e-6;

/// Effect of feeding one input to the tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Sample was not newer than the last accepted one and was discarded.
    Stale,
    /// The movement already reached a terminal outcome.
    AlreadyFinished,
    /// Distance changed meaningfully (or the bot is actively moving).
    Progressing,
    /// Another sample without progress; still below the stuck threshold.
    NoProgress { stalled_samples: u32 },
    /// The stuck threshold was just crossed.
    BecameStuck { stalled_samples: u32 },
    /// Progress resumed after being stuck.
    Recovered,
    /// The movement ended.
    Finished(MovementOutcome),
}

/// Working state of one navigate-to-point operation.
#[derive(Debug, Clone)]
pub struct MovementTracker {
    start: Position,
    target: Position,
    goal: GoalShape,
    initial_distance: f64,
    timeout_ms: u64,
    config: MovementConfig,
    status: MovementStatus,
    stalled_samples: u32,
    last_sampled_distance: f64,
    last_sample_elapsed_ms: Option<u64>,
    last_position: Position,
    outcome: Option<MovementOutcome>,
}

impl MovementTracker {
    /// Begin tracking a movement from `start` to `target`.
    ///
    /// A zero timeout is a caller error; there is no implicit default.
    pub fn new(
        start: Position,
        target: Position,
        goal: GoalShape,
        timeout_ms: u64,
        config: MovementConfig,
    ) -> Result<Self, DomainError> {
        if timeout_ms == 0 {
            return Err(DomainError::validation("movement timeout must be positive"));
        }
        target.validate_bounds()?;

        let initial_distance = start.distance_to(&target);
        Ok(Self {
            start,
            target,
            goal,
            initial_distance,
            timeout_ms,
            config,
            status: MovementStatus::Computing,
            stalled_samples: 0,
            last_sampled_distance: initial_distance,
            last_sample_elapsed_ms: None,
            last_position: start,
            outcome: None,
        })
    }

    pub fn start(&self) -> Position {
        self.start
    }

    pub fn target(&self) -> Position {
        self.target
    }

    pub fn goal(&self) -> GoalShape {
        self.goal
    }

    pub fn initial_distance(&self) -> f64 {
        self.initial_distance
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn status(&self) -> MovementStatus {
        self.status
    }

    pub fn stalled_samples(&self) -> u32 {
        self.stalled_samples
    }

    pub fn last_position(&self) -> Position {
        self.last_position
    }

    pub fn outcome(&self) -> Option<&MovementOutcome> {
        self.outcome.as_ref()
    }

    /// Distance at which the goal counts as reached.
    pub fn acceptance_radius(&self) -> f64 {
        self.config.arrival_epsilon.max(self.goal.tolerance())
    }

    /// Share of the initial distance already covered, 0..=100.
    pub fn progress_percent(&self, distance_remaining: f64) -> f64 {
        if self.initial_distance <= f64::EPSILON {
            return 100.0;
        }
        ((1.0 - distance_remaining / self.initial_distance) * 100.0).clamp(0.0, 100.0)
    }

    /// The executor confirmed that path computation has started.
    pub fn path_started(&mut self) {
        if self.status == MovementStatus::Computing {
            self.status = MovementStatus::Moving;
        }
    }

    /// Feed one progress sample.
    pub fn observe(&mut self, sample: ProgressSample) -> Transition {
        if self.outcome.is_some() {
            return Transition::AlreadyFinished;
        }
        if let Some(last) = self.last_sample_elapsed_ms {
            if sample.elapsed_ms <= last {
                return Transition::Stale;
            }
        }
        self.last_sample_elapsed_ms = Some(sample.elapsed_ms);
        self.last_position = sample.position;

        if let Some(outcome) = self.check_deadline(sample.elapsed_ms) {
            return Transition::Finished(outcome);
        }

        // Arrival is decided by distance alone; the executor's moving flag is
        // unreliable at block granularity near the destination.
        if sample.distance_remaining < self.acceptance_radius() {
            let outcome = MovementOutcome::Arrived(Arrival {
                position: sample.position,
                distance_to_target: sample.distance_remaining,
                elapsed_ms: sample.elapsed_ms,
            });
            return Transition::Finished(self.finish(outcome));
        }

        let delta = (self.last_sampled_distance - sample.distance_remaining).abs();
        self.last_sampled_distance = sample.distance_remaining;
        let improved = delta >= self.config.stuck_epsilon;

        // A path being (re)computed is neither progress nor a stall.
        if !improved && sample.path_status == PathStatus::Computing {
            return Transition::NoProgress {
                stalled_samples: self.stalled_samples,
            };
        }

        if !improved && sample.path_status == PathStatus::Idle {
            self.stalled_samples += 1;

            if self.stalled_samples >= self.config.stuck_failure_samples() {
                let outcome = MovementOutcome::Failed(MovementFailure::Stuck {
                    distance_remaining: sample.distance_remaining,
                    stalled_samples: self.stalled_samples,
                });
                return Transition::Finished(self.finish(outcome));
            }

            if self.stalled_samples >= self.config.stuck_threshold
                && self.status != MovementStatus::Stuck
            {
                self.status = MovementStatus::Stuck;
                return Transition::BecameStuck {
                    stalled_samples: self.stalled_samples,
                };
            }

            return Transition::NoProgress {
                stalled_samples: self.stalled_samples,
            };
        }

        self.stalled_samples = 0;
        let was_stuck = self.status == MovementStatus::Stuck;
        if !(self.status == MovementStatus::Computing && sample.path_status == PathStatus::Computing)
        {
            self.status = MovementStatus::Moving;
        }
        if was_stuck {
            Transition::Recovered
        } else {
            Transition::Progressing
        }
    }

    /// Enforce the hard wall-clock bound. Progress never extends it.
    pub fn check_deadline(&mut self, elapsed_ms: u64) -> Option<MovementOutcome> {
        if self.outcome.is_some() || elapsed_ms < self.timeout_ms {
            return None;
        }
        let outcome = MovementOutcome::Failed(MovementFailure::Timeout {
            timeout_ms: self.timeout_ms,
            elapsed_ms,
            last_position: self.last_position,
        });
        Some(self.finish(outcome))
    }

    /// The executor reports the path finished; verify where the bot ended up.
    pub fn path_completed(&mut self, position: Position, elapsed_ms: u64) -> MovementOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        self.last_position = position;
        if let Some(outcome) = self.check_deadline(elapsed_ms) {
            return outcome;
        }

        let distance = position.distance_to(&self.target);
        let outcome = if distance <= self.acceptance_radius() + COMPLETION_SLACK {
            MovementOutcome::Arrived(Arrival {
                position,
                distance_to_target: distance,
                elapsed_ms,
            })
        } else {
            MovementOutcome::Failed(MovementFailure::NoPath {
                reason: format!("path ended {distance:.1} blocks from target"),
            })
        };
        self.finish(outcome)
    }

    /// The executor could not find or follow a path.
    pub fn path_failed(&mut self, reason: impl Into<String>) -> MovementOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let outcome = MovementOutcome::Failed(MovementFailure::NoPath {
            reason: reason.into(),
        });
        self.finish(outcome)
    }

    /// The caller abandoned the movement.
    pub fn cancel(&mut self) -> MovementOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        self.finish(MovementOutcome::Failed(MovementFailure::Cancelled))
    }

    fn finish(&mut self, outcome: MovementOutcome) -> MovementOutcome {
        self.status = outcome.status();
        self.outcome = Some(outcome.clone());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT_MS: u64 = 30_000;

    fn target() -> Position {
        Position::new(100.0, 64.0, -200.0)
    }

    /// Start point `distance` blocks due west of the target.
    fn start_at(distance: f64) -> Position {
        Position::new(100.0 - distance, 64.0, -200.0)
    }

    fn tracker_from(distance: f64) -> MovementTracker {
        let mut tracker = MovementTracker::new(
            start_at(distance),
            target(),
            GoalShape::Near { range: 2.0 },
            TIMEOUT_MS,
            MovementConfig::default(),
        )
        .unwrap();
        tracker.path_started();
        tracker
    }

    fn sample(distance: f64, status: PathStatus, elapsed_ms: u64) -> ProgressSample {
        ProgressSample::new(start_at(distance), distance, status, elapsed_ms)
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let result = MovementTracker::new(
            start_at(10.0),
            target(),
            GoalShape::Exact,
            0,
            MovementConfig::default(),
        );
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn out_of_bounds_target_is_rejected() {
        let result = MovementTracker::new(
            start_at(10.0),
            Position::new(0.0, 400.0, 0.0),
            GoalShape::Exact,
            1_000,
            MovementConfig::default(),
        );
        assert!(matches!(result, Err(DomainError::OutOfBounds { .. })));
    }

    #[test]
    fn initial_distance_is_computed_once() {
        let tracker = tracker_from(40.0);
        assert!((tracker.initial_distance() - 40.0).abs() < 1e-9);
        assert_eq!(tracker.status(), MovementStatus::Moving);
    }

    #[test]
    fn decreasing_distance_never_reports_stuck() {
        let mut tracker = tracker_from(40.0);
        let mut elapsed = 0;
        for distance in (3..40).rev().map(f64::from) {
            elapsed += 1_000;
            let transition = tracker.observe(sample(distance, PathStatus::Idle, elapsed));
            assert_eq!(transition, Transition::Progressing, "at distance {distance}");
            assert_ne!(tracker.status(), MovementStatus::Stuck);
        }
    }

    #[test]
    fn small_steps_while_moving_are_not_stalls() {
        let mut tracker = tracker_from(20.0);
        for i in 1..=10u64 {
            let distance = 20.0 - 0.1 * i as f64;
            let transition = tracker.observe(sample(distance, PathStatus::Moving, i * 1_000));
            assert_eq!(transition, Transition::Progressing);
        }
        assert_eq!(tracker.stalled_samples(), 0);
    }

    #[test]
    fn constant_distance_becomes_stuck_then_fails() {
        let mut tracker = tracker_from(10.0);

        assert_eq!(
            tracker.observe(sample(10.0, PathStatus::Idle, 1_000)),
            Transition::NoProgress { stalled_samples: 1 }
        );
        assert_eq!(
            tracker.observe(sample(10.0, PathStatus::Idle, 2_000)),
            Transition::NoProgress { stalled_samples: 2 }
        );
        assert_eq!(
            tracker.observe(sample(10.0, PathStatus::Idle, 3_000)),
            Transition::BecameStuck { stalled_samples: 3 }
        );
        assert_eq!(tracker.status(), MovementStatus::Stuck);
        assert_eq!(
            tracker.observe(sample(10.0, PathStatus::Idle, 4_000)),
            Transition::NoProgress { stalled_samples: 4 }
        );

        let transition = tracker.observe(sample(10.0, PathStatus::Idle, 5_000));
        match transition {
            Transition::Finished(MovementOutcome::Failed(MovementFailure::Stuck {
                stalled_samples,
                ..
            })) => assert_eq!(stalled_samples, 5),
            other => panic!("expected stuck failure, got {other:?}"),
        }
        assert_eq!(tracker.status(), MovementStatus::Failed);
    }

    #[test]
    fn jittering_samples_fail_as_stuck_well_before_timeout() {
        let mut tracker = tracker_from(10.0);
        let distances = [10.0, 9.8, 9.9, 9.85, 9.9];

        let mut last = Transition::Stale;
        for (i, distance) in distances.iter().enumerate() {
            last = tracker.observe(sample(*distance, PathStatus::Idle, (i as u64 + 1) * 1_000));
        }

        assert!(matches!(
            last,
            Transition::Finished(MovementOutcome::Failed(MovementFailure::Stuck { .. }))
        ));
        assert!(tracker.last_position().distance_to(&target()) > 9.0);
    }

    #[test]
    fn computing_samples_do_not_count_as_stalls() {
        let mut tracker = MovementTracker::new(
            start_at(10.0),
            target(),
            GoalShape::Near { range: 2.0 },
            TIMEOUT_MS,
            MovementConfig::default(),
        )
        .unwrap();
        for i in 1..=6 {
            assert_eq!(
                tracker.observe(sample(10.0, PathStatus::Computing, i * 1_000)),
                Transition::NoProgress { stalled_samples: 0 }
            );
        }
        assert_eq!(tracker.status(), MovementStatus::Computing);

        assert_eq!(
            tracker.observe(sample(8.0, PathStatus::Moving, 7_000)),
            Transition::Progressing
        );
        assert_eq!(tracker.status(), MovementStatus::Moving);
    }

    #[test]
    fn progress_after_stuck_recovers() {
        let mut tracker = tracker_from(10.0);
        for i in 1..=3 {
            tracker.observe(sample(10.0, PathStatus::Idle, i * 1_000));
        }
        assert_eq!(tracker.status(), MovementStatus::Stuck);

        let transition = tracker.observe(sample(8.0, PathStatus::Moving, 4_000));
        assert_eq!(transition, Transition::Recovered);
        assert_eq!(tracker.status(), MovementStatus::Moving);
        assert_eq!(tracker.stalled_samples(), 0);
    }

    #[test]
    fn near_target_counts_as_arrived_even_when_idle() {
        let mut tracker = tracker_from(40.0);
        tracker.observe(sample(20.0, PathStatus::Moving, 1_000));

        match tracker.observe(sample(1.5, PathStatus::Idle, 2_000)) {
            Transition::Finished(MovementOutcome::Arrived(arrival)) => {
                assert!((arrival.distance_to_target - 1.5).abs() < 1e-9);
                assert_eq!(arrival.elapsed_ms, 2_000);
            }
            other => panic!("expected arrival, got {other:?}"),
        }
        assert_eq!(tracker.status(), MovementStatus::Arrived);
    }

    #[test]
    fn hard_timeout_dominates_progress() {
        let mut tracker = tracker_from(400.0);
        let mut distance = 400.0;
        let mut elapsed = 0;
        let finished = loop {
            elapsed += 1_000;
            distance -= 5.0;
            match tracker.observe(sample(distance, PathStatus::Moving, elapsed)) {
                Transition::Progressing => continue,
                Transition::Finished(outcome) => break outcome,
                other => panic!("unexpected transition {other:?}"),
            }
        };

        assert_eq!(finished.status(), MovementStatus::TimedOut);
        assert_eq!(elapsed, TIMEOUT_MS);
    }

    #[test]
    fn deadline_check_without_samples() {
        let mut tracker = tracker_from(40.0);
        assert!(tracker.check_deadline(29_999).is_none());
        let outcome = tracker.check_deadline(30_000).unwrap();
        assert!(matches!(
            outcome,
            MovementOutcome::Failed(MovementFailure::Timeout {
                timeout_ms: 30_000,
                ..
            })
        ));
        // Only one terminal outcome.
        assert!(tracker.check_deadline(40_000).is_none());
    }

    #[test]
    fn stale_and_duplicate_samples_are_discarded() {
        let mut tracker = tracker_from(40.0);
        assert_eq!(
            tracker.observe(sample(30.0, PathStatus::Moving, 2_000)),
            Transition::Progressing
        );
        assert_eq!(
            tracker.observe(sample(35.0, PathStatus::Moving, 1_000)),
            Transition::Stale
        );
        assert_eq!(
            tracker.observe(sample(30.0, PathStatus::Moving, 2_000)),
            Transition::Stale
        );
    }

    #[test]
    fn completion_verifies_actual_distance() {
        let mut tracker = tracker_from(40.0);
        let reached = Position::new(98.4, 64.0, -200.0);
        match tracker.path_completed(reached, 12_000) {
            MovementOutcome::Arrived(arrival) => {
                assert!((arrival.distance_to_target - 1.6).abs() < 1e-9);
                assert_eq!(arrival.position, reached);
            }
            other => panic!("expected arrival, got {other:?}"),
        }
    }

    #[test]
    fn completion_far_from_target_is_no_path() {
        let mut tracker = tracker_from(40.0);
        let outcome = tracker.path_completed(start_at(15.0), 12_000);
        assert!(matches!(
            outcome,
            MovementOutcome::Failed(MovementFailure::NoPath { .. })
        ));
    }

    #[test]
    fn terminal_outcome_is_sticky() {
        let mut tracker = tracker_from(40.0);
        let cancelled = tracker.cancel();
        assert_eq!(cancelled, MovementOutcome::Failed(MovementFailure::Cancelled));
        assert_eq!(
            tracker.observe(sample(1.0, PathStatus::Idle, 1_000)),
            Transition::AlreadyFinished
        );
        assert_eq!(tracker.path_failed("late"), cancelled);
    }

    #[test]
    fn wide_goal_range_widens_acceptance() {
        let tracker = MovementTracker::new(
            start_at(40.0),
            target(),
            GoalShape::Near { range: 5.0 },
            TIMEOUT_MS,
            MovementConfig::default(),
        )
        .unwrap();
        assert_eq!(tracker.acceptance_radius(), 5.0);
    }

    #[test]
    fn progress_percent_is_clamped() {
        let tracker = tracker_from(40.0);
        assert_eq!(tracker.progress_percent(40.0), 0.0);
        assert_eq!(tracker.progress_percent(20.0), 50.0);
        assert_eq!(tracker.progress_percent(60.0), 0.0);
        assert_eq!(tracker.progress_percent(0.0), 100.0);
    }
}
