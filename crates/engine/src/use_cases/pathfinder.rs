//! Pathfinder use case.
//!
//! Executor side of `pathfinder.goto` / `pathfinder.stop`. Starts the world's
//! pathfinder, samples it on a fixed cadence, publishes a progress event per
//! sample, and lets a [`MovementTracker`] decide when the movement is over.
//! The hard timeout is a separate timer and is never extended by progress.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use blockbot_domain::{
    MovementConfig, MovementFailure, MovementOutcome, MovementTracker, ProgressSample, Transition,
};
use blockbot_shared::{
    event_types, CommandError, ErrorCode, EventPriority, GotoArgs, GotoResult, PathfindingProgress,
    StopResult, GOTO_COMPLETED,
};
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::infrastructure::event_emitter::{EventEmitter, EventPayload};
use crate::infrastructure::ports::{GameWorld, PathCompletion, WorldError};

#[derive(Debug, thiserror::Error)]
pub enum PathfinderError {
    #[error("Another movement is already in progress ({0})")]
    Busy(String),
    #[error(transparent)]
    Rejected(#[from] CommandError),
    #[error(transparent)]
    Movement(#[from] MovementFailure),
    #[error(transparent)]
    World(#[from] WorldError),
}

impl PathfinderError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PathfinderError::Busy(_) => ErrorCode::Busy,
            PathfinderError::Rejected(e) => e.code,
            PathfinderError::Movement(MovementFailure::Timeout { .. }) => ErrorCode::Timeout,
            PathfinderError::Movement(MovementFailure::Stuck { .. }) => ErrorCode::Stuck,
            PathfinderError::Movement(MovementFailure::NoPath { .. }) => ErrorCode::NoPath,
            PathfinderError::Movement(MovementFailure::Cancelled) => ErrorCode::Cancelled,
            PathfinderError::World(WorldError::NoPath(_)) => ErrorCode::NoPath,
            PathfinderError::World(WorldError::PluginUnavailable) => ErrorCode::PluginUnavailable,
            PathfinderError::World(WorldError::ActionFailed(_)) => ErrorCode::ActionFailed,
            PathfinderError::World(WorldError::NotConnected) => ErrorCode::Internal,
        }
    }
}

struct ActiveMovement {
    operation_id: String,
    token: CancellationToken,
}

pub struct Pathfinder {
    world: Arc<dyn GameWorld>,
    events: Arc<EventEmitter>,
    config: MovementConfig,
    active: Mutex<Option<ActiveMovement>>,
}

impl Pathfinder {
    pub fn new(world: Arc<dyn GameWorld>, events: Arc<EventEmitter>, config: MovementConfig) -> Self {
        Self {
            world,
            events,
            config,
            active: Mutex::new(None),
        }
    }

    /// Id of the movement currently running, if any.
    pub fn active_operation(&self) -> Option<String> {
        self.lock_active().as_ref().map(|a| a.operation_id.clone())
    }

    /// Walk to the requested target.
    ///
    /// Only one movement runs at a time; a second request is rejected with
    /// `Busy` rather than queued or allowed to supersede the first.
    pub async fn goto(
        &self,
        operation_id: &str,
        args: &GotoArgs,
        cancel: &CancellationToken,
    ) -> Result<GotoResult, PathfinderError> {
        let timeout_ms = match args.timeout {
            Some(ms) if ms > 0 => ms,
            _ => {
                return Err(CommandError::missing_argument(
                    "timeout is required for pathfinder.goto",
                )
                .into())
            }
        };
        let goal = args.goal(self.config.default_goal_range)?;
        let target = args.target();

        let token = cancel.child_token();
        let _slot = self.claim(operation_id, token.clone())?;

        let start = self.world.position().await?;
        let mut tracker = MovementTracker::new(start, target, goal, timeout_ms, self.config.clone())
            .map_err(|e| CommandError::invalid_argument(e.to_string()))?;

        tracing::info!(
            operation_id,
            destination = %target,
            distance = tracker.initial_distance(),
            timeout_ms,
            goal = goal.kind(),
            "Starting pathfinding"
        );

        let started = Instant::now();
        if let Err(e) = self.world.start_pathfinding(target, goal).await {
            tracing::warn!(operation_id, error = %e, "Pathfinder refused goal");
            return Err(match e {
                WorldError::NoPath(reason) => match tracker.path_failed(reason) {
                    MovementOutcome::Failed(failure) => failure.into(),
                    MovementOutcome::Arrived(_) => PathfinderError::World(WorldError::NoPath(
                        "pathfinder refused goal".into(),
                    )),
                },
                other => other.into(),
            });
        }

        let (outcome, world_idle) = self.supervise(operation_id, &mut tracker, started, &token).await;

        if !world_idle {
            self.halt_world(operation_id).await;
        }

        match outcome {
            MovementOutcome::Arrived(arrival) => {
                tracing::info!(
                    operation_id,
                    distance_to_target = arrival.distance_to_target,
                    duration_ms = arrival.elapsed_ms,
                    "Arrived"
                );
                Ok(GotoResult {
                    target_position: target,
                    actual_position: arrival.position,
                    distance_to_target: arrival.distance_to_target,
                    status: GOTO_COMPLETED.to_string(),
                    duration_ms: arrival.elapsed_ms,
                })
            }
            MovementOutcome::Failed(failure) => {
                tracing::warn!(operation_id, error = %failure, "Movement failed");
                Err(failure.into())
            }
        }
    }

    /// Cancel the running movement and halt the world's pathfinder.
    pub async fn stop(&self) -> Result<StopResult, PathfinderError> {
        let active = self.lock_active().as_ref().map(|a| a.token.clone());
        let had_active = active.is_some();
        if let Some(token) = active {
            token.cancel();
        }
        let world_was_moving = self.world.stop_pathfinding().await?;
        Ok(StopResult {
            stopped: had_active || world_was_moving,
        })
    }

    /// Run the sampling loop until the tracker reaches a terminal outcome.
    ///
    /// Returns the outcome and whether the world's pathfinder already ended
    /// on its own.
    async fn supervise(
        &self,
        operation_id: &str,
        tracker: &mut MovementTracker,
        started: Instant,
        token: &CancellationToken,
    ) -> (MovementOutcome, bool) {
        let deadline = sleep_until(started + Duration::from_millis(tracker.timeout_ms()));
        tokio::pin!(deadline);

        let interval = self.config.sample_interval;
        let mut ticker = interval_at(started + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => {
                    tracing::info!(operation_id, "Movement cancelled");
                    return (tracker.cancel(), false);
                }

                _ = &mut deadline => {
                    return (timed_out(tracker, elapsed_ms(started)), false);
                }

                _ = ticker.tick() => {
                    let state = match self.world.path_state().await {
                        Ok(state) => state,
                        Err(e) => {
                            tracing::warn!(operation_id, error = %e, "Failed to sample path state");
                            continue;
                        }
                    };
                    let elapsed = elapsed_ms(started);
                    let distance = state.position.distance_to(&tracker.target());
                    let sample = ProgressSample::new(state.position, distance, state.status, elapsed);
                    self.publish_progress(operation_id, tracker, &sample);

                    match state.completion {
                        Some(PathCompletion::Reached) => {
                            return (tracker.path_completed(state.position, elapsed), true);
                        }
                        Some(PathCompletion::Failed(reason)) => {
                            return (tracker.path_failed(reason), true);
                        }
                        None => {}
                    }

                    match tracker.observe(sample) {
                        Transition::Finished(outcome) => return (outcome, false),
                        Transition::BecameStuck { stalled_samples } => {
                            tracing::warn!(operation_id, stalled_samples, distance, "Bot appears stuck");
                        }
                        Transition::Recovered => {
                            tracing::info!(operation_id, distance, "Bot is moving again");
                        }
                        Transition::Stale => {
                            tracing::debug!(operation_id, elapsed, "Discarded stale sample");
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    fn publish_progress(&self, operation_id: &str, tracker: &MovementTracker, sample: &ProgressSample) {
        let covered = tracker.initial_distance() - sample.distance_remaining;
        let estimated_remaining_ms = (covered > 0.0 && sample.elapsed_ms > 0).then(|| {
            let rate = covered / sample.elapsed_ms as f64;
            (sample.distance_remaining / rate) as u64
        });
        let progress = PathfindingProgress {
            operation_id: Some(operation_id.to_string()),
            target: tracker.target(),
            current_position: sample.position,
            distance_remaining: sample.distance_remaining,
            path_status: sample.path_status,
            elapsed_ms: sample.elapsed_ms,
            progress_percent: tracker.progress_percent(sample.distance_remaining),
            estimated_remaining_ms,
            status_message: format!(
                "{:.1} blocks to {} ({})",
                sample.distance_remaining,
                tracker.target(),
                sample.path_status
            ),
        };
        self.events.emit(
            event_types::PATHFINDER_PROGRESS,
            EventPayload::from_struct(&progress),
            Some(EventPriority::Low),
        );
    }

    async fn halt_world(&self, operation_id: &str) {
        match self.world.stop_pathfinding().await {
            Ok(true) => tracing::debug!(operation_id, "Stopped world pathfinder"),
            Ok(false) => {}
            Err(e) => tracing::warn!(operation_id, error = %e, "Failed to stop world pathfinder"),
        }
    }

    fn claim(&self, operation_id: &str, token: CancellationToken) -> Result<ActiveSlot<'_>, PathfinderError> {
        let mut active = self.lock_active();
        if let Some(current) = active.as_ref() {
            return Err(PathfinderError::Busy(current.operation_id.clone()));
        }
        *active = Some(ActiveMovement {
            operation_id: operation_id.to_string(),
            token,
        });
        Ok(ActiveSlot {
            pathfinder: self,
            operation_id: operation_id.to_string(),
        })
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveMovement>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Releases the single movement slot when the movement ends, however it ends.
struct ActiveSlot<'a> {
    pathfinder: &'a Pathfinder,
    operation_id: String,
}

impl Drop for ActiveSlot<'_> {
    fn drop(&mut self) {
        let mut active = self.pathfinder.lock_active();
        if active
            .as_ref()
            .is_some_and(|a| a.operation_id == self.operation_id)
        {
            *active = None;
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn timed_out(tracker: &mut MovementTracker, elapsed: u64) -> MovementOutcome {
    tracker
        .check_deadline(elapsed.max(tracker.timeout_ms()))
        .or_else(|| tracker.outcome().cloned())
        .unwrap_or(MovementOutcome::Failed(MovementFailure::Timeout {
            timeout_ms: tracker.timeout_ms(),
            elapsed_ms: elapsed,
            last_position: tracker.last_position(),
        }))
}
