//! Movement Controller.
//!
//! Supervises one `pathfinder.goto` from the agent side. The executor runs
//! its own supervision, but the agent does not trust it alone: it follows
//! the progress events, applies the same arrival and stuck rules through a
//! [`MovementTracker`], and enforces the caller's hard timeout on its own
//! clock. Whichever side reaches a verdict first ends the movement.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use blockbot_domain::{
    DomainError, GoalShape, MovementConfig, MovementFailure, MovementOutcome, MovementTracker,
    Position, ProgressSample, Transition,
};
use blockbot_shared::{
    methods, ActionRequest, CommandError, CommandResponse, ErrorCode, EventEnvelope, GotoArgs,
    GotoResult, PathfindingProgress, PositionResult, StopResult, GOTO_COMPLETED,
};
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::narration::ProgressNarrator;
use crate::infrastructure::messaging::{Command, CommandDispatcher, DispatchError, EventBus};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MovementError {
    #[error("movement requires a positive timeout")]
    MissingTimeout,

    #[error("invalid movement request: {0}")]
    Invalid(String),

    #[error("another movement is already in progress ({0})")]
    Busy(String),

    #[error("movement timed out after {elapsed_ms}ms (limit {timeout_ms}ms)")]
    Timeout { timeout_ms: u64, elapsed_ms: u64 },

    #[error("no path to target: {0}")]
    NoPath(String),

    #[error("bot is stuck {distance_remaining:.1} blocks from target")]
    Stuck {
        distance_remaining: f64,
        stalled_samples: u32,
    },

    #[error("movement was cancelled")]
    Cancelled,

    #[error(transparent)]
    Transport(DispatchError),

    #[error("executor returned {}: {}", .0.code, .0.message)]
    Remote(CommandError),
}

impl MovementError {
    /// Wire classification, when one applies.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            MovementError::MissingTimeout => Some(ErrorCode::MissingArgument),
            MovementError::Invalid(_) => Some(ErrorCode::InvalidArgument),
            MovementError::Busy(_) => Some(ErrorCode::Busy),
            MovementError::Timeout { .. } => Some(ErrorCode::Timeout),
            MovementError::NoPath(_) => Some(ErrorCode::NoPath),
            MovementError::Stuck { .. } => Some(ErrorCode::Stuck),
            MovementError::Cancelled => Some(ErrorCode::Cancelled),
            MovementError::Transport(_) => None,
            MovementError::Remote(e) => Some(e.code),
        }
    }
}

impl From<MovementFailure> for MovementError {
    fn from(failure: MovementFailure) -> Self {
        match failure {
            MovementFailure::Timeout {
                timeout_ms,
                elapsed_ms,
                ..
            } => MovementError::Timeout {
                timeout_ms,
                elapsed_ms,
            },
            MovementFailure::Stuck {
                distance_remaining,
                stalled_samples,
            } => MovementError::Stuck {
                distance_remaining,
                stalled_samples,
            },
            MovementFailure::NoPath { reason } => MovementError::NoPath(reason),
            MovementFailure::Cancelled => MovementError::Cancelled,
        }
    }
}

impl From<DomainError> for MovementError {
    fn from(e: DomainError) -> Self {
        MovementError::Invalid(e.to_string())
    }
}

impl From<DispatchError> for MovementError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Remote(e) | DispatchError::Rejected(e) => MovementError::Remote(e),
            DispatchError::MissingTimeout { .. } => MovementError::MissingTimeout,
            other => MovementError::Transport(other),
        }
    }
}

/// Where to go and how long it may take.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveRequest {
    pub target: Position,
    /// Hard limit in milliseconds. Required.
    pub timeout_ms: Option<u64>,
    /// Defaults to `near` with the configured range.
    pub goal: Option<GoalShape>,
}

impl MoveRequest {
    pub fn new(target: Position, timeout_ms: u64) -> Self {
        Self {
            target,
            timeout_ms: Some(timeout_ms),
            goal: None,
        }
    }

    pub fn with_goal(mut self, goal: GoalShape) -> Self {
        self.goal = Some(goal);
        self
    }
}

struct ActiveMove {
    command_id: String,
    token: CancellationToken,
}

/// How the supervision loop ended.
enum Verdict {
    /// Decided locally while the goto command was still outstanding.
    Local(MovementOutcome),
    /// The executor answered (or the dispatcher gave up on it).
    Answered(Result<CommandResponse, DispatchError>),
}

pub struct MovementController {
    dispatcher: CommandDispatcher,
    events: EventBus,
    config: MovementConfig,
    active: Mutex<Option<ActiveMove>>,
}

impl MovementController {
    pub fn new(dispatcher: CommandDispatcher, events: EventBus, config: MovementConfig) -> Self {
        Self {
            dispatcher,
            events,
            config,
            active: Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.lock_active().is_some()
    }

    /// Abort the running movement. Returns false if none was running.
    pub fn cancel(&self) -> bool {
        match self.lock_active().as_ref() {
            Some(active) => {
                tracing::info!(command_id = %active.command_id, "Cancelling movement");
                active.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Walk to `request.target`.
    ///
    /// A second call while one is running fails with `Busy`.
    pub async fn goto(&self, request: MoveRequest) -> Result<GotoResult, MovementError> {
        let timeout_ms = request
            .timeout_ms
            .filter(|t| *t > 0)
            .ok_or(MovementError::MissingTimeout)?;
        let target = request.target;
        target.validate_bounds()?;
        let goal = match request.goal {
            Some(goal) => {
                GoalShape::from_wire(Some(goal.kind()), goal.range(), self.config.default_goal_range)?
            }
            None => GoalShape::Near {
                range: self.config.default_goal_range,
            },
        };

        let command_id = Uuid::new_v4().to_string();
        let token = CancellationToken::new();
        let _slot = self.claim(&command_id, token.clone())?;

        // The whole movement, start query included, runs inside the caller's budget.
        let started = Instant::now();
        let deadline = started + Duration::from_millis(timeout_ms);
        let query = Command::new(ActionRequest::Position).with_timeout_ms(timeout_ms);
        let start: PositionResult = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(MovementError::Cancelled),
            _ = sleep_until(deadline) => {
                let elapsed_ms = elapsed_ms(started);
                tracing::warn!(command_id = %command_id, timeout_ms, elapsed_ms, "No start position before the movement deadline");
                return Err(MovementError::Timeout { timeout_ms, elapsed_ms });
            }
            start = self.dispatcher.call::<PositionResult>(query) => start?,
        };
        let mut tracker = MovementTracker::new(start, target, goal, timeout_ms, self.config.clone())?;

        tracing::info!(
            command_id = %command_id,
            destination = %target,
            distance = tracker.initial_distance(),
            timeout_ms,
            goal = goal.kind(),
            "Starting movement"
        );

        // Subscribe before sending so no progress event can slip past.
        let progress_rx = self.events.subscribe();
        let remaining_ms = timeout_ms.saturating_sub(elapsed_ms(started)).max(1);
        let command = Command::new(ActionRequest::Goto(GotoArgs::new(target, remaining_ms, goal)))
            .with_id(command_id.clone())
            .with_timeout_ms(remaining_ms);

        let verdict = self
            .supervise(&command_id, command, &mut tracker, progress_rx, started, &token)
            .await;

        match verdict {
            Verdict::Local(outcome) => {
                self.dispatcher.cancel(&command_id);
                if !outcome.is_arrived() {
                    self.halt_executor(&command_id);
                }
                finish(&command_id, target, outcome)
            }
            Verdict::Answered(Ok(response)) => self.answered(&command_id, &mut tracker, response, started),
            Verdict::Answered(Err(e)) => {
                if let DispatchError::Timeout { .. } = e {
                    self.halt_executor(&command_id);
                    let outcome = timed_out(&mut tracker, elapsed_ms(started));
                    return finish(&command_id, target, outcome);
                }
                tracing::warn!(command_id = %command_id, error = %e, "Movement command failed");
                Err(e.into())
            }
        }
    }

    async fn supervise(
        &self,
        command_id: &str,
        command: Command,
        tracker: &mut MovementTracker,
        mut progress_rx: broadcast::Receiver<EventEnvelope>,
        started: Instant,
        token: &CancellationToken,
    ) -> Verdict {
        let target = tracker.target();
        let send = self.dispatcher.send(command);
        tokio::pin!(send);

        let deadline = sleep_until(started + Duration::from_millis(tracker.timeout_ms()));
        tokio::pin!(deadline);

        let interval = self.config.sample_interval;
        let mut ticker = interval_at(started + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut narrator = ProgressNarrator::new(self.config.narration_interval);
        let mut latest: Option<PathfindingProgress> = None;
        let mut events_open = true;

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => return Verdict::Local(tracker.cancel()),

                _ = &mut deadline => {
                    return Verdict::Local(timed_out(tracker, elapsed_ms(started)));
                }

                answer = &mut send => return Verdict::Answered(answer),

                event = progress_rx.recv(), if events_open => match event {
                    Ok(event) => {
                        let Some(progress) = event.progress().filter(|p| p.targets(&target)) else {
                            continue;
                        };
                        tracker.path_started();
                        if latest.as_ref().map_or(true, |l| progress.elapsed_ms > l.elapsed_ms) {
                            latest = Some(progress);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(command_id, skipped, "Progress subscriber lagged");
                    }
                    Err(RecvError::Closed) => events_open = false,
                },

                _ = ticker.tick() => {
                    let Some(progress) = latest.take() else {
                        continue;
                    };
                    let sample = ProgressSample::new(
                        progress.current_position,
                        progress.distance_remaining,
                        progress.path_status,
                        progress.elapsed_ms,
                    );
                    let transition = tracker.observe(sample);
                    if let Some(line) = narrator.narrate(Instant::now(), tracker, &progress, &transition) {
                        tracing::info!(command_id, "{line}");
                    }
                    match transition {
                        Transition::Finished(outcome) => return Verdict::Local(outcome),
                        Transition::BecameStuck { stalled_samples } => {
                            tracing::warn!(command_id, stalled_samples, distance = progress.distance_remaining, "Bot appears stuck");
                        }
                        Transition::Stale => {
                            tracing::debug!(command_id, elapsed = progress.elapsed_ms, "Discarded stale sample");
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// The executor answered the goto before any local verdict.
    fn answered(
        &self,
        command_id: &str,
        tracker: &mut MovementTracker,
        response: CommandResponse,
        started: Instant,
    ) -> Result<GotoResult, MovementError> {
        let target = tracker.target();
        if !response.success {
            let error = DispatchError::remote(response);
            tracing::warn!(command_id, error = %error, "Executor reported movement failure");
            return Err(classify_remote(error, tracker, elapsed_ms(started)));
        }

        let result: GotoResult = response.decode().map_err(|e| {
            MovementError::Transport(DispatchError::Decode {
                method: methods::GOTO,
                message: e.to_string(),
            })
        })?;

        // The executor's "completed" is checked against where the bot stands.
        let outcome = tracker.path_completed(result.actual_position, elapsed_ms(started));
        match outcome {
            MovementOutcome::Arrived(arrival) => {
                tracing::info!(
                    command_id,
                    distance_to_target = arrival.distance_to_target,
                    duration_ms = result.duration_ms,
                    "Arrived"
                );
                Ok(GotoResult {
                    target_position: target,
                    actual_position: arrival.position,
                    distance_to_target: arrival.distance_to_target,
                    status: GOTO_COMPLETED.to_string(),
                    duration_ms: result.duration_ms,
                })
            }
            failed => finish(command_id, target, failed),
        }
    }

    /// Ask the executor to stop pathfinding without holding up the caller.
    fn halt_executor(&self, command_id: &str) {
        let dispatcher = self.dispatcher.clone();
        let command_id = command_id.to_string();
        tokio::spawn(async move {
            match dispatcher.call::<StopResult>(ActionRequest::Stop).await {
                Ok(result) => {
                    tracing::debug!(command_id = %command_id, stopped = result.stopped, "Stopped executor pathfinder");
                }
                Err(e) => {
                    tracing::warn!(command_id = %command_id, error = %e, "Failed to stop executor pathfinder");
                }
            }
        });
    }

    fn claim(&self, command_id: &str, token: CancellationToken) -> Result<ActiveSlot<'_>, MovementError> {
        let mut active = self.lock_active();
        if let Some(current) = active.as_ref() {
            return Err(MovementError::Busy(current.command_id.clone()));
        }
        *active = Some(ActiveMove {
            command_id: command_id.to_string(),
            token,
        });
        Ok(ActiveSlot {
            controller: self,
            command_id: command_id.to_string(),
        })
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveMove>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Frees the movement slot however the movement ends.
struct ActiveSlot<'a> {
    controller: &'a MovementController,
    command_id: String,
}

impl Drop for ActiveSlot<'_> {
    fn drop(&mut self) {
        let mut active = self.controller.lock_active();
        if active
            .as_ref()
            .is_some_and(|a| a.command_id == self.command_id)
        {
            *active = None;
        }
    }
}

fn finish(command_id: &str, target: Position, outcome: MovementOutcome) -> Result<GotoResult, MovementError> {
    match outcome {
        MovementOutcome::Arrived(arrival) => {
            tracing::info!(
                command_id,
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
            tracing::warn!(command_id, error = %failure, "Movement failed");
            Err(failure.into())
        }
    }
}

/// Map an executor-side failure onto the local classification.
fn classify_remote(error: DispatchError, tracker: &MovementTracker, elapsed: u64) -> MovementError {
    let DispatchError::Remote(remote) = error else {
        return MovementError::Transport(error);
    };
    match remote.code {
        ErrorCode::Timeout => MovementError::Timeout {
            timeout_ms: tracker.timeout_ms(),
            elapsed_ms: elapsed,
        },
        ErrorCode::Stuck => MovementError::Stuck {
            distance_remaining: tracker.last_position().distance_to(&tracker.target()),
            stalled_samples: tracker.stalled_samples(),
        },
        ErrorCode::NoPath => MovementError::NoPath(remote.message),
        ErrorCode::Cancelled => MovementError::Cancelled,
        ErrorCode::Busy => MovementError::Busy(remote.message),
        _ => MovementError::Remote(remote),
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
