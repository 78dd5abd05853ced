//! Runtime-independent pieces of the executor client: the pending-waiter
//! arena and reconnect backoff math.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use blockbot_shared::CommandResponse;
use rand::Rng;
use tokio::sync::oneshot;

use super::shared::ReconnectPolicy;
use crate::infrastructure::messaging::DispatchError;

pub type WaiterResult = Result<CommandResponse, DispatchError>;
pub type Waiter = oneshot::Sender<WaiterResult>;

/// Waiters for in-flight commands, keyed by command id.
///
/// Every exit removes the entry before completing it, so an id is resolved
/// at most once no matter which path gets there first.
#[derive(Default)]
pub struct PendingRequests {
    inner: HashMap<String, Waiter>,
}

impl PendingRequests {
    /// Register a waiter. Ids must be unique among in-flight commands.
    pub fn insert(&mut self, id: String, waiter: Waiter) -> Result<(), DispatchError> {
        if self.inner.contains_key(&id) {
            return Err(DispatchError::DuplicateId(id));
        }
        self.inner.insert(id, waiter);
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Hand a response to its waiter.
    ///
    /// Returns false when nobody is waiting (timed out, or never sent).
    pub fn resolve(&mut self, response: CommandResponse) -> bool {
        match self.inner.remove(&response.id) {
            Some(waiter) => {
                let _ = waiter.send(Ok(response));
                true
            }
            None => false,
        }
    }

    /// Fail one waiter.
    pub fn fail(&mut self, id: &str, error: DispatchError) -> bool {
        match self.inner.remove(id) {
            Some(waiter) => {
                let _ = waiter.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Drop a waiter without completing it.
    pub fn expire(&mut self, id: &str) -> bool {
        self.inner.remove(id).is_some()
    }

    /// Fail every waiter, returning how many there were.
    pub fn fail_all(&mut self, error: impl Fn() -> DispatchError) -> usize {
        let count = self.inner.len();
        for (_, waiter) in self.inner.drain() {
            let _ = waiter.send(Err(error()));
        }
        count
    }
}

pub type SharedPending = Arc<Mutex<PendingRequests>>;

pub(crate) fn lock_pending(pending: &Mutex<PendingRequests>) -> MutexGuard<'_, PendingRequests> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Expires its waiter when the awaiting future goes away.
pub(crate) struct PendingGuard {
    pending: SharedPending,
    id: String,
}

impl PendingGuard {
    pub(crate) fn new(pending: SharedPending, id: String) -> Self {
        Self { pending, id }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        lock_pending(&self.pending).expire(&self.id);
    }
}

/// Exponential backoff state shared by reconnect logic.
#[derive(Debug, Clone)]
pub struct BackoffState {
    policy: ReconnectPolicy,
    attempts: u32,
    delay: Duration,
}

impl BackoffState {
    pub fn new(policy: ReconnectPolicy) -> Self {
        let delay = policy.initial_delay;
        Self {
            policy,
            attempts: 0,
            delay,
        }
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.delay = self.policy.initial_delay;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.policy.max_attempts
    }

    /// Advance to the next attempt.
    ///
    /// Returns the (jittered) delay to wait before this attempt, or `None`
    /// once the attempt budget is spent.
    pub fn next_delay_and_advance(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }

        let base = self.delay;
        self.attempts += 1;
        self.delay = base
            .mul_f64(self.policy.multiplier.max(1.0))
            .min(self.policy.max_delay);
        Some(self.jittered(base))
    }

    fn jittered(&self, base: Duration) -> Duration {
        let jitter = self.policy.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return base;
        }
        let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        base.mul_f64(factor)
    }
}
