use std::str::FromStr;
use std::time::Duration;

use crate::DomainError;

/// Tuning for movement supervision.
///
/// The defaults were found empirically against a live server; deployments
/// override them through configuration rather than code changes.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementConfig {
    /// Remaining distance below which the bot counts as arrived.
    pub arrival_epsilon: f64,
    /// Smallest change in remaining distance that counts as progress.
    pub stuck_epsilon: f64,
    /// Consecutive non-improving samples before entering `stuck`.
    pub stuck_threshold: u32,
    /// Further non-improving samples tolerated while `stuck` before failing.
    pub stuck_extra: u32,
    /// Cadence at which progress is sampled.
    pub sample_interval: Duration,
    /// Minimum gap between human-readable progress lines.
    pub narration_interval: Duration,
    /// Range used when a caller asks for a `near` goal without one.
    pub default_goal_range: f64,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            arrival_epsilon: 2.0,
            stuck_epsilon: 0.5,
            stuck_threshold: 3,
            stuck_extra: 2,
            sample_interval: Duration::from_secs(1),
            narration_interval: Duration::from_secs(5),
            default_goal_range: 2.0,
        }
    }
}

impl MovementConfig {
    /// Number of consecutive stalled samples that fails the movement.
    pub fn stuck_failure_samples(&self) -> u32 {
        self.stuck_threshold.saturating_add(self.stuck_extra)
    }

    /// Overlay `BLOCKBOT_*` settings onto the defaults.
    ///
    /// `lookup` returns the raw value for a variable name, so callers decide
    /// where settings come from.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DomainError> {
        let defaults = Self::default();
        let config = Self {
            arrival_epsilon: read(&lookup, "BLOCKBOT_ARRIVAL_EPSILON")?
                .unwrap_or(defaults.arrival_epsilon),
            stuck_epsilon: read(&lookup, "BLOCKBOT_STUCK_EPSILON")?
                .unwrap_or(defaults.stuck_epsilon),
            stuck_threshold: read(&lookup, "BLOCKBOT_STUCK_THRESHOLD")?
                .unwrap_or(defaults.stuck_threshold),
            stuck_extra: read(&lookup, "BLOCKBOT_STUCK_EXTRA")?.unwrap_or(defaults.stuck_extra),
            sample_interval: read(&lookup, "BLOCKBOT_SAMPLE_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.sample_interval),
            narration_interval: read(&lookup, "BLOCKBOT_NARRATION_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.narration_interval),
            default_goal_range: read(&lookup, "BLOCKBOT_DEFAULT_GOAL_RANGE")?
                .unwrap_or(defaults.default_goal_range),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(DomainError::validation(format!("{name} must be positive, got {value}")))
            }
        };
        positive("arrival epsilon", self.arrival_epsilon)?;
        positive("stuck epsilon", self.stuck_epsilon)?;
        positive("default goal range", self.default_goal_range)?;
        if self.stuck_threshold == 0 {
            return Err(DomainError::validation("stuck threshold must be at least 1"));
        }
        if self.sample_interval.is_zero() {
            return Err(DomainError::validation("sample interval must be positive"));
        }
        Ok(())
    }
}

fn read<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, DomainError> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| DomainError::parse(format!("{name}: cannot parse '{raw}'"))),
    }
}
