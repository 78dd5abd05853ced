//! Agent configuration from the environment.

use std::str::FromStr;
use std::time::Duration;

use blockbot_domain::{DomainError, MovementConfig};
use url::Url;

use crate::infrastructure::messaging::DispatcherConfig;
use crate::infrastructure::websocket::TransportConfig;

const DEFAULT_EXECUTOR_URL: &str = "ws://127.0.0.1:3000/ws";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name}: cannot parse '{value}'")]
    Invalid { name: &'static str, value: String },
    #[error("BLOCKBOT_EXECUTOR_URL must be a ws:// or wss:// URL, got '{0}'")]
    Scheme(String),
    #[error("Invalid movement settings: {0}")]
    Movement(#[from] DomainError),
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub transport: TransportConfig,
    pub dispatch: DispatcherConfig,
    pub movement: MovementConfig,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_url = lookup("BLOCKBOT_EXECUTOR_URL").unwrap_or_else(|| DEFAULT_EXECUTOR_URL.into());
        let url = Url::parse(raw_url.trim()).map_err(|_| ConfigError::Invalid {
            name: "BLOCKBOT_EXECUTOR_URL",
            value: raw_url.clone(),
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::Scheme(raw_url));
        }

        let mut transport = TransportConfig::new(url);
        let reconnect = &mut transport.reconnect;
        if let Some(ms) = read::<u64>(&lookup, "BLOCKBOT_RECONNECT_INITIAL_MS")? {
            reconnect.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = read::<u64>(&lookup, "BLOCKBOT_RECONNECT_MAX_MS")? {
            reconnect.max_delay = Duration::from_millis(ms);
        }
        if let Some(attempts) = read(&lookup, "BLOCKBOT_RECONNECT_ATTEMPTS")? {
            reconnect.max_attempts = attempts;
        }
        if let Some(jitter) = read::<f64>(&lookup, "BLOCKBOT_RECONNECT_JITTER")? {
            if !(0.0..=1.0).contains(&jitter) {
                return Err(ConfigError::Invalid {
                    name: "BLOCKBOT_RECONNECT_JITTER",
                    value: jitter.to_string(),
                });
            }
            reconnect.jitter = jitter;
        }
        if let Some(backlog) = read(&lookup, "BLOCKBOT_OUTBOUND_BACKLOG")? {
            transport.outbound_backlog = backlog;
        }
        if let Some(ms) = read::<u64>(&lookup, "BLOCKBOT_HEARTBEAT_MS")? {
            transport.heartbeat_interval = Duration::from_millis(ms.max(1));
        }

        let mut dispatch = DispatcherConfig::default();
        if let Some(ms) = read::<u64>(&lookup, "BLOCKBOT_COMMAND_TIMEOUT_MS")? {
            if ms == 0 {
                return Err(ConfigError::Invalid {
                    name: "BLOCKBOT_COMMAND_TIMEOUT_MS",
                    value: ms.to_string(),
                });
            }
            dispatch.default_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = read::<u64>(&lookup, "BLOCKBOT_RESPONSE_GRACE_MS")? {
            dispatch.response_grace = Duration::from_millis(ms);
        }

        Ok(Self {
            transport,
            dispatch,
            movement: MovementConfig::from_lookup(&lookup)?,
        })
    }
}

fn read<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AgentConfig, ConfigError> {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();
        AgentConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()))
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.transport.url.as_str(), DEFAULT_EXECUTOR_URL);
        assert_eq!(config.transport.reconnect.max_attempts, 10);
        assert_eq!(config.dispatch, DispatcherConfig::default());
        assert_eq!(config.movement, MovementConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let config = config(&[
            ("BLOCKBOT_EXECUTOR_URL", "wss://bots.example.net/ws"),
            ("BLOCKBOT_RECONNECT_ATTEMPTS", "3"),
            ("BLOCKBOT_RECONNECT_INITIAL_MS", "250"),
            ("BLOCKBOT_COMMAND_TIMEOUT_MS", "2500"),
            ("BLOCKBOT_OUTBOUND_BACKLOG", "16"),
            ("BLOCKBOT_ARRIVAL_EPSILON", "1.5"),
        ])
        .unwrap();
        assert_eq!(config.transport.url.host_str(), Some("bots.example.net"));
        assert_eq!(config.transport.reconnect.max_attempts, 3);
        assert_eq!(config.transport.reconnect.initial_delay, Duration::from_millis(250));
        assert_eq!(config.transport.outbound_backlog, 16);
        assert_eq!(config.dispatch.default_timeout, Duration::from_millis(2_500));
        assert_eq!(config.movement.arrival_epsilon, 1.5);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            config(&[("BLOCKBOT_EXECUTOR_URL", "http://127.0.0.1:3000/ws")]),
            Err(ConfigError::Scheme(_))
        ));
        assert!(matches!(
            config(&[("BLOCKBOT_EXECUTOR_URL", "not a url")]),
            Err(ConfigError::Invalid { name: "BLOCKBOT_EXECUTOR_URL", .. })
        ));
        assert!(matches!(
            config(&[("BLOCKBOT_RECONNECT_JITTER", "1.5")]),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            config(&[("BLOCKBOT_COMMAND_TIMEOUT_MS", "0")]),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            config(&[("BLOCKBOT_STUCK_EPSILON", "-1")]),
            Err(ConfigError::Movement(_))
        ));
    }
}
