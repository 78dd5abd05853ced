//! Engine configuration from the environment.

use std::net::SocketAddr;

use blockbot_domain::{DomainError, MovementConfig, Position};

use crate::infrastructure::simulated_world::DEFAULT_WALK_SPEED;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name}: cannot parse '{value}'")]
    Invalid { name: &'static str, value: String },
    #[error("Invalid movement settings: {0}")]
    Movement(#[from] DomainError),
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub listen: SocketAddr,
    /// Source id stamped on every event.
    pub bot_id: String,
    pub spawn: Position,
    pub walk_speed: f64,
    /// Events held while no agent is connected.
    pub event_backlog: usize,
    pub movement: MovementConfig,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("BLOCKBOT_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = lookup("BLOCKBOT_PORT")
            .or_else(|| lookup("PORT"))
            .unwrap_or_else(|| "3000".into());
        let listen_raw = format!("{host}:{port}");
        let listen = listen_raw.parse().map_err(|_| ConfigError::Invalid {
            name: "BLOCKBOT_HOST/BLOCKBOT_PORT",
            value: listen_raw.clone(),
        })?;

        let spawn = match lookup("BLOCKBOT_SPAWN") {
            Some(raw) => parse_position(&raw).ok_or(ConfigError::Invalid {
                name: "BLOCKBOT_SPAWN",
                value: raw,
            })?,
            None => Position::new(0.5, 64.0, 0.5),
        };

        let walk_speed = match lookup("BLOCKBOT_WALK_SPEED") {
            Some(raw) => match raw.trim().parse::<f64>() {
                Ok(speed) if speed > 0.0 => speed,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "BLOCKBOT_WALK_SPEED",
                        value: raw,
                    })
                }
            },
            None => DEFAULT_WALK_SPEED,
        };

        let event_backlog = match lookup("BLOCKBOT_EVENT_BACKLOG") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "BLOCKBOT_EVENT_BACKLOG",
                value: raw,
            })?,
            None => 256,
        };

        Ok(Self {
            listen,
            bot_id: lookup("BLOCKBOT_BOT_ID").unwrap_or_else(|| "blockbot".into()),
            spawn,
            walk_speed,
            event_backlog,
            movement: MovementConfig::from_lookup(&lookup)?,
        })
    }
}

/// Parse `x,y,z`.
fn parse_position(raw: &str) -> Option<Position> {
    let mut parts = raw.split(',').map(|p| p.trim().parse::<f64>());
    let (x, y, z) = (parts.next()?.ok()?, parts.next()?.ok()?, parts.next()?.ok()?);
    if parts.next().is_some() {
        return None;
    }
    let position = Position::new(x, y, z);
    position.validate_bounds().ok()?;
    Some(position)
}
