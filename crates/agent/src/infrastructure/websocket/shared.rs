//! Types shared between the transport task and its callers.

use std::time::Duration;

use blockbot_shared::{ClientMessage, ServerMessage};
use thiserror::Error;
use url::Url;

use crate::infrastructure::messaging::ConnectionState;

// Reconnection defaults
pub const INITIAL_RETRY_DELAY_MS: u64 = 1_000;
pub const MAX_RETRY_DELAY_MS: u64 = 30_000;
pub const MAX_RETRY_ATTEMPTS: u32 = 10;
pub const BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_JITTER: f64 = 0.2;

pub const DEFAULT_OUTBOUND_BACKLOG: usize = 256;
pub const DEFAULT_HEARTBEAT_MS: u64 = 15_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Capped exponential backoff with jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Consecutive failed attempts before giving up.
    pub max_attempts: u32,
    /// Each delay is scaled by a random factor in `1 ± jitter`.
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(INITIAL_RETRY_DELAY_MS),
            max_delay: Duration::from_millis(MAX_RETRY_DELAY_MS),
            multiplier: BACKOFF_MULTIPLIER,
            max_attempts: MAX_RETRY_ATTEMPTS,
            jitter: DEFAULT_JITTER,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub url: Url,
    pub reconnect: ReconnectPolicy,
    /// Messages held while the socket is down.
    pub outbound_backlog: usize,
    pub heartbeat_interval: Duration,
    pub connect_timeout: Duration,
}

impl TransportConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            reconnect: ReconnectPolicy::default(),
            outbound_backlog: DEFAULT_OUTBOUND_BACKLOG,
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection to executor failed after exhausting reconnect attempts")]
    Failed,
    #[error("transport is shut down")]
    Closed,
    #[error("executor not reachable yet")]
    NotConnected,
}

/// What the transport task reports to the bridge, in order.
#[derive(Debug)]
pub enum TransportEvent {
    State(ConnectionState),
    Message(Box<ServerMessage>),
    /// A queued message was dropped to make room in the backlog.
    Evicted(ClientMessage),
}

pub fn parse_server_message(text: &str) -> Result<ServerMessage, serde_json::Error> {
    serde_json::from_str(text)
}
