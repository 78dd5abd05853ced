//! WebSocket link to the executor
//!
//! - `client`: tokio-tungstenite transport task with reconnection
//! - `core`: pending-waiter arena and backoff math
//! - `bridge`: wires the transport to the dispatcher and event bus

mod bridge;
mod client;
mod core;
mod shared;

pub use bridge::Connection;
pub use client::ExecutorClient;
pub use shared::{ReconnectPolicy, TransportConfig, TransportError, TransportEvent};

pub(crate) use self::core::{lock_pending, PendingGuard, SharedPending};
pub use self::core::{BackoffState, PendingRequests};
