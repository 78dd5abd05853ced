//! Blockbot Agent library.
//!
//! The command-issuing side of the bridge: a reconnecting WebSocket link to
//! the executor, awaitable commands over it, a fan-out of executor events,
//! and supervised movement on top.
//!
//! ## Structure
//!
//! - `infrastructure/` - WebSocket transport, dispatcher, event bus
//! - `application/` - Movement controller and typed actions
//! - `config` - Environment configuration

pub mod application;
pub mod config;
pub mod infrastructure;

/// Scripted executor for unit tests.
#[cfg(test)]
pub(crate) mod test_support;

pub use application::{BotActions, MoveRequest, MovementController, MovementError};
pub use config::AgentConfig;
pub use infrastructure::messaging::{Command, CommandDispatcher, ConnectionState, DispatchError, EventBus};
pub use infrastructure::websocket::{Connection, TransportError};
