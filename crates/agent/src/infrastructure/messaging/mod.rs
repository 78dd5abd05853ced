//! Command and event messaging over the executor link.
//!
//! - `CommandDispatcher`: awaitable request/response calls
//! - `EventBus`: fan-out of executor events
//! - `ConnectionState`: link lifecycle, observable from anywhere

pub mod connection;
pub mod dispatcher;
pub mod event_bus;

pub use connection::{ConnectionState, ConnectionStateObserver};
pub use dispatcher::{Command, CommandDispatcher, DispatchError, DispatcherConfig};
pub use event_bus::EventBus;
