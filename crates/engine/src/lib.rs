//! Blockbot Engine library.
//!
//! Executes bot commands against a game world and streams world events back
//! to connected agents.
//!
//! ## Structure
//!
//! - `use_cases/` - Pathfinding supervision, action handlers, command routing
//! - `infrastructure/` - World and event-delivery ports plus their adapters
//! - `api/` - HTTP and WebSocket entry points
//! - `app` - Application composition
//! - `config` - Environment configuration

pub mod api;
pub mod app;
pub mod config;
pub mod infrastructure;
pub mod use_cases;

/// Shared helpers for unit tests.
#[cfg(test)]
pub mod test_fixtures;

pub use app::App;
