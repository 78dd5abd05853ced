//! Infrastructure implementations.
//!
//! Contains port trait implementations for external dependencies.

pub mod clock;
pub mod event_emitter;
pub mod ports;
pub mod simulated_world;
