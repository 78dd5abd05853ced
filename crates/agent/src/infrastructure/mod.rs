//! Infrastructure: the executor link and the messaging built on it.

pub mod messaging;
pub mod websocket;
