//! Application state and composition.

use std::sync::Arc;

use blockbot_domain::MovementConfig;

use crate::infrastructure::event_emitter::EventEmitter;
use crate::infrastructure::ports::GameWorld;
use crate::use_cases::{ActionHandlers, CommandRouter, Pathfinder};

/// Main application state.
///
/// Passed to HTTP/WebSocket handlers via Axum state.
pub struct App {
    pub world: Arc<dyn GameWorld>,
    pub events: Arc<EventEmitter>,
    pub use_cases: UseCases,
}

/// Container for all use cases.
pub struct UseCases {
    pub pathfinder: Arc<Pathfinder>,
    pub actions: Arc<ActionHandlers>,
    pub commands: Arc<CommandRouter>,
}

impl App {
    pub fn new(world: Arc<dyn GameWorld>, events: Arc<EventEmitter>, movement: MovementConfig) -> Self {
        let pathfinder = Arc::new(Pathfinder::new(world.clone(), events.clone(), movement));
        let actions = Arc::new(ActionHandlers::new(world.clone(), events.clone()));
        let commands = Arc::new(CommandRouter::new(pathfinder.clone(), actions.clone()));

        Self {
            world,
            events,
            use_cases: UseCases {
                pathfinder,
                actions,
                commands,
            },
        }
    }
}
