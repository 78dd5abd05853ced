//! Blockbot Engine - Main entry point.

use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blockbot_engine::api::{self, AgentConnections, WsState};
use blockbot_engine::config::EngineConfig;
use blockbot_engine::infrastructure::{
    clock::SystemClock, event_emitter::EventEmitter, event_emitter::EventPayload,
    ports::GameWorld, simulated_world::SimulatedWorld,
};
use blockbot_engine::App;
use blockbot_shared::event_types;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from repo root (the engine may be started from `crates/engine`).
    load_dotenv_from_repo_root();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blockbot_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Blockbot Engine");

    let config = EngineConfig::from_env()?;
    tracing::info!(
        bot_id = %config.bot_id,
        spawn = %config.spawn,
        walk_speed = config.walk_speed,
        sample_interval_ms = config.movement.sample_interval.as_millis() as u64,
        "Configuration loaded"
    );

    let world: Arc<dyn GameWorld> = Arc::new(SimulatedWorld::new(config.spawn, config.walk_speed));
    let connections = Arc::new(AgentConnections::new(config.event_backlog));
    let events = Arc::new(EventEmitter::new(
        config.bot_id.clone(),
        connections.clone(),
        Arc::new(SystemClock::new()),
    ));

    // Held in the backlog until the first agent connects.
    events.emit(
        event_types::SPAWN,
        EventPayload::new().field("position", &world.position().await?),
        None,
    );

    let app = Arc::new(App::new(world, events, config.movement.clone()));
    let ws_state = Arc::new(WsState { app, connections });

    let router = api::router(ws_state).layer(TraceLayer::new_for_http());

    tracing::info!("Listening on {}", config.listen);

    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}
