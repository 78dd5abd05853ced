//! Blockbot Agent - command line client for a running engine.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use blockbot_agent::{AgentConfig, BotActions, Connection, MoveRequest, MovementController};
use blockbot_domain::{BlockPos, DomainError, Face, GoalShape, Position};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Executor WebSocket URL (overrides BLOCKBOT_EXECUTOR_URL).
    #[arg(long)]
    url: Option<String>,
    /// How long to wait for the first connection, in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    connect_wait_ms: u64,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Walk to a point under supervision.
    #[command(allow_negative_numbers = true)]
    Goto {
        x: f64,
        y: f64,
        z: f64,
        /// Hard limit in milliseconds.
        #[arg(long)]
        timeout: u64,
        /// Acceptance range for a `near` goal.
        #[arg(long)]
        range: Option<f64>,
        #[arg(long, value_enum, default_value_t = GoalKind::Near)]
        goal: GoalKind,
    },
    /// Stop any pathfinding.
    Stop,
    /// List inventory contents.
    Inventory,
    /// Print the bot's position.
    Position,
    /// Break a block.
    #[command(allow_negative_numbers = true)]
    Dig { x: i32, y: i32, z: i32 },
    /// Place a block against a face of the given block.
    #[command(allow_negative_numbers = true)]
    Place {
        x: i32,
        y: i32,
        z: i32,
        #[arg(long, default_value = "top", value_parser = parse_face)]
        face: Face,
        /// Item to place; defaults to the first placeable item.
        #[arg(long)]
        block: Option<String>,
    },
    /// Describe a block.
    #[command(allow_negative_numbers = true)]
    Block { x: i32, y: i32, z: i32 },
    /// Craft an item.
    Craft {
        item: String,
        #[arg(default_value_t = 1)]
        count: u32,
    },
    /// Say something in chat.
    Chat {
        #[arg(required = true, trailing_var_arg = true)]
        message: Vec<String>,
    },
    /// Find blocks whose name contains NAME, nearest first.
    Find {
        name: String,
        #[arg(long, default_value_t = 32)]
        max_distance: u32,
        #[arg(long, default_value_t = 5)]
        count: u32,
    },
    /// List players near the bot.
    Players {
        #[arg(long, default_value_t = 64)]
        max_distance: u32,
    },
    /// Print executor events as they arrive.
    Events {
        #[arg(long, default_value_t = 60)]
        seconds: u64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum GoalKind {
    Exact,
    Near,
    Adjacent,
}

fn parse_face(raw: &str) -> Result<Face, String> {
    raw.parse().map_err(|e: DomainError| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv_from_repo_root();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blockbot_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = AgentConfig::from_env()?;
    if let Some(raw) = &cli.url {
        config.transport.url = Url::parse(raw).with_context(|| format!("invalid --url '{raw}'"))?;
    }

    tracing::info!(url = %config.transport.url, "Connecting to executor");
    let connection = Connection::open(config.transport.clone(), config.dispatch.clone());
    connection
        .wait_until_connected(Duration::from_millis(cli.connect_wait_ms))
        .await
        .context("executor unreachable")?;

    let outcome = run(cli.command, &connection, &config).await;
    connection.shutdown();
    outcome
}

async fn run(command: Commands, connection: &Connection, config: &AgentConfig) -> anyhow::Result<()> {
    let actions = BotActions::new(connection.dispatcher().clone());

    match command {
        Commands::Goto {
            x,
            y,
            z,
            timeout,
            range,
            goal,
        } => {
            let goal = match goal {
                GoalKind::Exact => GoalShape::Exact,
                GoalKind::Adjacent => GoalShape::Adjacent,
                GoalKind::Near => GoalShape::Near {
                    range: range.unwrap_or(config.movement.default_goal_range),
                },
            };
            let controller = Arc::new(MovementController::new(
                connection.dispatcher().clone(),
                connection.events().clone(),
                config.movement.clone(),
            ));

            let interrupt = {
                let controller = Arc::clone(&controller);
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        controller.cancel();
                    }
                })
            };
            let request = MoveRequest::new(Position::new(x, y, z), timeout).with_goal(goal);
            let result = controller.goto(request).await;
            interrupt.abort();
            print_json(&result?)
        }
        Commands::Stop => print_json(&actions.stop().await?),
        Commands::Inventory => print_json(&actions.inventory().await?),
        Commands::Position => print_json(&actions.position().await?),
        Commands::Dig { x, y, z } => print_json(&actions.dig(BlockPos::new(x, y, z)).await?),
        Commands::Place {
            x,
            y,
            z,
            face,
            block,
        } => print_json(&actions.place(BlockPos::new(x, y, z), face, block).await?),
        Commands::Block { x, y, z } => print_json(&actions.block_at(BlockPos::new(x, y, z)).await?),
        Commands::Craft { item, count } => print_json(&actions.craft(&item, count).await?),
        Commands::Chat { message } => print_json(&actions.chat(&message.join(" ")).await?),
        Commands::Find {
            name,
            max_distance,
            count,
        } => print_json(&actions.find_blocks(&name, max_distance, count).await?),
        Commands::Players { max_distance } => {
            print_json(&actions.nearby_players(max_distance).await?)
        }
        Commands::Events { seconds } => {
            let mut events = connection.events().subscribe();
            let until = tokio::time::sleep(Duration::from_secs(seconds));
            tokio::pin!(until);
            loop {
                tokio::select! {
                    _ = &mut until => break,
                    _ = tokio::signal::ctrl_c() => break,
                    event = events.recv() => match event {
                        Ok(event) => print_json(&event)?,
                        Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "Fell behind the event stream"),
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}
