//! Command routing.
//!
//! Turns a [`CommandEnvelope`] into exactly one [`CommandResponse`]. Every
//! command in flight is registered under its id with a cancellation token so
//! that a `cancel` message or a dropped connection can abort it.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use blockbot_shared::{
    ActionRequest, CommandEnvelope, CommandError, CommandResponse, ErrorCode,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::actions::{ActionError, ActionHandlers};
use super::pathfinder::{Pathfinder, PathfinderError};

impl From<PathfinderError> for CommandError {
    fn from(e: PathfinderError) -> Self {
        match e {
            PathfinderError::Rejected(inner) => inner,
            other => CommandError::new(other.code(), other.to_string()),
        }
    }
}

impl From<ActionError> for CommandError {
    fn from(e: ActionError) -> Self {
        match e {
            ActionError::Rejected(inner) => inner,
            other => CommandError::new(other.code(), other.to_string()),
        }
    }
}

pub struct CommandRouter {
    pathfinder: Arc<Pathfinder>,
    actions: Arc<ActionHandlers>,
    in_flight: DashMap<String, CancellationToken>,
}

impl CommandRouter {
    pub fn new(pathfinder: Arc<Pathfinder>, actions: Arc<ActionHandlers>) -> Self {
        Self {
            pathfinder,
            actions,
            in_flight: DashMap::new(),
        }
    }

    /// Number of commands currently executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Cancel an in-flight command. Returns false if the id is unknown.
    pub fn cancel(&self, id: &str) -> bool {
        match self.in_flight.get(id) {
            Some(token) => {
                token.cancel();
                tracing::info!(command_id = id, "Command cancelled by issuer");
                true
            }
            None => false,
        }
    }

    /// Execute one command. Always produces a response carrying the
    /// envelope's id, success or not.
    pub async fn execute(
        &self,
        envelope: CommandEnvelope,
        parent: &CancellationToken,
    ) -> CommandResponse {
        let CommandEnvelope {
            id,
            method,
            args,
            timeout_ms,
        } = envelope;

        let request = match ActionRequest::parse(&method, args) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(command_id = %id, method = %method, error = %e, "Rejected command");
                return e.into_response(id);
            }
        };

        let token = parent.child_token();
        let _registration = match self.register(&id, token.clone()) {
            Some(registration) => registration,
            None => {
                return CommandError::invalid_argument(format!(
                    "command id '{id}' is already in flight"
                ))
                .into_response(id)
            }
        };

        tracing::debug!(command_id = %id, method = request.method(), "Executing command");
        let limit = timeout_ms.filter(|ms| *ms > 0).map(Duration::from_millis);

        let response = match request {
            ActionRequest::Goto(args) => {
                reply(&id, self.pathfinder.goto(&id, &args, &token).await)
            }
            ActionRequest::Stop => reply(&id, self.pathfinder.stop().await),
            ActionRequest::Dig(args) => {
                reply(&id, guarded(&token, limit, self.actions.dig(&args)).await)
            }
            ActionRequest::PlaceBlock(args) => {
                reply(&id, guarded(&token, limit, self.actions.place(&args)).await)
            }
            ActionRequest::Craft(args) => {
                reply(&id, guarded(&token, limit, self.actions.craft(&args)).await)
            }
            ActionRequest::Inventory => {
                reply(&id, guarded(&token, limit, self.actions.inventory()).await)
            }
            ActionRequest::Position => {
                reply(&id, guarded(&token, limit, self.actions.position()).await)
            }
            ActionRequest::GetBlock(args) => {
                reply(&id, guarded(&token, limit, self.actions.get_block(&args)).await)
            }
            ActionRequest::Chat(args) => {
                reply(&id, guarded(&token, limit, self.actions.chat(&args)).await)
            }
            ActionRequest::FindBlocks(args) => {
                reply(&id, guarded(&token, limit, self.actions.find_blocks(&args)).await)
            }
            ActionRequest::NearbyPlayers(args) => {
                reply(&id, guarded(&token, limit, self.actions.nearby_players(&args)).await)
            }
        };

        if let Some(code) = response.code {
            tracing::info!(command_id = %id, method = %method, %code, "Command failed");
        }
        response
    }

    fn register(&self, id: &str, token: CancellationToken) -> Option<Registration<'_>> {
        match self.in_flight.entry(id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(token);
                Some(Registration {
                    in_flight: &self.in_flight,
                    id: id.to_string(),
                })
            }
        }
    }
}

/// Removes a command from the in-flight table when it completes.
struct Registration<'a> {
    in_flight: &'a DashMap<String, CancellationToken>,
    id: String,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.id);
    }
}

fn reply<T, E>(id: &str, result: Result<T, E>) -> CommandResponse
where
    T: Serialize + Debug,
    E: Into<CommandError>,
{
    match result {
        Ok(value) => CommandResponse::success(id, &value),
        Err(e) => e.into().into_response(id),
    }
}

/// Run a one-shot action under the command's cancellation token and its
/// optional executor-side time limit.
async fn guarded<T>(
    token: &CancellationToken,
    limit: Option<Duration>,
    action: impl Future<Output = Result<T, ActionError>>,
) -> Result<T, CommandError> {
    let bounded = async {
        let outcome = match limit {
            Some(limit) => match tokio::time::timeout(limit, action).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(CommandError::new(
                        ErrorCode::Timeout,
                        format!("action exceeded {}ms", limit.as_millis()),
                    ))
                }
            },
            None => action.await,
        };
        outcome.map_err(CommandError::from)
    };

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(CommandError::new(ErrorCode::Cancelled, "command was cancelled")),
        result = bounded => result,
    }
}
