//! Command Dispatcher: turns command/response traffic into awaitable calls.
//!
//! `send` registers a waiter before the command leaves, so a response can
//! never race ahead of its waiter. The waiter ends in exactly one of:
//! matching response, local timeout, connection loss, or backlog eviction.

use std::sync::Arc;
use std::time::Duration;

use blockbot_shared::{
    methods, ActionRequest, ClientMessage, CommandEnvelope, CommandError, CommandResponse,
    ErrorCode,
};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::infrastructure::websocket::{
    lock_pending, ExecutorClient, PendingGuard, SharedPending, TransportError,
};

pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_RESPONSE_GRACE_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("{method} requires a positive timeout")]
    MissingTimeout { method: &'static str },

    #[error("command rejected before sending: {0}")]
    Rejected(CommandError),

    #[error("command id '{0}' is already in flight")]
    DuplicateId(String),

    #[error("command '{id}' timed out after {timeout_ms}ms")]
    Timeout { id: String, timeout_ms: u64 },

    #[error("connection to executor lost while waiting for a response")]
    Disconnected,

    #[error("command '{0}' was dropped from the outbound backlog")]
    Evicted(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("executor returned {}: {}", .0.code, .0.message)]
    Remote(CommandError),

    #[error("unexpected result for {method}: {message}")]
    Decode { method: &'static str, message: String },
}

impl DispatchError {
    /// The classified failure carried by an unsuccessful response.
    pub fn remote(response: CommandResponse) -> Self {
        DispatchError::Remote(CommandError::new(
            response.code.unwrap_or(ErrorCode::Unknown),
            response.error.unwrap_or_else(|| "command failed".into()),
        ))
    }

    /// Error code when the executor classified the failure.
    pub fn remote_code(&self) -> Option<ErrorCode> {
        match self {
            DispatchError::Remote(e) => Some(e.code),
            _ => None,
        }
    }

    /// True when the link, not the command, was the problem.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DispatchError::Disconnected | DispatchError::Evicted(_) | DispatchError::Transport(_)
        )
    }
}

/// A command not yet addressed. The id is generated if absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub id: Option<String>,
    pub request: ActionRequest,
    pub timeout_ms: Option<u64>,
}

impl Command {
    pub fn new(request: ActionRequest) -> Self {
        Self {
            id: None,
            request,
            timeout_ms: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

impl From<ActionRequest> for Command {
    fn from(request: ActionRequest) -> Self {
        Command::new(request)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherConfig {
    /// Used for every method except movement, which must carry its own.
    pub default_timeout: Duration,
    /// Extra wait past the command timeout so the executor's own verdict
    /// usually arrives before the local one.
    pub response_grace: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            response_grace: Duration::from_millis(DEFAULT_RESPONSE_GRACE_MS),
        }
    }
}

#[derive(Clone)]
pub struct CommandDispatcher {
    client: ExecutorClient,
    pending: SharedPending,
    config: DispatcherConfig,
}

impl CommandDispatcher {
    pub fn new(client: ExecutorClient, pending: SharedPending, config: DispatcherConfig) -> Self {
        Self {
            client,
            pending,
            config,
        }
    }

    /// Commands currently awaiting a response.
    pub fn in_flight(&self) -> usize {
        lock_pending(&self.pending).len()
    }

    /// Check and address a command without touching the network.
    ///
    /// Returns the envelope and the timeout it will be held to.
    pub fn prepare(&self, command: Command) -> Result<(CommandEnvelope, u64), DispatchError> {
        let Command {
            id,
            mut request,
            timeout_ms,
        } = command;

        let timeout_ms = match &mut request {
            ActionRequest::Goto(args) => {
                let timeout = timeout_ms
                    .or(args.timeout)
                    .filter(|t| *t > 0)
                    .ok_or(DispatchError::MissingTimeout {
                        method: methods::GOTO,
                    })?;
                args.timeout = Some(timeout);
                timeout
            }
            _ => timeout_ms
                .filter(|t| *t > 0)
                .unwrap_or(self.config.default_timeout.as_millis() as u64),
        };

        // The executor applies the same check; failing here saves a round trip.
        ActionRequest::parse(request.method(), request.args()).map_err(DispatchError::Rejected)?;

        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        Ok((CommandEnvelope::new(id, &request, Some(timeout_ms)), timeout_ms))
    }

    /// Send a command and wait for its terminal response.
    ///
    /// An unsuccessful response is still `Ok`; see [`call`](Self::call) for
    /// the typed variant.
    pub async fn send(&self, command: Command) -> Result<CommandResponse, DispatchError> {
        let (envelope, timeout_ms) = self.prepare(command)?;
        let id = envelope.id.clone();
        let method = envelope.method.clone();

        let (tx, rx) = oneshot::channel();
        lock_pending(&self.pending).insert(id.clone(), tx)?;
        let _guard = PendingGuard::new(Arc::clone(&self.pending), id.clone());

        tracing::debug!(command_id = %id, %method, timeout_ms, "Sending command");
        let exchange = async {
            if let Err(e) = self.client.send(ClientMessage::Command(envelope)).await {
                return Err(DispatchError::from(e));
            }
            rx.await.unwrap_or(Err(DispatchError::Disconnected))
        };

        let wait = Duration::from_millis(timeout_ms) + self.config.response_grace;
        match tokio::time::timeout(wait, exchange).await {
            Ok(result) => result,
            Err(_) => {
                lock_pending(&self.pending).expire(&id);
                tracing::warn!(command_id = %id, %method, timeout_ms, "Command timed out, asking executor to abort");
                self.cancel(&id);
                Err(DispatchError::Timeout { id, timeout_ms })
            }
        }
    }

    /// Send a command and decode its successful result.
    pub async fn call<T: DeserializeOwned>(
        &self,
        command: impl Into<Command>,
    ) -> Result<T, DispatchError> {
        let command = command.into();
        let method = command.request.method();
        let response = self.send(command).await?;
        if !response.success {
            return Err(DispatchError::remote(response));
        }
        response.decode().map_err(|e| DispatchError::Decode {
            method,
            message: e.to_string(),
        })
    }

    /// Ask the executor to abort command `id`. Best effort, no reply.
    pub fn cancel(&self, id: &str) -> bool {
        self.client.try_send(ClientMessage::Cancel { id: id.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::messaging::ConnectionState;
    use crate::test_support::{fake_connection, quick_dispatch};
    use blockbot_domain::{GoalShape, Position};
    use blockbot_shared::{ChatArgs, GotoArgs, InventoryResult, ItemStack};

    fn goto_without_timeout() -> ActionRequest {
        ActionRequest::Goto(GotoArgs {
            x: 10.0,
            y: 64.0,
            z: 10.0,
            timeout: None,
            goal_type: None,
            range: None,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn movement_without_timeout_is_rejected_before_sending() {
        let (connection, mut executor) = fake_connection(quick_dispatch());
        let dispatcher = connection.dispatcher();

        let err = dispatcher.send(Command::new(goto_without_timeout())).await.unwrap_err();
        assert_eq!(err, DispatchError::MissingTimeout { method: methods::GOTO });

        let err = dispatcher
            .send(Command::new(goto_without_timeout()).with_timeout_ms(0))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::MissingTimeout { .. }));
        assert!(executor.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn command_timeout_travels_into_goto_args() {
        let (connection, _executor) = fake_connection(quick_dispatch());
        let (envelope, timeout_ms) = connection
            .dispatcher()
            .prepare(Command::new(goto_without_timeout()).with_timeout_ms(4_000))
            .unwrap();
        assert_eq!(timeout_ms, 4_000);
        assert_eq!(envelope.timeout_ms, Some(4_000));
        assert_eq!(envelope.args["timeout"], 4_000);
        assert!(!envelope.id.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_arguments_never_leave_the_process() {
        let (connection, mut executor) = fake_connection(quick_dispatch());
        let err = connection
            .dispatcher()
            .send(Command::new(ActionRequest::Chat(ChatArgs {
                message: "   ".into(),
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Rejected(e) if e.code == ErrorCode::InvalidArgument));
        assert!(executor.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn response_resolves_the_matching_call() {
        let (connection, mut executor) = fake_connection(quick_dispatch());
        let dispatcher = connection.dispatcher().clone();

        let call = tokio::spawn(async move {
            dispatcher
                .call::<InventoryResult>(ActionRequest::Inventory)
                .await
        });

        let command = executor.next_command().await;
        assert_eq!(command.method, methods::INVENTORY);
        executor.respond(CommandResponse::success(
            command.id,
            &InventoryResult::from_items(vec![ItemStack {
                name: "oak_log".into(),
                count: 3,
            }]),
        ));

        let inventory = call.await.unwrap().unwrap();
        assert_eq!(inventory.count_of("oak_log"), 3);
        assert_eq!(connection.dispatcher().in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_calls_are_matched_by_id_not_order() {
        let (connection, mut executor) = fake_connection(quick_dispatch());
        let position = {
            let dispatcher = connection.dispatcher().clone();
            tokio::spawn(async move { dispatcher.call::<Position>(ActionRequest::Position).await })
        };
        let first = executor.next_command().await;
        let inventory = {
            let dispatcher = connection.dispatcher().clone();
            tokio::spawn(async move {
                dispatcher
                    .call::<InventoryResult>(ActionRequest::Inventory)
                    .await
            })
        };
        let second = executor.next_command().await;
        assert_eq!(first.method, methods::POSITION);
        assert_eq!(second.method, methods::INVENTORY);
        assert_eq!(connection.dispatcher().in_flight(), 2);

        executor.respond(CommandResponse::success(
            second.id,
            &InventoryResult::from_items(vec![ItemStack {
                name: "cobblestone".into(),
                count: 12,
            }]),
        ));
        executor.respond(CommandResponse::success(first.id, &Position::new(8.5, 70.0, -3.5)));

        assert_eq!(inventory.await.unwrap().unwrap().count_of("cobblestone"), 12);
        assert_eq!(position.await.unwrap().unwrap(), Position::new(8.5, 70.0, -3.5));
        assert_eq!(connection.dispatcher().in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_expires_waiter_and_asks_executor_to_abort() {
        let (connection, mut executor) = fake_connection(quick_dispatch());
        let dispatcher = connection.dispatcher().clone();

        let started = tokio::time::Instant::now();
        let call = tokio::spawn(async move {
            dispatcher
                .send(Command::new(ActionRequest::Position).with_timeout_ms(1_000))
                .await
        });

        let command = executor.next_command().await;
        let err = call.await.unwrap().unwrap_err();
        assert_eq!(
            err,
            DispatchError::Timeout {
                id: command.id.clone(),
                timeout_ms: 1_000
            }
        );
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(1_000));
        assert!(waited <= Duration::from_millis(1_000) + quick_dispatch().response_grace);

        assert_eq!(
            executor.recv().await,
            ClientMessage::Cancel {
                id: command.id.clone()
            }
        );

        // A late answer finds nobody waiting and is dropped.
        executor.respond(CommandResponse::success(command.id, &Position::default()));
        tokio::task::yield_now().await;
        assert_eq!(connection.dispatcher().in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_fails_waiters_early() {
        let (connection, mut executor) = fake_connection(quick_dispatch());
        let dispatcher = connection.dispatcher().clone();

        let call = tokio::spawn(async move {
            dispatcher
                .send(Command::new(ActionRequest::Inventory).with_timeout_ms(60_000))
                .await
        });
        executor.next_command().await;

        let started = tokio::time::Instant::now();
        executor.set_state(ConnectionState::Reconnecting);
        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err, DispatchError::Disconnected);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_in_flight_id_is_refused() {
        let (connection, mut executor) = fake_connection(quick_dispatch());
        let dispatcher = connection.dispatcher().clone();

        let first = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher
                    .send(Command::new(ActionRequest::Position).with_id("same"))
                    .await
            })
        };
        executor.next_command().await;

        let err = dispatcher
            .send(Command::new(ActionRequest::Inventory).with_id("same"))
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::DuplicateId("same".into()));

        executor.respond(CommandResponse::success("same", &Position::new(1.0, 64.0, 1.0)));
        assert!(first.await.unwrap().unwrap().success);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_response_becomes_remote_error() {
        let (connection, mut executor) = fake_connection(quick_dispatch());
        let dispatcher = connection.dispatcher().clone();

        let call = tokio::spawn(async move {
            dispatcher
                .call::<serde_json::Value>(Command::new(ActionRequest::Goto(GotoArgs::new(
                    Position::new(5.0, 64.0, 5.0),
                    5_000,
                    GoalShape::Exact,
                ))))
                .await
        });
        let command = executor.next_command().await;
        executor.respond(CommandResponse::failure(command.id, ErrorCode::NoPath, "blocked"));

        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err.remote_code(), Some(ErrorCode::NoPath));
        assert!(!err.is_connection_error());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_transport_rejects_immediately() {
        let (connection, mut executor) = fake_connection(quick_dispatch());
        executor.set_state(ConnectionState::Failed);
        tokio::task::yield_now().await;

        let err = connection
            .dispatcher()
            .send(Command::new(ActionRequest::Position))
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::Transport(TransportError::Failed));
        assert!(executor.try_recv().is_none());
    }
}
