//! Executor WebSocket client using tokio-tungstenite.
//!
//! One background task owns the socket. It reconnects with capped
//! exponential backoff, holds outbound messages in a bounded backlog while
//! the socket is down, and reports state changes and inbound messages, in
//! order, on a channel read by the bridge.

use std::sync::atomic::AtomicU8;
use std::sync::Arc;
use std::time::Duration;

use blockbot_shared::{ClientMessage, OutboundClass, OutboundQueue};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::core::{lock_pending, BackoffState, SharedPending};
use super::shared::{parse_server_message, TransportConfig, TransportError, TransportEvent};
use crate::infrastructure::messaging::connection::set_connection_state;
use crate::infrastructure::messaging::{ConnectionState, ConnectionStateObserver};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

const OUTBOUND_CHANNEL_BUFFER: usize = 64;

/// Handle to the transport task. Cheap to clone.
#[derive(Clone)]
pub struct ExecutorClient {
    outbound: mpsc::Sender<ClientMessage>,
    state: ConnectionStateObserver,
    shutdown: CancellationToken,
}

impl ExecutorClient {
    /// Start connecting in the background.
    ///
    /// Transport events arrive on the returned receiver in the order they
    /// happened. Commands whose id has left `pending` by the time they would
    /// be written are dropped instead of sent.
    pub fn spawn(
        config: TransportConfig,
        pending: SharedPending,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (task, client, events_rx) = TransportTask::new(config, pending);
        tokio::spawn(task.run());
        (client, events_rx)
    }

    /// A client whose outbound side is a plain channel, for driving the
    /// layers above the socket without a network.
    #[cfg(test)]
    pub(crate) fn loopback(
        state: Arc<AtomicU8>,
    ) -> (Self, mpsc::Receiver<ClientMessage>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_BUFFER);
        let client = Self {
            outbound: outbound_tx,
            state: ConnectionStateObserver::new(state),
            shutdown: CancellationToken::new(),
        };
        (client, outbound_rx)
    }

    pub fn state(&self) -> ConnectionState {
        self.state.state()
    }

    pub fn observer(&self) -> ConnectionStateObserver {
        self.state.clone()
    }

    /// Queue a message for the executor.
    ///
    /// Succeeds while connected or reconnecting; fails immediately once the
    /// transport has given up or been shut down.
    pub async fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        self.check_open()?;
        self.outbound
            .send(message)
            .await
            .map_err(|_| self.closed_error())
    }

    /// Queue a message without waiting for channel space.
    ///
    /// Returns false if it could not be queued.
    pub fn try_send(&self, message: ClientMessage) -> bool {
        if self.check_open().is_err() {
            return false;
        }
        match self.outbound.try_send(message) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Dropping best-effort message");
                false
            }
        }
    }

    /// Close the socket and stop reconnecting.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn check_open(&self) -> Result<(), TransportError> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }
        match self.state() {
            ConnectionState::Failed => Err(TransportError::Failed),
            _ => Ok(()),
        }
    }

    fn closed_error(&self) -> TransportError {
        match self.state() {
            ConnectionState::Failed => TransportError::Failed,
            _ => TransportError::Closed,
        }
    }
}

// =============================================================================
// Transport task
// =============================================================================

enum SessionEnd {
    /// Socket dropped; reconnect.
    Lost,
    /// Shutdown requested or every client handle dropped.
    Closed,
}

struct TransportTask {
    config: TransportConfig,
    state: Arc<AtomicU8>,
    outbound: mpsc::Receiver<ClientMessage>,
    backlog: OutboundQueue<ClientMessage>,
    events: mpsc::UnboundedSender<TransportEvent>,
    shutdown: CancellationToken,
    pending: SharedPending,
}

impl TransportTask {
    fn new(
        config: TransportConfig,
        pending: SharedPending,
    ) -> (Self, ExecutorClient, mpsc::UnboundedReceiver<TransportEvent>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_BUFFER);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let state = Arc::new(AtomicU8::new(ConnectionState::Connecting.to_u8()));
        let shutdown = CancellationToken::new();

        let task = Self {
            backlog: OutboundQueue::new(config.outbound_backlog),
            config,
            state: Arc::clone(&state),
            outbound: outbound_rx,
            events: events_tx,
            shutdown: shutdown.clone(),
            pending,
        };
        let client = ExecutorClient {
            outbound: outbound_tx,
            state: ConnectionStateObserver::new(state),
            shutdown,
        };
        (task, client, events_rx)
    }

    async fn run(mut self) {
        let mut backoff = BackoffState::new(self.config.reconnect.clone());
        self.set_state(ConnectionState::Connecting);

        loop {
            match self.connect().await {
                Ok(ws) => {
                    backoff.reset();
                    tracing::info!(url = %self.config.url, "Connected to executor");
                    self.set_state(ConnectionState::Connected);
                    match self.run_session(ws).await {
                        SessionEnd::Closed => break,
                        SessionEnd::Lost => {
                            let dropped = self.backlog.drain().len();
                            if dropped > 0 {
                                tracing::warn!(dropped, "Discarded unsent messages from lost session");
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(attempt = backoff.attempts(), error = %e, "Connection attempt failed");
                }
            }

            if self.shutdown.is_cancelled() {
                break;
            }

            self.set_state(ConnectionState::Reconnecting);
            let Some(delay) = backoff.next_delay_and_advance() else {
                tracing::error!(
                    attempts = backoff.attempts(),
                    "Max reconnection attempts reached, giving up"
                );
                self.set_state(ConnectionState::Failed);
                self.discard_backlog();
                return;
            };
            tracing::info!(
                attempt = backoff.attempts(),
                max_attempts = backoff.max_attempts(),
                delay_ms = delay.as_millis() as u64,
                "Reconnecting to executor"
            );
            if !self.wait_queueing(delay).await {
                break;
            }
        }

        self.set_state(ConnectionState::Disconnected);
        self.discard_backlog();
    }

    async fn connect(&self) -> anyhow::Result<WsStream> {
        let attempt = tokio::time::timeout(
            self.config.connect_timeout,
            connect_async(self.config.url.as_str()),
        );
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(anyhow::anyhow!("shutdown requested")),
            result = attempt => match result {
                Ok(Ok((ws, _response))) => Ok(ws),
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(anyhow::anyhow!(
                    "timed out after {}ms",
                    self.config.connect_timeout.as_millis()
                )),
            },
        }
    }

    async fn run_session(&mut self, ws: WsStream) -> SessionEnd {
        let (mut write, mut read) = ws.split();

        while let Some(message) = self.backlog.pop_front() {
            if self.is_abandoned(&message) {
                continue;
            }
            if let Err(e) = write_message(&mut write, &message).await {
                tracing::warn!(error = %e, "Failed to flush backlog");
                return SessionEnd::Lost;
            }
        }

        let period = self.config.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Closed;
                }
                incoming = read.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.receive(&text),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => self.receive(&text),
                        Err(_) => tracing::warn!("Ignoring non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Executor closed connection");
                        return SessionEnd::Lost;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "WebSocket error");
                        return SessionEnd::Lost;
                    }
                    None => return SessionEnd::Lost,
                },
                outgoing = self.outbound.recv() => match outgoing {
                    Some(message) if self.is_abandoned(&message) => {}
                    Some(message) => {
                        if let Err(e) = write_message(&mut write, &message).await {
                            tracing::warn!(error = %e, "Failed to send message");
                            return SessionEnd::Lost;
                        }
                    }
                    None => {
                        let _ = write.send(Message::Close(None)).await;
                        return SessionEnd::Closed;
                    }
                },
                _ = heartbeat.tick() => {
                    if let Err(e) = write_message(&mut write, &ClientMessage::Heartbeat).await {
                        tracing::warn!(error = %e, "Heartbeat failed");
                        return SessionEnd::Lost;
                    }
                }
            }
        }
    }

    /// Sleep out a backoff delay while still accepting outbound messages.
    ///
    /// Returns false if the transport should stop instead of reconnecting.
    async fn wait_queueing(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                _ = &mut sleep => return true,
                message = self.outbound.recv() => match message {
                    Some(message) => self.enqueue(message),
                    None => return false,
                },
            }
        }
    }

    fn enqueue(&mut self, message: ClientMessage) {
        if self.is_abandoned(&message) {
            return;
        }
        let class = match &message {
            ClientMessage::Command(_) => OutboundClass::Command,
            ClientMessage::Heartbeat | ClientMessage::Unknown => return,
            ClientMessage::Cancel { .. } => OutboundClass::Event,
        };
        if let Some((class, evicted)) = self.backlog.push(message, class) {
            tracing::warn!(?class, backlog = self.backlog.len(), "Outbound backlog full, dropped oldest");
            let _ = self.events.send(TransportEvent::Evicted(evicted));
        }
    }

    /// A command whose caller has already been answered, typically failed
    /// by a disconnect that overtook it.
    fn is_abandoned(&self, message: &ClientMessage) -> bool {
        let ClientMessage::Command(command) = message else {
            return false;
        };
        if lock_pending(&self.pending).contains(&command.id) {
            return false;
        }
        tracing::debug!(command_id = %command.id, method = %command.method, "Dropping command nobody is waiting for");
        true
    }

    fn receive(&self, text: &str) {
        match parse_server_message(text) {
            Ok(message) => {
                let _ = self.events.send(TransportEvent::Message(Box::new(message)));
            }
            Err(e) => tracing::warn!(error = %e, "Failed to parse executor message"),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        set_connection_state(&self.state, state);
        tracing::debug!(%state, "Connection state changed");
        let _ = self.events.send(TransportEvent::State(state));
    }

    fn discard_backlog(&mut self) {
        let dropped = self.backlog.drain().len();
        if dropped > 0 {
            tracing::warn!(dropped, "Discarded queued messages");
        }
    }
}

async fn write_message(
    write: &mut WsSink,
    message: &ClientMessage,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize WebSocket message");
            return Ok(());
        }
    };
    write.send(Message::Text(json)).await
}
