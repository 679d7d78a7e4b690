//! Push-channel session lifecycle.
//!
//! Owns the persistent connection: connect, authenticate, join the
//! filter-scoped room, reconnect with jittered exponential backoff, and
//! heartbeat. Connection failures are retried automatically up to the
//! attempt cap and surfaced as state, never thrown to callers.

use crate::config::ReconnectConfig;
use crate::transport::{PushConnection, PushTransport, TransportEvent};
use reviewroom_api::{ClientMessage, ServerEvent};
use reviewroom_core::RoomKey;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

/// Connection lifecycle states.
///
/// `disconnected -> connecting -> connected -> disconnected`, with
/// `connecting|connected -> error -> connecting` on the reconnect path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        }
    }
}

/// Events forwarded from the session task to the coordinator's dispatch
/// loop.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(ConnectionState),
    /// A decoded server event from the subscribed room.
    Server(ServerEvent),
    /// Reconnect attempts are exhausted; push stays down until the next
    /// subscribe re-arms it.
    ReconnectsExhausted { reason: String },
}

enum SessionCommand {
    Subscribe(RoomKey),
    Unsubscribe,
    Send(ClientMessage),
    Shutdown,
}

/// Handle to the spawned session task.
pub struct SessionManager {
    commands: mpsc::UnboundedSender<SessionCommand>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl SessionManager {
    /// Spawn the connection task. It starts connecting immediately.
    pub fn spawn(
        transport: Arc<dyn PushTransport>,
        reconnect: ReconnectConfig,
        heartbeat_interval: Duration,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let task = tokio::spawn(
            SessionTask {
                transport,
                reconnect,
                heartbeat_interval,
                commands: commands_rx,
                state: state_tx,
                events,
                room: None,
            }
            .run(),
        );
        Self {
            commands: commands_tx,
            state: state_rx,
            task,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Join the room for a filter scope. The room is remembered so a
    /// reconnect rejoins it.
    pub fn subscribe(&self, room: RoomKey) {
        let _ = self.commands.send(SessionCommand::Subscribe(room));
    }

    /// Leave the currently held room. Idempotent if no room is held.
    pub fn unsubscribe(&self) {
        let _ = self.commands.send(SessionCommand::Unsubscribe);
    }

    /// Send a message if the channel is connected. Returns whether the
    /// message was handed to the live connection.
    pub fn send(&self, message: ClientMessage) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.commands.send(SessionCommand::Send(message)).is_ok()
    }

    /// Scoped teardown: leave the room, then close. Safe to call more
    /// than once.
    pub fn shutdown(&self) {
        let _ = self.commands.send(SessionCommand::Shutdown);
    }

    /// Wait for the session task to finish after [`Self::shutdown`].
    pub async fn stopped(self) {
        let _ = self.task.await;
    }
}

enum Driven {
    Shutdown,
    ConnectionLost { reason: String },
}

struct SessionTask {
    transport: Arc<dyn PushTransport>,
    reconnect: ReconnectConfig,
    heartbeat_interval: Duration,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    state: watch::Sender<ConnectionState>,
    events: mpsc::UnboundedSender<SessionEvent>,
    room: Option<RoomKey>,
}

impl SessionTask {
    async fn run(mut self) {
        let mut attempts: u32 = 0;
        let mut backoff_ms = self.reconnect.initial_ms;

        loop {
            self.set_state(ConnectionState::Connecting);
            // Commands stay live while the connect attempt is in flight,
            // so a shutdown never waits on a hung handshake.
            let result = tokio::select! {
                result = self.transport.connect() => Some(result),
                _ = offline_commands(&mut self.commands, &mut self.room) => None,
            };
            let result = match result {
                Some(result) => result,
                None => {
                    self.set_state(ConnectionState::Disconnected);
                    return;
                }
            };
            match result {
                Ok(connection) => {
                    attempts = 0;
                    backoff_ms = self.reconnect.initial_ms;
                    info!("push channel connected");
                    self.set_state(ConnectionState::Connected);
                    match self.drive(connection).await {
                        Driven::Shutdown => {
                            self.set_state(ConnectionState::Disconnected);
                            return;
                        }
                        Driven::ConnectionLost { reason } => {
                            warn!(reason = %reason, "push channel lost, reconnecting");
                            self.set_state(ConnectionState::Disconnected);
                        }
                    }
                }
                Err(err) => {
                    attempts += 1;
                    warn!(error = %err, attempt = attempts, "push connect failed");
                    self.set_state(ConnectionState::Error);
                    if attempts >= self.reconnect.max_attempts {
                        let _ = self.events.send(SessionEvent::ReconnectsExhausted {
                            reason: err.to_string(),
                        });
                        if !self.park().await {
                            self.set_state(ConnectionState::Disconnected);
                            return;
                        }
                        attempts = 0;
                        backoff_ms = self.reconnect.initial_ms;
                        continue;
                    }
                }
            }

            let delay = jittered_backoff(backoff_ms, self.reconnect.jitter_ms);
            if !self.wait_backoff(Duration::from_millis(delay)).await {
                self.set_state(ConnectionState::Disconnected);
                return;
            }
            let next = (backoff_ms as f64 * self.reconnect.multiplier) as u64;
            backoff_ms = next.min(self.reconnect.max_ms);
        }
    }

    /// Pump one established connection until it drops or we shut down.
    async fn drive(&mut self, mut connection: PushConnection) -> Driven {
        if let Some(room) = self.room.clone() {
            debug!(room = %room, "rejoining room after connect");
            if connection
                .outbound
                .send(ClientMessage::JoinRoom { room })
                .await
                .is_err()
            {
                return Driven::ConnectionLost {
                    reason: "outbound channel closed".to_string(),
                };
            }
        }

        let mut heartbeat = interval_at(
            Instant::now() + self.heartbeat_interval,
            self.heartbeat_interval,
        );

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Subscribe(room)) => {
                        self.room = Some(room.clone());
                        if connection
                            .outbound
                            .send(ClientMessage::JoinRoom { room })
                            .await
                            .is_err()
                        {
                            return Driven::ConnectionLost {
                                reason: "outbound channel closed".to_string(),
                            };
                        }
                    }
                    Some(SessionCommand::Unsubscribe) => {
                        if let Some(room) = self.room.take() {
                            let _ = connection
                                .outbound
                                .send(ClientMessage::LeaveRoom { room })
                                .await;
                        }
                    }
                    Some(SessionCommand::Send(message)) => {
                        debug!(message_type = message.message_type(), "sending message");
                        if connection.outbound.send(message).await.is_err() {
                            return Driven::ConnectionLost {
                                reason: "outbound channel closed".to_string(),
                            };
                        }
                    }
                    Some(SessionCommand::Shutdown) | None => {
                        if let Some(room) = self.room.take() {
                            let _ = connection
                                .outbound
                                .send(ClientMessage::LeaveRoom { room })
                                .await;
                        }
                        return Driven::Shutdown;
                    }
                },
                inbound = connection.inbound.recv() => match inbound {
                    Some(TransportEvent::Event(event)) => {
                        debug!(event_type = event.event_type(), "server event");
                        let _ = self.events.send(SessionEvent::Server(event));
                    }
                    Some(TransportEvent::Closed { reason }) => {
                        return Driven::ConnectionLost { reason };
                    }
                    None => {
                        return Driven::ConnectionLost {
                            reason: "transport stream ended".to_string(),
                        };
                    }
                },
                _ = heartbeat.tick() => {
                    if connection.outbound.send(ClientMessage::Ping).await.is_err() {
                        return Driven::ConnectionLost {
                            reason: "outbound channel closed".to_string(),
                        };
                    }
                }
            }
        }
    }

    /// Sleep out the backoff while still honoring commands. Returns false
    /// on shutdown.
    async fn wait_backoff(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = offline_commands(&mut self.commands, &mut self.room) => false,
        }
    }

    /// Block after reconnect exhaustion until a subscribe re-arms the
    /// session. Returns false on shutdown.
    async fn park(&mut self) -> bool {
        loop {
            match self.commands.recv().await {
                Some(SessionCommand::Subscribe(room)) => {
                    self.room = Some(room);
                    return true;
                }
                Some(SessionCommand::Unsubscribe) => self.room = None,
                Some(SessionCommand::Send(message)) => {
                    debug!(
                        message_type = message.message_type(),
                        "dropping message while offline"
                    );
                }
                Some(SessionCommand::Shutdown) | None => return false,
            }
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = previous.as_str(), to = next.as_str(), "connection state");
            let _ = self.events.send(SessionEvent::StateChanged(next));
        }
    }
}

/// Handle commands while no connection exists. Resolves only on shutdown
/// (or when the handle is dropped).
async fn offline_commands(
    commands: &mut mpsc::UnboundedReceiver<SessionCommand>,
    room: &mut Option<RoomKey>,
) {
    loop {
        match commands.recv().await {
            Some(SessionCommand::Subscribe(next)) => *room = Some(next),
            Some(SessionCommand::Unsubscribe) => *room = None,
            Some(SessionCommand::Send(message)) => {
                debug!(
                    message_type = message.message_type(),
                    "dropping message while offline"
                );
            }
            Some(SessionCommand::Shutdown) | None => return,
        }
    }
}

fn jittered_backoff(base_ms: u64, jitter_ms: u64) -> u64 {
    if jitter_ms == 0 {
        return base_ms;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_nanos(0))
        .subsec_nanos() as u64;
    base_ms.saturating_add(nanos % jitter_ms)
}
