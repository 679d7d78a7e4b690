//! Source arbitration between push, pull, and cache.
//!
//! One `SyncCoordinator` is constructed per consumer scope and owns its
//! cache store, session manager, coalescer, and pull fallback - no state
//! is shared across unrelated consumers. A single dispatch loop consumes
//! commands, session events, fetch completions, and the flush timer, so
//! every mutation of shared state happens on one logical thread and the
//! ordering of asynchronous completions stays deterministic.

use crate::cache::CacheStore;
use crate::clock::{SharedClock, SystemClock};
use crate::coalesce::{CoalesceOutcome, UpdateCoalescer};
use crate::config::{ClientConfig, ConfigError, ReconnectConfig, SyncConfig};
use crate::pull::{FetchResult, PullFallback};
use crate::session::{ConnectionState, SessionEvent, SessionManager};
use crate::transport::{PushTransport, RestClient, RestTransport, WsTransport};
use reviewroom_api::types::MarkSubmission;
use reviewroom_api::{ClientMessage, ServerEvent};
use reviewroom_core::{
    DataSource, FilterSet, ReviewSnapshot, RoomKey, SnapshotUpdate, SyncError, Timestamp,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Read-only state published to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncView {
    pub snapshot: Option<ReviewSnapshot>,
    pub connection_state: ConnectionState,
    pub data_source: DataSource,
    pub last_update: Option<Timestamp>,
    pub error: Option<SyncError>,
}

impl Default for SyncView {
    fn default() -> Self {
        Self {
            snapshot: None,
            connection_state: ConnectionState::Disconnected,
            data_source: DataSource::Initial,
            last_update: None,
            error: None,
        }
    }
}

enum Command {
    SetFilters(FilterSet),
    Refetch,
    Submit(MarkSubmission),
    Shutdown,
}

enum TaskEvent {
    Fetch {
        generation: u64,
        result: Result<FetchResult, SyncError>,
    },
    Submit {
        result: Result<(), SyncError>,
    },
}

/// Handle to a spawned synchronization coordinator.
pub struct SyncCoordinator {
    commands: mpsc::UnboundedSender<Command>,
    connection: watch::Receiver<ConnectionState>,
    view: watch::Receiver<SyncView>,
    task: JoinHandle<()>,
}

impl SyncCoordinator {
    /// Spawn a coordinator over the production transports described by
    /// `client`.
    pub fn connect(client: &ClientConfig, config: SyncConfig) -> Result<Self, ConfigError> {
        let push = Arc::new(WsTransport::new(client)?);
        let rest = Arc::new(RestClient::new(client)?);
        Ok(Self::new(push, rest, config, client.reconnect.clone()))
    }

    /// Spawn a coordinator over explicit transports with the wall clock.
    pub fn new(
        push: Arc<dyn PushTransport>,
        rest: Arc<dyn RestTransport>,
        config: SyncConfig,
        reconnect: ReconnectConfig,
    ) -> Self {
        Self::with_clock(push, rest, config, reconnect, Arc::new(SystemClock))
    }

    /// Spawn a coordinator with an injected clock.
    pub fn with_clock(
        push: Arc<dyn PushTransport>,
        rest: Arc<dyn RestTransport>,
        config: SyncConfig,
        reconnect: ReconnectConfig,
        clock: SharedClock,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (session_events_tx, session_events_rx) = mpsc::unbounded_channel();
        let (task_events_tx, task_events_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(SyncView::default());

        let session = SessionManager::spawn(
            push,
            reconnect,
            config.heartbeat_interval,
            session_events_tx,
        );
        let connection = session.state_receiver();
        let cache = Arc::new(CacheStore::new(&config, clock.clone()));
        let pull = Arc::new(PullFallback::new(rest, cache.clone(), &config));
        let coalescer = UpdateCoalescer::new(&config);

        let task = tokio::spawn(
            DispatchLoop {
                commands: commands_rx,
                session_events: session_events_rx,
                task_events: task_events_rx,
                task_sender: task_events_tx,
                session,
                cache,
                pull,
                coalescer,
                clock,
                view: view_tx,
                filters: None,
                room: None,
                snapshot: None,
                source: DataSource::Initial,
                last_update: None,
                error: None,
                connection: ConnectionState::Disconnected,
                fetch_generation: 0,
                fetch_task: None,
            }
            .run(),
        );

        Self {
            commands: commands_tx,
            connection,
            view: view_rx,
            task,
        }
    }

    /// Change the filter scope.
    ///
    /// An incomplete filter set clears the visible data and performs no
    /// transport activity; that is a valid idle state, not an error.
    pub fn set_filters(&self, filters: FilterSet) {
        let _ = self.commands.send(Command::SetFilters(filters));
    }

    /// Invalidate the cache entry for the current scope and re-resolve
    /// through the currently-best transport.
    pub fn refetch(&self) {
        let _ = self.commands.send(Command::Refetch);
    }

    /// Submit rubric marks through the currently-best transport.
    ///
    /// Returns true when the submission goes out over the live push
    /// channel (the server broadcasts the resulting change back). When
    /// the channel is down the submission falls back to REST, followed by
    /// a refetch to reconcile, and this returns false.
    pub fn submit(&self, submission: MarkSubmission) -> bool {
        let via_push = *self.connection.borrow() == ConnectionState::Connected;
        let _ = self.commands.send(Command::Submit(submission));
        via_push
    }

    /// Current consumer-visible state.
    pub fn view(&self) -> SyncView {
        self.view.borrow().clone()
    }

    /// Watch consumer-visible state changes.
    pub fn watch_view(&self) -> watch::Receiver<SyncView> {
        self.view.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    /// Tear down: cancel in-flight pulls, clear timers, leave the room,
    /// and close the push channel. Cache entries are left to age out.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        let _ = self.task.await;
    }
}

struct DispatchLoop {
    commands: mpsc::UnboundedReceiver<Command>,
    session_events: mpsc::UnboundedReceiver<SessionEvent>,
    task_events: mpsc::UnboundedReceiver<TaskEvent>,
    task_sender: mpsc::UnboundedSender<TaskEvent>,
    session: SessionManager,
    cache: Arc<CacheStore>,
    pull: Arc<PullFallback>,
    coalescer: UpdateCoalescer,
    clock: SharedClock,
    view: watch::Sender<SyncView>,

    filters: Option<FilterSet>,
    room: Option<RoomKey>,
    snapshot: Option<ReviewSnapshot>,
    source: DataSource,
    last_update: Option<Timestamp>,
    error: Option<SyncError>,
    connection: ConnectionState,

    fetch_generation: u64,
    fetch_task: Option<JoinHandle<()>>,
}

impl DispatchLoop {
    async fn run(mut self) {
        loop {
            let flush_wait = self.coalescer.deadline().map(|deadline| {
                (deadline - self.clock.now())
                    .to_std()
                    .unwrap_or(Duration::ZERO)
            });

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::SetFilters(filters)) => self.handle_set_filters(filters),
                    Some(Command::Refetch) => self.handle_refetch(),
                    Some(Command::Submit(submission)) => self.handle_submit(submission),
                    Some(Command::Shutdown) | None => break,
                },
                event = self.session_events.recv() => {
                    if let Some(event) = event {
                        self.handle_session_event(event);
                    }
                },
                event = self.task_events.recv() => {
                    if let Some(event) = event {
                        self.handle_task_event(event);
                    }
                },
                _ = maybe_sleep(flush_wait) => self.flush_now(),
            }
        }
        self.teardown().await;
    }

    fn handle_set_filters(&mut self, filters: FilterSet) {
        self.cancel_fetch();
        self.coalescer.clear();
        if self.room.take().is_some() {
            self.session.unsubscribe();
        }

        if !filters.is_complete() {
            debug!("incomplete filter set, clearing view");
            self.filters = None;
            self.snapshot = None;
            self.source = DataSource::Initial;
            self.last_update = None;
            self.error = None;
            self.publish();
            return;
        }

        let room = filters.room_key();
        info!(room = %room, "filter scope changed");
        self.filters = Some(filters.clone());
        self.room = Some(room.clone());
        self.session.subscribe(room);

        // A fresh cache entry is shown immediately while the transports
        // catch up; it also satisfies the scope without any network call
        // when push is down.
        let mut served_fresh = false;
        if let Some(entry) = self.cache.get(&filters.cache_key()) {
            if self.cache.is_fresh(&entry) {
                self.offer(SnapshotUpdate::Full(entry.payload), DataSource::Cache);
                served_fresh = true;
            }
        }
        if !self.session.is_connected() && !served_fresh {
            self.start_fetch();
        }
    }

    fn handle_refetch(&mut self) {
        let Some(filters) = self.filters.clone() else {
            return;
        };
        // Invalidate first so the fetch can never be served by the entry
        // whose staleness motivated the refetch.
        self.cache.invalidate(&filters.cache_key());
        if self.session.is_connected() {
            if let Some(room) = self.room.clone() {
                // Rejoining makes the server re-emit the room snapshot.
                self.session.subscribe(room);
            }
        } else {
            self.start_fetch();
        }
    }

    fn handle_submit(&mut self, submission: MarkSubmission) {
        let message = ClientMessage::MarkSubmission {
            submission: submission.clone(),
        };
        if self.session.send(message) {
            debug!("marks submitted via push channel");
            return;
        }

        debug!("push channel down, submitting marks via REST");
        let pull = self.pull.clone();
        let sender = self.task_sender.clone();
        tokio::spawn(async move {
            let result = pull.submit(&submission).await;
            let _ = sender.send(TaskEvent::Submit { result });
        });
    }

    fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::StateChanged(state) => {
                self.connection = state;
                self.publish();
            }
            SessionEvent::ReconnectsExhausted { reason } => {
                warn!(reason = %reason, "push reconnects exhausted");
                self.error = Some(SyncError::Connection { reason });
                self.publish();
                if self.filters.is_some() {
                    self.start_fetch();
                }
            }
            SessionEvent::Server(event) => self.handle_server_event(event),
        }
    }

    fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Snapshot { payload } => {
                self.offer(SnapshotUpdate::Full(payload), DataSource::Websocket);
            }
            ServerEvent::Delta { payload } => {
                self.offer(SnapshotUpdate::Partial(payload), DataSource::Websocket);
            }
            ServerEvent::RoomJoined { room } => {
                debug!(room = %room, "room joined");
            }
            ServerEvent::RoomJoinError { message } => {
                // Non-fatal: the connection stays up, the caller decides.
                warn!(message = %message, "room join rejected");
                self.error = Some(SyncError::SubmissionRejected { reason: message });
                self.publish();
            }
            ServerEvent::SubmissionAccepted { review_id, team_id } => {
                debug!(review_id = %review_id, team_id = %team_id, "submission accepted");
            }
            ServerEvent::SubmissionRejected { message } => {
                self.error = Some(SyncError::SubmissionRejected { reason: message });
                self.publish();
            }
            ServerEvent::Error { message } => {
                warn!(message = %message, "server error event");
            }
        }
    }

    fn handle_task_event(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::Fetch { generation, result } => {
                if generation != self.fetch_generation {
                    debug!(generation, "ignoring completion of a superseded fetch");
                    return;
                }
                self.fetch_task = None;
                match result {
                    Ok(FetchResult { snapshot, source }) => {
                        self.offer(SnapshotUpdate::Full(snapshot), source);
                    }
                    Err(err) => {
                        // Prior valid snapshot stays visible.
                        warn!(error = %err, "pull fetch exhausted");
                        self.error = Some(err);
                        self.publish();
                    }
                }
            }
            TaskEvent::Submit { result } => match result {
                Ok(()) => {
                    debug!("REST submission accepted, refetching to reconcile");
                    self.handle_refetch();
                }
                Err(err) => {
                    self.error = Some(err);
                    self.publish();
                }
            },
        }
    }

    /// Route an update through the coalescer.
    fn offer(&mut self, update: SnapshotUpdate, source: DataSource) {
        let now = self.clock.now();
        match self.coalescer.offer(update, source, now) {
            CoalesceOutcome::Apply(update, source) => self.apply(update, source, now),
            CoalesceOutcome::Scheduled(_) => {
                // The dispatch loop re-arms its flush timer from the
                // coalescer deadline on the next iteration.
            }
        }
    }

    fn flush_now(&mut self) {
        let now = self.clock.now();
        if let Some((update, source)) = self.coalescer.flush(now) {
            self.apply(update, source, now);
        }
    }

    fn apply(&mut self, update: SnapshotUpdate, source: DataSource, now: Timestamp) {
        let mut snapshot = self.snapshot.take().unwrap_or_default();
        update.apply_to(&mut snapshot);
        // Keep the cache warm with the applied state; cache-sourced
        // applies must not refresh their own stored_at.
        if source != DataSource::Cache {
            if let Some(filters) = &self.filters {
                self.cache.put(filters.cache_key(), snapshot.clone());
            }
        }
        self.snapshot = Some(snapshot);
        self.source = source;
        self.last_update = Some(now);
        self.error = None;
        self.publish();
    }

    fn start_fetch(&mut self) {
        let Some(filters) = self.filters.clone() else {
            return;
        };
        self.cancel_fetch();
        let generation = self.fetch_generation;
        let pull = self.pull.clone();
        let sender = self.task_sender.clone();
        debug!(generation, "starting pull fetch");
        self.fetch_task = Some(tokio::spawn(async move {
            let result = pull.fetch(&filters).await;
            let _ = sender.send(TaskEvent::Fetch { generation, result });
        }));
    }

    /// Abort any in-flight fetch and invalidate queued completions.
    fn cancel_fetch(&mut self) {
        self.fetch_generation += 1;
        if let Some(task) = self.fetch_task.take() {
            task.abort();
        }
    }

    fn publish(&self) {
        let _ = self.view.send(SyncView {
            snapshot: self.snapshot.clone(),
            connection_state: self.connection,
            data_source: self.source,
            last_update: self.last_update,
            error: self.error.clone(),
        });
    }

    async fn teardown(mut self) {
        self.cancel_fetch();
        self.coalescer.clear();
        self.session.shutdown();
        self.session.stopped().await;
    }
}

async fn maybe_sleep(wait: Option<Duration>) {
    match wait {
        Some(wait) => tokio::time::sleep(wait).await,
        None => std::future::pending::<()>().await,
    }
}
