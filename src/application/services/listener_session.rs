//! Listener Session
//!
//! Owns the per-room upstream ingestion connections. Every decoded event
//! updates its room's counters, is appended to the event buffer, and is
//! offered to registered observers without blocking the ingestion callback.
//!
//! All mutable state lives behind one `RwLock` that is only held for
//! map/buffer mutation. Network work (ingestion) runs in spawned tasks that
//! are keyed to a per-start cancellation token, so tasks left over from an
//! earlier start can never mutate a newer session.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::event_buffer::{EventBuffer, PendingEvent};
use crate::application::dto::{ListenerConfig, ListenerStatus, RecentEvent};
use crate::config::SessionSettings;
use crate::domain::{
    Connection, ConnectionHealth, GiftCatalog, IngestionProvider, IngestionStatus, LiveEvent,
    SessionState,
};
use crate::infrastructure::metrics;
use crate::shared::error::SessionError;

/// How long `stop` waits for background tasks before aborting them.
const TASK_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Monotonic clock that follows tokio's (pausable) time source.
pub(crate) fn monotonic_now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Drained buffer contents plus the live feed registered in the same step.
#[derive(Debug)]
pub struct LiveSubscription {
    /// Buffered events not yet acknowledged, in arrival order
    pub drained: Vec<PendingEvent>,
    /// Every event ingested after the drain
    pub receiver: mpsc::Receiver<PendingEvent>,
}

/// Read/drain view of a listener, as used by the stream session.
///
/// The stream side never starts, stops, or reconfigures the listener; it can
/// only observe it and take its buffered events.
pub trait EventSource: Send + Sync {
    fn is_active(&self) -> bool;

    /// Drain the buffer and register a live observer atomically.
    ///
    /// Events ingested before the call are in `drained`; events ingested
    /// after it arrive on `receiver`. Nothing falls between the two.
    fn drain_and_subscribe(&self) -> LiveSubscription;

    /// Confirm that the event with sequence `seq` reached the bus.
    ///
    /// Unacknowledged events are returned again by the next drain.
    fn acknowledge(&self, seq: u64);

    fn connection_health(&self) -> Vec<ConnectionHealth>;
}

enum Observer {
    /// Plain event feed; has no effect on the buffer
    Events(mpsc::Sender<LiveEvent>),
    /// Delivery feed of a stream session; entries stay buffered until acknowledged
    Delivery(mpsc::Sender<PendingEvent>),
}

impl Observer {
    /// Returns `false` once the receiving side is gone.
    fn offer(&self, seq: u64, event: &LiveEvent) -> bool {
        match self {
            Observer::Events(tx) => offer_to(tx, event.clone()),
            Observer::Delivery(tx) => offer_to(
                tx,
                PendingEvent {
                    seq,
                    event: event.clone(),
                },
            ),
        }
    }
}

fn offer_to<T>(tx: &mpsc::Sender<T>, item: T) -> bool {
    match tx.try_send(item) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!("Live observer is lagging; event stays buffered");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

struct IngestionTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct ListenerInner {
    state: SessionState,
    generation: u64,
    started_at: Option<DateTime<Utc>>,
    cancel: Option<CancellationToken>,
    catalog: GiftCatalog,
    connections: Vec<Connection>,
    ingestions: Vec<(String, IngestionTask)>,
    cleanup: Option<JoinHandle<()>>,
    buffer: EventBuffer,
    recent: VecDeque<RecentEvent>,
    observers: Vec<Observer>,
}

impl ListenerInner {
    fn connection_mut(&mut self, room_id: &str) -> Option<&mut Connection> {
        self.connections
            .iter_mut()
            .find(|c| c.external_room_id == room_id)
    }

    fn connected_rooms(&self) -> usize {
        self.connections.iter().filter(|c| c.is_connected()).count()
    }

    /// Offer `event` to every observer, dropping closed ones.
    fn notify(&mut self, seq: u64, event: &LiveEvent) {
        self.observers.retain(|observer| observer.offer(seq, event));
    }
}

struct ListenerShared {
    ingestion: Arc<dyn IngestionProvider>,
    settings: SessionSettings,
    inner: RwLock<ListenerInner>,
}

/// Upstream listener for one or more live rooms.
pub struct ListenerSession {
    shared: Arc<ListenerShared>,
}

impl ListenerSession {
    pub fn new(ingestion: Arc<dyn IngestionProvider>, settings: SessionSettings) -> Self {
        let buffer = EventBuffer::new(settings.buffer_ttl());
        Self {
            shared: Arc::new(ListenerShared {
                ingestion,
                settings,
                inner: RwLock::new(ListenerInner {
                    state: SessionState::Idle,
                    generation: 0,
                    started_at: None,
                    cancel: None,
                    catalog: GiftCatalog::default(),
                    connections: Vec::new(),
                    ingestions: Vec::new(),
                    cleanup: None,
                    buffer,
                    recent: VecDeque::new(),
                    observers: Vec::new(),
                }),
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.inner.read().state
    }

    /// Start ingesting the configured rooms.
    ///
    /// An already-active listener is force-stopped first. Returns once the
    /// ingestion tasks are spawned; connections start out `Connecting`.
    pub async fn start(&self, config: ListenerConfig) -> Result<(), SessionError> {
        if self.state() != SessionState::Idle {
            warn!("Listener already active; forcing stop before restart");
            self.stop().await;
        }

        let rooms = config.rooms();
        if rooms.is_empty() {
            return Err(SessionError::MissingRoomId);
        }

        let cancel = CancellationToken::new();
        let generation = {
            let mut inner = self.shared.inner.write();
            inner.state = SessionState::Starting;
            inner.generation += 1;
            inner.started_at = Some(Utc::now());
            inner.cancel = Some(cancel.clone());
            inner.catalog = GiftCatalog::new(config.gift_definitions.clone());
            inner.connections = rooms.iter().map(Connection::new).collect();
            inner.buffer.clear();
            inner.recent.clear();
            inner.generation
        };

        let mut tasks = Vec::with_capacity(rooms.len());
        for room_id in &rooms {
            tasks.push((room_id.clone(), self.spawn_ingestion(generation, room_id, &cancel)));
        }
        let cleanup = tokio::spawn(run_cleanup(
            Arc::downgrade(&self.shared),
            self.shared.settings.cleanup_interval(),
            cancel.clone(),
        ));

        {
            let mut inner = self.shared.inner.write();
            inner.ingestions = tasks;
            inner.cleanup = Some(cleanup);
            inner.state = SessionState::Active;
        }

        info!(
            root_room = %rooms[0],
            rooms = rooms.len(),
            gift_definitions = config.gift_definitions.len(),
            "Listener session started"
        );
        Ok(())
    }

    /// Attach another upstream room to the active listener.
    ///
    /// Returns `false` if the room is already attached.
    pub fn attach_room(&self, room_id: &str) -> Result<bool, SessionError> {
        let room_id = room_id.trim();
        if room_id.is_empty() {
            return Err(SessionError::MissingRoomId);
        }

        let (generation, cancel) = {
            let mut inner = self.shared.inner.write();
            if !inner.state.is_active() {
                return Err(SessionError::ListenerNotActive);
            }
            if inner.connections.iter().any(|c| c.external_room_id == room_id) {
                return Ok(false);
            }
            let Some(cancel) = inner.cancel.clone() else {
                return Err(SessionError::ListenerNotActive);
            };
            inner.connections.push(Connection::new(room_id));
            (inner.generation, cancel)
        };

        let task = self.spawn_ingestion(generation, room_id, &cancel);
        let mut inner = self.shared.inner.write();
        if inner.generation == generation {
            inner.ingestions.push((room_id.to_string(), task));
        } else {
            task.cancel.cancel();
        }

        info!(room_id = %room_id, "Room attached to listener");
        Ok(true)
    }

    fn spawn_ingestion(&self, generation: u64, room_id: &str, parent: &CancellationToken) -> IngestionTask {
        let cancel = parent.child_token();
        let handle = tokio::spawn(run_ingestion(
            Arc::clone(&self.shared),
            generation,
            room_id.to_string(),
            cancel.clone(),
        ));
        IngestionTask { cancel, handle }
    }

    /// Stop all ingestion and release the buffer. Idempotent.
    pub async fn stop(&self) {
        let (tasks, cleanup) = {
            let mut inner = self.shared.inner.write();
            if inner.state == SessionState::Idle {
                return;
            }
            inner.state = SessionState::Stopping;

            if let Some(cancel) = inner.cancel.take() {
                cancel.cancel();
            }
            for conn in inner.connections.iter_mut() {
                conn.mark_disconnected();
                debug!(room_id = %conn.external_room_id, messages = conn.messages_received, "Room disconnected");
            }
            inner.connections.clear();
            inner.buffer.clear();
            inner.recent.clear();
            inner.observers.clear();
            inner.started_at = None;

            let tasks: Vec<_> = inner.ingestions.drain(..).collect();
            let cleanup = inner.cleanup.take();
            inner.state = SessionState::Idle;
            (tasks, cleanup)
        };
        metrics::set_connected_rooms(0);

        for (room_id, task) in tasks {
            task.cancel.cancel();
            await_task(task.handle, &room_id).await;
        }
        if let Some(handle) = cleanup {
            await_task(handle, "buffer-cleanup").await;
        }

        info!("Listener session stopped");
    }

    /// Register an observer for every newly ingested event.
    ///
    /// Observers do not affect what a later drain returns.
    pub fn subscribe(&self) -> mpsc::Receiver<LiveEvent> {
        let (tx, rx) = mpsc::channel(self.shared.settings.live_channel_capacity);
        self.shared
            .inner
            .write()
            .observers
            .push(Observer::Events(tx));
        rx
    }

    /// Point-in-time snapshot of the listener.
    pub fn status(&self) -> ListenerStatus {
        let now = monotonic_now();
        let inner = self.shared.inner.read();
        ListenerStatus {
            active: inner.state.is_active(),
            state: inner.state,
            started_at: inner.started_at,
            total_rooms: inner.connections.len(),
            connected_rooms: inner.connected_rooms(),
            buffered_events: inner.buffer.live_len(now),
            connections: inner.connections.clone(),
            recent_events: inner.recent.iter().cloned().collect(),
        }
    }
}

impl EventSource for ListenerSession {
    fn is_active(&self) -> bool {
        self.state().is_active()
    }

    fn drain_and_subscribe(&self) -> LiveSubscription {
        let (tx, receiver) = mpsc::channel(self.shared.settings.live_channel_capacity);
        let now = monotonic_now();
        let mut inner = self.shared.inner.write();
        let drained = inner.buffer.drain(now);
        inner.observers.push(Observer::Delivery(tx));
        LiveSubscription { drained, receiver }
    }

    fn acknowledge(&self, seq: u64) {
        self.shared.inner.write().buffer.acknowledge(seq);
    }

    fn connection_health(&self) -> Vec<ConnectionHealth> {
        self.shared
            .inner
            .read()
            .connections
            .iter()
            .map(ConnectionHealth::from)
            .collect()
    }
}

impl ListenerShared {
    fn handle_event(&self, generation: u64, room_id: &str, mut event: LiveEvent) {
        let now = monotonic_now();
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        if inner.generation != generation || !inner.state.is_active() {
            return;
        }

        if let LiveEvent::Gift(gift) = &mut event {
            inner.catalog.apply(gift);
        }

        if let Some(conn) = inner.connection_mut(room_id) {
            conn.record_event(event.value(), Utc::now());
        }

        inner.recent.push_front(RecentEvent::from(&event));
        inner.recent.truncate(self.settings.recent_event_cap);

        let kind = event.kind();
        let seq = inner.buffer.push(event.clone(), now);
        inner.notify(seq, &event);
        drop(guard);

        metrics::record_ingested(kind);
    }

    fn handle_status(&self, generation: u64, room_id: &str, status: IngestionStatus) {
        let connected = {
            let mut inner = self.inner.write();
            if inner.generation != generation || !inner.state.is_active() {
                return;
            }
            let Some(conn) = inner.connection_mut(room_id) else {
                return;
            };
            match status {
                IngestionStatus::Connected {
                    resolved_room_id,
                    display_name,
                    avatar,
                } => {
                    conn.mark_connected(resolved_room_id, display_name, avatar);
                    info!(room_id = %room_id, resolved = ?conn.resolved_room_id, "Room connected");
                }
                IngestionStatus::Disconnected => {
                    conn.mark_disconnected();
                    info!(room_id = %room_id, "Room disconnected upstream");
                }
                IngestionStatus::Error(message) => {
                    warn!(room_id = %room_id, error = %message, "Room ingestion error");
                    conn.mark_error(message);
                }
            }
            inner.connected_rooms()
        };
        metrics::set_connected_rooms(connected);
    }

    fn finish_connection(&self, generation: u64, room_id: &str, outcome: Result<String, String>) {
        let connected = {
            let mut inner = self.inner.write();
            if inner.generation != generation || !inner.state.is_active() {
                return;
            }
            let Some(conn) = inner.connection_mut(room_id) else {
                return;
            };
            match outcome {
                Ok(resolved) => {
                    if !resolved.is_empty() {
                        conn.resolved_room_id = Some(resolved);
                    }
                    conn.mark_disconnected();
                    info!(room_id = %room_id, "Room ingestion ended");
                }
                Err(message) => {
                    warn!(room_id = %room_id, error = %message, "Room ingestion failed");
                    conn.mark_error(message);
                }
            }
            inner.connected_rooms()
        };
        metrics::set_connected_rooms(connected);
    }

    fn evict_expired(&self, now: Instant) -> usize {
        let removed = self.inner.write().buffer.evict_expired(now);
        if removed > 0 {
            debug!(removed, "Evicted expired buffered events");
        }
        removed
    }
}

async fn run_ingestion(
    shared: Arc<ListenerShared>,
    generation: u64,
    room_id: String,
    cancel: CancellationToken,
) {
    let mut conn = match shared.ingestion.create_connection(&room_id).await {
        Ok(conn) => conn,
        Err(e) => {
            shared.finish_connection(generation, &room_id, Err(e.to_string()));
            return;
        }
    };

    let weak = Arc::downgrade(&shared);
    drop(shared);

    {
        let weak = weak.clone();
        let room = room_id.clone();
        conn.on_gift(Box::new(move |gift| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_event(generation, &room, LiveEvent::Gift(gift));
            }
        }));
    }
    {
        let weak = weak.clone();
        let room = room_id.clone();
        conn.on_chat(Box::new(move |chat| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_event(generation, &room, LiveEvent::Chat(chat));
            }
        }));
    }
    {
        let weak = weak.clone();
        let room = room_id.clone();
        conn.on_status(Box::new(move |status| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_status(generation, &room, status);
            }
        }));
    }

    debug!(room_id = %room_id, "Ingestion started");
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = conn.run(cancel.clone()) => Some(result),
    };

    let Some(result) = outcome else {
        debug!(room_id = %room_id, "Ingestion cancelled");
        return;
    };
    if cancel.is_cancelled() {
        return;
    }
    if let Some(shared) = weak.upgrade() {
        shared.finish_connection(generation, &room_id, result.map_err(|e| e.to_string()));
    }
}

async fn run_cleanup(shared: Weak<ListenerShared>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // Skip first immediate tick

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                shared.evict_expired(monotonic_now());
            }
        }
    }
}

async fn await_task(handle: JoinHandle<()>, name: &str) {
    let abort = handle.abort_handle();
    if tokio::time::timeout(TASK_SHUTDOWN_GRACE, handle).await.is_err() {
        warn!(task = %name, "Background task did not stop in time; aborting");
        abort.abort();
    }
}
