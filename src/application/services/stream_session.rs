//! Stream Session
//!
//! Publishes attributed listener events to the downstream message bus for
//! one coordinator-side session.
//!
//! ## Start protocol
//!
//! 1. Trial validation across all configured entities
//! 2. Remote session start (must come back `ACTIVE` with a session id)
//! 3. Message bus connect (rolls back step 2 on failure)
//! 4. Drain the listener buffer and register the live feed in one step
//! 5. Heartbeat
//! 6. Live forwarding task
//! 7. Inbound broadcast topic subscription
//!
//! A failure in any step undoes the earlier steps in reverse order. Once
//! active, per-event failures are counted and logged only. An event is
//! acknowledged back to the listener only after it was published (or
//! dropped as unattributed), so anything still queued at stop or lost to a
//! failed publish is drained again by the next start.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::event_buffer::PendingEvent;
use super::heartbeat_service::HeartbeatService;
use super::listener_session::{monotonic_now, EventSource, LiveSubscription};
use crate::application::dto::{encode_event_bytes, StreamConfig, StreamStatus};
use crate::config::{SessionSettings, Settings};
use crate::domain::{
    BindingResolver, BusCredentials, Coordinator, MessageBus, MessageBusConnector, SessionState,
    StartSessionRequest,
};
use crate::infrastructure::metrics;
use crate::shared::error::SessionError;

/// Reason reported to the coordinator when a start is rolled back.
pub const ROLLBACK_STOP_REASON: &str = "START_ROLLBACK";

const INBOUND_CHANNEL_CAPACITY: usize = 256;

/// Destination attributed events are published to.
pub fn publish_destination(room_id: &str) -> String {
    format!("relay:room:{}:events", room_id)
}

/// Topic carrying externally pushed updates for a room.
pub fn broadcast_destination(room_id: &str) -> String {
    format!("relay:room:{}:broadcast", room_id)
}

/// Downstream connection settings for stream sessions.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub bus_url: String,
    pub bus_credentials: BusCredentials,
    pub session: SessionSettings,
}

impl StreamOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            bus_url: settings.bus.url.clone(),
            bus_credentials: settings.bus.credentials(),
            session: settings.session.clone(),
        }
    }
}

/// A message received on the room's broadcast topic.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub room_id: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.payload).ok()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct StreamCounters {
    published: u64,
    dropped: u64,
    failed: u64,
}

#[derive(Default)]
struct StreamInner {
    state: SessionState,
    generation: u64,
    session_id: Option<String>,
    room_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
    resolver: Option<BindingResolver>,
    bus: Option<Arc<dyn MessageBus>>,
    cancel: Option<CancellationToken>,
    forwarder: Option<JoinHandle<()>>,
    counters: StreamCounters,
}

/// Resources taken out of the session for teardown.
struct Teardown {
    session_id: Option<String>,
    bus: Option<Arc<dyn MessageBus>>,
    cancel: Option<CancellationToken>,
    forwarder: Option<JoinHandle<()>>,
}

struct StreamShared {
    inner: RwLock<StreamInner>,
    inbound_tx: broadcast::Sender<InboundMessage>,
    source: Arc<dyn EventSource>,
}

pub struct StreamSession {
    coordinator: Arc<dyn Coordinator>,
    connector: Arc<dyn MessageBusConnector>,
    source: Arc<dyn EventSource>,
    options: StreamOptions,
    heartbeat: HeartbeatService,
    shared: Arc<StreamShared>,
}

impl StreamSession {
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        connector: Arc<dyn MessageBusConnector>,
        source: Arc<dyn EventSource>,
        options: StreamOptions,
    ) -> Self {
        let heartbeat = HeartbeatService::new(
            Arc::clone(&coordinator),
            Arc::clone(&source),
            options.session.heartbeat_interval(),
        );
        let (inbound_tx, _) = broadcast::channel(INBOUND_CHANNEL_CAPACITY);

        Self {
            coordinator,
            connector,
            options,
            heartbeat,
            shared: Arc::new(StreamShared {
                inner: RwLock::new(StreamInner::default()),
                inbound_tx,
                source: Arc::clone(&source),
            }),
            source,
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.inner.read().state
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    pub fn session_id(&self) -> Option<String> {
        self.shared.inner.read().session_id.clone()
    }

    /// Receive messages pushed to the room's broadcast topic.
    pub fn subscribe_inbound(&self) -> broadcast::Receiver<InboundMessage> {
        self.shared.inbound_tx.subscribe()
    }

    /// Run the start protocol. Returns the coordinator session id.
    pub async fn start(&self, config: StreamConfig) -> Result<String, SessionError> {
        let room_id = config.room_id.trim().to_string();
        if room_id.is_empty() {
            return Err(SessionError::MissingRoomId);
        }

        {
            let mut inner = self.shared.inner.write();
            if inner.state != SessionState::Idle {
                return Err(SessionError::AlreadyActive);
            }
            if !self.source.is_active() {
                return Err(SessionError::ListenerNotActive);
            }
            inner.state = SessionState::Starting;
        }

        match self.run_start(room_id, config).await {
            Ok(session_id) => Ok(session_id),
            Err(e) => {
                self.shared.inner.write().state = SessionState::Idle;
                warn!(error = %e, "Stream session start failed");
                Err(e)
            }
        }
    }

    async fn run_start(&self, room_id: String, config: StreamConfig) -> Result<String, SessionError> {
        // 1. Validate
        let validation = self.coordinator.validate_trial(&config.team.entities).await?;
        if !validation.allowed {
            return Err(SessionError::TrialRejected {
                message: validation
                    .message
                    .unwrap_or_else(|| "Trial validation rejected".to_string()),
                blocked_ids: validation.blocked_ids,
                reason: validation.reason,
            });
        }

        // 2. Remote session start
        let request = StartSessionRequest {
            room_id: room_id.clone(),
            duration_minutes: config
                .duration_minutes
                .unwrap_or(self.options.session.default_duration_minutes),
            payload: json!({
                "team": config.team,
                "metadata": config.metadata,
            }),
        };
        let response = self.coordinator.start_session(&request).await?;
        let Some(session_id) = response.active_session_id().map(str::to_string) else {
            return Err(SessionError::RemoteSessionRejected {
                status: response.status,
            });
        };
        info!(session_id = %session_id, room_id = %room_id, "Remote session started");

        // 3. Message bus connect
        let bus = match self
            .connector
            .connect(&self.options.bus_url, &self.options.bus_credentials)
            .await
        {
            Ok(bus) => bus,
            Err(e) => {
                error!(error = %e, session_id = %session_id, "Message bus connect failed; rolling back remote session");
                self.stop_remote_session(&session_id, ROLLBACK_STOP_REASON).await;
                return Err(e.into());
            }
        };

        let cancel = CancellationToken::new();
        let generation = {
            let mut inner = self.shared.inner.write();
            inner.generation += 1;
            inner.session_id = Some(session_id.clone());
            inner.room_id = Some(room_id.clone());
            inner.started_at = Some(Utc::now());
            inner.resolver = Some(BindingResolver::new(
                config.team.entities.clone(),
                self.options.session.binding_ttl(),
            ));
            inner.bus = Some(Arc::clone(&bus));
            inner.cancel = Some(cancel.clone());
            inner.counters = StreamCounters::default();
            inner.generation
        };

        // 4. Drain (atomically with live registration)
        let LiveSubscription { drained, receiver } = self.source.drain_and_subscribe();
        let drained_count = drained.len();
        for event in drained {
            self.shared.forward(generation, event, "drain").await;
        }
        debug!(events = drained_count, "Drained listener buffer");

        // 5. Heartbeat
        self.heartbeat.start(Some(session_id.clone()));

        // 6. Live forwarding
        let forwarder = tokio::spawn(run_forwarder(
            Arc::clone(&self.shared),
            generation,
            receiver,
            cancel.clone(),
        ));
        self.shared.inner.write().forwarder = Some(forwarder);

        // 7. Inbound topic
        let destination = broadcast_destination(&room_id);
        let inbound_tx = self.shared.inbound_tx.clone();
        let inbound_room = room_id.clone();
        let subscribed = bus
            .subscribe(
                &destination,
                Box::new(move |payload| {
                    debug!(room_id = %inbound_room, bytes = payload.len(), "Inbound broadcast received");
                    let _ = inbound_tx.send(InboundMessage {
                        room_id: inbound_room.clone(),
                        payload,
                    });
                }),
            )
            .await;
        if let Err(e) = subscribed {
            error!(error = %e, destination = %destination, "Inbound subscription failed; rolling back");
            let teardown = self.shared.take_teardown();
            self.teardown(teardown, ROLLBACK_STOP_REASON).await;
            return Err(e.into());
        }

        self.shared.inner.write().state = SessionState::Active;
        info!(
            session_id = %session_id,
            room_id = %room_id,
            drained = drained_count,
            "Stream session started"
        );
        Ok(session_id)
    }

    /// Best-effort stop. Always leaves local state clean. Idempotent.
    pub async fn stop(&self, reason: &str) {
        let teardown = {
            let mut inner = self.shared.inner.write();
            match inner.state {
                SessionState::Idle | SessionState::Stopping => return,
                SessionState::Starting => {
                    warn!("Stream session is still starting; stop ignored");
                    return;
                }
                SessionState::Active => {}
            }
            inner.state = SessionState::Stopping;
            drop(inner);
            self.shared.take_teardown()
        };

        let session_id = teardown.session_id.clone();
        self.teardown(teardown, reason).await;
        self.shared.inner.write().state = SessionState::Idle;

        info!(session_id = ?session_id, reason = %reason, "Stream session stopped");
    }

    async fn teardown(&self, teardown: Teardown, reason: &str) {
        if let Some(cancel) = teardown.cancel {
            cancel.cancel();
        }
        if let Some(forwarder) = teardown.forwarder {
            if let Err(e) = forwarder.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Live forwarder ended abnormally");
                }
            }
        }

        self.heartbeat.stop().await;

        if let Some(bus) = teardown.bus {
            if let Err(e) = bus.disconnect().await {
                warn!(error = %e, "Message bus disconnect failed");
            }
        }

        if let Some(session_id) = teardown.session_id {
            self.stop_remote_session(&session_id, reason).await;
        }
    }

    async fn stop_remote_session(&self, session_id: &str, reason: &str) {
        match self.coordinator.stop_session(session_id, reason).await {
            Ok(response) => {
                debug!(session_id = %session_id, status = %response.status, "Remote session stopped");
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Remote session stop failed");
            }
        }
    }

    pub fn status(&self) -> StreamStatus {
        let now = monotonic_now();
        let heartbeat_running = self.heartbeat.is_running();
        let heartbeats_sent = self.heartbeat.sent();
        let heartbeats_failed = self.heartbeat.failed();
        let inner = self.shared.inner.read();
        StreamStatus {
            active: inner.state.is_active(),
            state: inner.state,
            session_id: inner.session_id.clone(),
            room_id: inner.room_id.clone(),
            started_at: inner.started_at,
            published_events: inner.counters.published,
            dropped_events: inner.counters.dropped,
            failed_events: inner.counters.failed,
            active_bindings: inner
                .resolver
                .as_ref()
                .map(|r| r.cache().live_len(now))
                .unwrap_or(0),
            heartbeat_running,
            heartbeats_sent,
            heartbeats_failed,
        }
    }
}

impl StreamShared {
    fn take_teardown(&self) -> Teardown {
        let mut inner = self.inner.write();
        inner.resolver = None;
        inner.room_id = None;
        inner.started_at = None;
        Teardown {
            session_id: inner.session_id.take(),
            bus: inner.bus.take(),
            cancel: inner.cancel.take(),
            forwarder: inner.forwarder.take(),
        }
    }

    /// Resolve and publish one event. Unattributed events are dropped.
    async fn forward(&self, generation: u64, pending: PendingEvent, path: &'static str) {
        let PendingEvent { seq, event } = pending;
        let kind = event.kind();
        let now = monotonic_now();

        let (bus, room_id, attribution) = {
            let mut guard = self.inner.write();
            let inner = &mut *guard;
            if inner.generation != generation {
                return;
            }
            let (Some(bus), Some(room_id), Some(resolver)) =
                (inner.bus.clone(), inner.room_id.clone(), inner.resolver.as_mut())
            else {
                return;
            };

            match resolver.resolve(&event, now) {
                Some(attribution) => (bus, room_id, attribution),
                None => {
                    inner.counters.dropped += 1;
                    drop(guard);
                    self.source.acknowledge(seq);
                    metrics::record_dropped(kind);
                    debug!(kind, sender_id = %event.sender_id(), "Dropped unattributed event");
                    return;
                }
            }
        };

        let destination = publish_destination(&room_id);
        let result = match encode_event_bytes(&room_id, &event, &attribution) {
            Ok(payload) => bus.publish(&destination, payload).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        let ok = result.is_ok();
        {
            let mut inner = self.inner.write();
            if inner.generation == generation {
                if ok {
                    inner.counters.published += 1;
                } else {
                    inner.counters.failed += 1;
                }
            }
        }
        metrics::record_publish(kind, path, ok);

        match result {
            Ok(()) => {
                self.source.acknowledge(seq);
                debug!(
                    kind,
                    path,
                    seq,
                    entity_id = %attribution.entity_id,
                    "Published event"
                );
            }
            Err(e) => warn!(kind, path, seq, error = %e, "Event publish failed; event stays buffered"),
        }
    }
}

async fn run_forwarder(
    shared: Arc<StreamShared>,
    generation: u64,
    mut receiver: mpsc::Receiver<PendingEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = receiver.recv() => match event {
                Some(event) => shared.forward(generation, event, "live").await,
                None => break,
            },
        }
    }
    debug!("Live forwarder exited");
}
