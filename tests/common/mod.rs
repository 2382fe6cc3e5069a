//! Common Test Utilities
//!
//! In-memory collaborators, fixtures, and the router-level `TestApp`.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{body::Body, http::Request, Router};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use live_relay::application::dto::{ListenerConfig, SessionConfig, StreamConfig};
use live_relay::application::services::{SessionManager, StreamOptions};
use live_relay::config::{
    BusSettings, CoordinatorSettings, CorsSettings, RedisSettings, ServerSettings,
    SessionSettings, Settings,
};
use live_relay::domain::{
    BusCredentials, BusError, ChatEvent, ChatHandler, Coordinator, CoordinatorError,
    EntityConfig, GiftEvent, GiftHandler, HeartbeatAck, HeartbeatRequest, InboundHandler,
    IngestionConnection, IngestionError, IngestionProvider, IngestionStatus, MessageBus,
    MessageBusConnector, StartSessionRequest, StartSessionResponse, StatusHandler,
    StopSessionResponse, TeamConfig, TrialValidation,
};
use live_relay::startup::{build_router, AppState};

// ============================================================================
// Ingestion
// ============================================================================

#[derive(Default)]
struct RoomHandlers {
    gift: Option<GiftHandler>,
    chat: Option<ChatHandler>,
    status: Option<StatusHandler>,
}

/// Ingestion fake. Rooms become "live" once the listener runs them.
#[derive(Default)]
pub struct FakeIngestion {
    rooms: Mutex<HashMap<String, (u64, RoomHandlers)>>,
    failing: Mutex<HashSet<String>>,
    next_registration: AtomicU64,
}

impl FakeIngestion {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_room(&self, room_id: &str) {
        self.failing.lock().insert(room_id.to_string());
    }

    pub fn is_running(&self, room_id: &str) -> bool {
        self.rooms.lock().contains_key(room_id)
    }

    pub async fn wait_for_room(&self, room_id: &str) {
        eventually(|| self.is_running(room_id)).await;
    }

    pub fn gift(&self, room_id: &str, gift: GiftEvent) {
        let rooms = self.rooms.lock();
        let handler = rooms
            .get(room_id)
            .and_then(|(_, h)| h.gift.as_ref())
            .expect("room not running");
        handler(gift);
    }

    pub fn chat(&self, room_id: &str, chat: ChatEvent) {
        let rooms = self.rooms.lock();
        let handler = rooms
            .get(room_id)
            .and_then(|(_, h)| h.chat.as_ref())
            .expect("room not running");
        handler(chat);
    }

    pub fn status(&self, room_id: &str, status: IngestionStatus) {
        let rooms = self.rooms.lock();
        let handler = rooms
            .get(room_id)
            .and_then(|(_, h)| h.status.as_ref())
            .expect("room not running");
        handler(status);
    }
}

/// Provider handle over a shared `FakeIngestion`.
pub struct FakeIngestionProvider(pub Arc<FakeIngestion>);

#[async_trait]
impl IngestionProvider for FakeIngestionProvider {
    async fn create_connection(
        &self,
        room_id: &str,
    ) -> Result<Box<dyn IngestionConnection>, IngestionError> {
        if self.0.failing.lock().contains(room_id) {
            return Err(IngestionError::Connect {
                room_id: room_id.to_string(),
                message: "room is offline".into(),
            });
        }
        Ok(Box::new(FakeConnection {
            room_id: room_id.to_string(),
            owner: Arc::clone(&self.0),
            handlers: Some(RoomHandlers::default()),
        }))
    }
}

struct FakeConnection {
    room_id: String,
    owner: Arc<FakeIngestion>,
    handlers: Option<RoomHandlers>,
}

#[async_trait]
impl IngestionConnection for FakeConnection {
    fn on_gift(&mut self, handler: GiftHandler) {
        if let Some(h) = self.handlers.as_mut() {
            h.gift = Some(handler);
        }
    }

    fn on_chat(&mut self, handler: ChatHandler) {
        if let Some(h) = self.handlers.as_mut() {
            h.chat = Some(handler);
        }
    }

    fn on_status(&mut self, handler: StatusHandler) {
        if let Some(h) = self.handlers.as_mut() {
            h.status = Some(handler);
        }
    }

    async fn run(&mut self, cancel: CancellationToken) -> Result<String, IngestionError> {
        let handlers = self.handlers.take().ok_or(IngestionError::Closed)?;
        let id = self.owner.next_registration.fetch_add(1, Ordering::SeqCst);
        self.owner
            .rooms
            .lock()
            .insert(self.room_id.clone(), (id, handlers));
        let _registration = Registration {
            owner: Arc::clone(&self.owner),
            room_id: self.room_id.clone(),
            id,
        };
        cancel.cancelled().await;
        Ok(self.room_id.clone())
    }
}

/// Unregisters the room when `run` returns or is dropped mid-await.
struct Registration {
    owner: Arc<FakeIngestion>,
    room_id: String,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut rooms = self.owner.rooms.lock();
        if rooms.get(&self.room_id).map(|(id, _)| *id) == Some(self.id) {
            rooms.remove(&self.room_id);
        }
    }
}

// ============================================================================
// Message bus
// ============================================================================

/// Bus fake that records publishes and lets tests push inbound messages.
/// Flip `fail_publish` to make every publish fail.
#[derive(Default)]
pub struct FakeBus {
    pub fail_publish: AtomicBool,
    published: Mutex<Vec<(String, Value)>>,
    subscriptions: Mutex<HashMap<String, InboundHandler>>,
    disconnects: AtomicU64,
}

impl FakeBus {
    pub fn published(&self) -> Vec<(String, Value)> {
        self.published.lock().clone()
    }

    pub fn published_count(&self) -> usize {
        self.published.lock().len()
    }

    pub fn disconnects(&self) -> u64 {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn push_inbound(&self, destination: &str, payload: &[u8]) -> bool {
        match self.subscriptions.lock().get(destination) {
            Some(handler) => {
                handler(payload.to_vec());
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl MessageBus for FakeBus {
    async fn publish(&self, destination: &str, payload: Vec<u8>) -> Result<(), BusError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(BusError::Publish {
                destination: destination.to_string(),
                message: "broker unavailable".into(),
            });
        }
        let value: Value = serde_json::from_slice(&payload).map_err(|e| BusError::Publish {
            destination: destination.to_string(),
            message: e.to_string(),
        })?;
        self.published.lock().push((destination.to_string(), value));
        Ok(())
    }

    async fn subscribe(&self, destination: &str, handler: InboundHandler) -> Result<(), BusError> {
        self.subscriptions
            .lock()
            .insert(destination.to_string(), handler);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BusError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.lock().clear();
        Ok(())
    }
}

/// Connector fake; flip `fail` to simulate an unreachable bus.
#[derive(Default)]
pub struct FakeConnector {
    pub bus: Arc<FakeBus>,
    pub fail: AtomicBool,
    pub connects: AtomicU64,
}

#[async_trait]
impl MessageBusConnector for FakeConnector {
    async fn connect(
        &self,
        _url: &str,
        _credentials: &BusCredentials,
    ) -> Result<Arc<dyn MessageBus>, BusError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(BusError::Connect("connection refused".into()));
        }
        Ok(self.bus.clone())
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Coordinator fake that records every call.
pub struct FakeCoordinator {
    pub allow_trial: AtomicBool,
    pub start_status: Mutex<String>,
    calls: Mutex<Vec<String>>,
    next_session: AtomicU64,
}

impl Default for FakeCoordinator {
    fn default() -> Self {
        Self {
            allow_trial: AtomicBool::new(true),
            start_status: Mutex::new("ACTIVE".into()),
            calls: Mutex::new(Vec::new()),
            next_session: AtomicU64::new(1),
        }
    }
}

impl FakeCoordinator {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

#[async_trait]
impl Coordinator for FakeCoordinator {
    async fn validate_trial(
        &self,
        entities: &[EntityConfig],
    ) -> Result<TrialValidation, CoordinatorError> {
        self.calls.lock().push("validate".into());
        if self.allow_trial.load(Ordering::SeqCst) {
            Ok(TrialValidation {
                allowed: true,
                ..Default::default()
            })
        } else {
            Ok(TrialValidation {
                allowed: false,
                message: Some("Trial already used".into()),
                blocked_ids: entities.iter().map(|e| e.id.clone()).collect(),
                reason: Some("TRIAL_USED".into()),
            })
        }
    }

    async fn start_session(
        &self,
        request: &StartSessionRequest,
    ) -> Result<StartSessionResponse, CoordinatorError> {
        self.calls.lock().push(format!("start:{}", request.room_id));
        let n = self.next_session.fetch_add(1, Ordering::SeqCst);
        Ok(StartSessionResponse {
            status: self.start_status.lock().clone(),
            session_id: Some(format!("session-{}", n)),
            duration_minutes: Some(request.duration_minutes),
        })
    }

    async fn stop_session(
        &self,
        session_id: &str,
        reason: &str,
    ) -> Result<StopSessionResponse, CoordinatorError> {
        self.calls
            .lock()
            .push(format!("stop:{}:{}", session_id, reason));
        Ok(StopSessionResponse {
            status: "STOPPED".into(),
        })
    }

    async fn send_heartbeat(
        &self,
        _heartbeat: &HeartbeatRequest,
    ) -> Result<HeartbeatAck, CoordinatorError> {
        self.calls.lock().push("heartbeat".into());
        Ok(HeartbeatAck::default())
    }
}

// ============================================================================
// Relay fixture
// ============================================================================

pub fn test_settings() -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".into(),
            port: 0,
        },
        redis: RedisSettings {
            url: "redis://127.0.0.1:6379".into(),
        },
        bus: BusSettings {
            url: "redis://127.0.0.1:6379".into(),
            username: None,
            password: None,
        },
        coordinator: CoordinatorSettings {
            base_url: "http://127.0.0.1:9000".into(),
            api_key: None,
            request_timeout_secs: 5,
        },
        session: SessionSettings::default(),
        cors: CorsSettings {
            allowed_origins: vec!["http://localhost:3000".into()],
        },
        environment: "test".into(),
    }
}

/// Session manager wired to in-memory collaborators.
pub struct TestRelay {
    pub manager: Arc<SessionManager>,
    pub ingestion: Arc<FakeIngestion>,
    pub coordinator: Arc<FakeCoordinator>,
    pub connector: Arc<FakeConnector>,
    pub settings: Settings,
}

impl TestRelay {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let ingestion = FakeIngestion::new();
        let coordinator = Arc::new(FakeCoordinator::default());
        let connector = Arc::new(FakeConnector::default());

        let manager = Arc::new(SessionManager::new(
            Arc::new(FakeIngestionProvider(ingestion.clone())),
            coordinator.clone(),
            connector.clone(),
            StreamOptions::from_settings(&settings),
        ));

        Self {
            manager,
            ingestion,
            coordinator,
            connector,
            settings,
        }
    }

    pub fn bus(&self) -> &FakeBus {
        &self.connector.bus
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub const ROOT_ROOM: &str = "ext-root";
pub const RELAY_ROOM: &str = "relay-1";

pub fn team() -> TeamConfig {
    TeamConfig {
        id: "team".into(),
        name: "Team".into(),
        entities: vec![
            EntityConfig::new("team-a", "Team A").with_trigger("Rose"),
            EntityConfig::new("team-b", "Team B").with_trigger("Diamond"),
        ],
    }
}

pub fn listener_config() -> ListenerConfig {
    ListenerConfig {
        room_id: Some(ROOT_ROOM.into()),
        team: team(),
        gift_definitions: vec![],
    }
}

pub fn stream_config() -> StreamConfig {
    StreamConfig {
        room_id: RELAY_ROOM.into(),
        duration_minutes: Some(30),
        team: team(),
        metadata: Value::Null,
    }
}

pub fn session_config() -> SessionConfig {
    SessionConfig {
        listener: listener_config(),
        stream: stream_config(),
    }
}

pub fn gift(sender: &str, name: &str, value: i64) -> GiftEvent {
    GiftEvent {
        room_id: ROOT_ROOM.into(),
        sender_id: sender.into(),
        sender_name: sender.to_uppercase(),
        sender_level: 5,
        gift_id: format!("gift-{}", name.to_lowercase()),
        gift_name: name.into(),
        gift_count: 1,
        value,
        recipient_id: None,
        timestamp: Utc::now(),
    }
}

pub fn chat(sender: &str, message: &str) -> ChatEvent {
    ChatEvent {
        room_id: ROOT_ROOM.into(),
        sender_id: sender.into(),
        sender_name: sender.to_uppercase(),
        message: message.into(),
        timestamp: Utc::now(),
    }
}

/// Poll `condition` until it holds, yielding to background tasks in between.
pub async fn eventually<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}

// ============================================================================
// HTTP
// ============================================================================

/// Test application builder
pub struct TestApp {
    pub router: Router,
    pub relay: TestRelay,
}

impl TestApp {
    /// Create a new test application with in-memory collaborators
    pub fn new() -> Self {
        let relay = TestRelay::new();
        let state = AppState {
            manager: relay.manager.clone(),
            redis: None,
            settings: Arc::new(relay.settings.clone()),
        };
        Self {
            router: build_router(state),
            relay,
        }
    }

    /// Make a GET request to the application
    pub async fn get(&self, uri: &str) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    /// Make a POST request with JSON body
    pub async fn post_json(&self, uri: &str, body: &str) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("Content-Type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    /// Make a POST request without a body
    pub async fn post_empty(&self, uri: &str) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }
}

/// Read a response body as JSON
pub async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
