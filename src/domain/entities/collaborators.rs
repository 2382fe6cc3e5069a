//! Collaborator contracts consumed by the session layer.
//!
//! The relay never talks to the streaming platform, the message bus, or the
//! remote coordinator directly. It consumes these capability traits, and
//! `infrastructure` provides the concrete Redis/HTTP implementations.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::connection::{Connection, ConnectionStatus};
use super::event::{ChatEvent, GiftEvent};
use super::team::EntityConfig;

// ============================================================================
// Ingestion (browser automation)
// ============================================================================

/// Callback invoked for every decoded gift frame.
pub type GiftHandler = Box<dyn Fn(GiftEvent) + Send + Sync>;

/// Callback invoked for every decoded chat frame.
pub type ChatHandler = Box<dyn Fn(ChatEvent) + Send + Sync>;

/// Callback invoked when the upstream room changes state.
pub type StatusHandler = Box<dyn Fn(IngestionStatus) + Send + Sync>;

/// Upstream room state reported by the ingestion collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestionStatus {
    Connected {
        resolved_room_id: Option<String>,
        display_name: Option<String>,
        avatar: Option<String>,
    },
    Disconnected,
    Error(String),
}

/// Ingestion collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    #[error("Failed to open room {room_id}: {message}")]
    Connect { room_id: String, message: String },

    #[error("Ingestion stream closed unexpectedly")]
    Closed,
}

/// Opens per-room ingestion connections.
#[async_trait]
pub trait IngestionProvider: Send + Sync {
    async fn create_connection(
        &self,
        room_id: &str,
    ) -> Result<Box<dyn IngestionConnection>, IngestionError>;
}

/// One upstream room. Handlers must be registered before `run`.
#[async_trait]
pub trait IngestionConnection: Send {
    fn on_gift(&mut self, handler: GiftHandler);

    fn on_chat(&mut self, handler: ChatHandler);

    fn on_status(&mut self, handler: StatusHandler);

    /// Decode frames until the room ends or `cancel` fires.
    ///
    /// Returns the resolved room id. Handlers are invoked sequentially from
    /// this call, so per-room ordering is preserved.
    async fn run(&mut self, cancel: CancellationToken) -> Result<String, IngestionError>;
}

// ============================================================================
// Message bus
// ============================================================================

/// Callback invoked for every message received on a subscribed destination.
pub type InboundHandler = Box<dyn Fn(Vec<u8>) + Send + Sync>;

/// Credentials presented when connecting to the bus.
#[derive(Clone, Default, Deserialize)]
pub struct BusCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for BusCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Message bus errors.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Message bus connect failed: {0}")]
    Connect(String),

    #[error("Publish to {destination} failed: {message}")]
    Publish { destination: String, message: String },

    #[error("Subscribe to {destination} failed: {message}")]
    Subscribe { destination: String, message: String },

    #[error("Message bus is not connected")]
    NotConnected,
}

/// Establishes message bus connections. Reconnection is the client's concern.
#[async_trait]
pub trait MessageBusConnector: Send + Sync {
    async fn connect(
        &self,
        url: &str,
        credentials: &BusCredentials,
    ) -> Result<Arc<dyn MessageBus>, BusError>;
}

/// A connected message bus client.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, destination: &str, payload: Vec<u8>) -> Result<(), BusError>;

    async fn subscribe(&self, destination: &str, handler: InboundHandler) -> Result<(), BusError>;

    async fn disconnect(&self) -> Result<(), BusError>;
}

// ============================================================================
// Remote coordinator
// ============================================================================

/// Coordinator errors.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Coordinator request failed: {0}")]
    Transport(String),

    #[error("Coordinator returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid coordinator response: {0}")]
    Decode(String),
}

/// Outcome of the trial/eligibility check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TrialValidation {
    pub allowed: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub blocked_ids: Vec<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Request body for starting a remote session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub room_id: String,
    pub duration_minutes: u32,
    pub payload: serde_json::Value,
}

/// Status string the coordinator uses for a running session.
pub const REMOTE_STATUS_ACTIVE: &str = "ACTIVE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionResponse {
    pub status: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

impl StartSessionResponse {
    /// Session id if the coordinator reports the session as running.
    pub fn active_session_id(&self) -> Option<&str> {
        if !self.status.eq_ignore_ascii_case(REMOTE_STATUS_ACTIVE) {
            return None;
        }
        self.session_id.as_deref().filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StopSessionResponse {
    pub status: String,
}

/// Health of a single upstream connection, as pushed in heartbeats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionHealth {
    pub room_id: String,
    pub resolved_room_id: Option<String>,
    pub status: ConnectionStatus,
    pub messages_received: u64,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl From<&Connection> for ConnectionHealth {
    fn from(conn: &Connection) -> Self {
        Self {
            room_id: conn.external_room_id.clone(),
            resolved_room_id: conn.resolved_room_id.clone(),
            status: conn.status,
            messages_received: conn.messages_received,
            last_message_at: conn.last_message_at,
            last_error: conn.last_error.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub session_id: Option<String>,
    pub connections: Vec<ConnectionHealth>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatAck {
    #[serde(default)]
    pub status: Option<String>,
}

/// Remote session coordinator (REST).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Coordinator: Send + Sync {
    async fn validate_trial(
        &self,
        entities: &[EntityConfig],
    ) -> Result<TrialValidation, CoordinatorError>;

    async fn start_session(
        &self,
        request: &StartSessionRequest,
    ) -> Result<StartSessionResponse, CoordinatorError>;

    async fn stop_session(
        &self,
        session_id: &str,
        reason: &str,
    ) -> Result<StopSessionResponse, CoordinatorError>;

    async fn send_heartbeat(
        &self,
        heartbeat: &HeartbeatRequest,
    ) -> Result<HeartbeatAck, CoordinatorError>;
}
