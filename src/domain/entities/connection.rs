//! Upstream room connection entity.
//!
//! One `Connection` exists per room the listener is attached to. It is
//! created in `Connecting` state when ingestion is launched, mutated by the
//! ingestion event/status callbacks, and discarded when the listener stops.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an upstream room connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    #[default]
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Disconnected => "DISCONNECTED",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-room ingestion state and counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Room id as configured by the operator
    pub external_room_id: String,

    /// Room id reported by the platform once the room page resolves
    pub resolved_room_id: Option<String>,

    pub display_name: Option<String>,
    pub avatar: Option<String>,
    pub status: ConnectionStatus,
    pub messages_received: u64,
    pub last_message_at: Option<DateTime<Utc>>,
    pub total_value: i64,
    pub last_error: Option<String>,
}

impl Connection {
    /// New connection in `Connecting` state.
    pub fn new(external_room_id: impl Into<String>) -> Self {
        Self {
            external_room_id: external_room_id.into(),
            resolved_room_id: None,
            display_name: None,
            avatar: None,
            status: ConnectionStatus::Connecting,
            messages_received: 0,
            last_message_at: None,
            total_value: 0,
            last_error: None,
        }
    }

    /// Count an ingested event against this room.
    pub fn record_event(&mut self, value: i64, at: DateTime<Utc>) {
        self.messages_received += 1;
        self.last_message_at = Some(at);
        self.total_value = self.total_value.saturating_add(value);
    }

    pub fn mark_connected(
        &mut self,
        resolved_room_id: Option<String>,
        display_name: Option<String>,
        avatar: Option<String>,
    ) {
        self.status = ConnectionStatus::Connected;
        self.last_error = None;
        if resolved_room_id.is_some() {
            self.resolved_room_id = resolved_room_id;
        }
        if display_name.is_some() {
            self.display_name = display_name;
        }
        if avatar.is_some() {
            self.avatar = avatar;
        }
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.status = ConnectionStatus::Error;
        self.last_error = Some(message.into());
    }

    pub fn mark_disconnected(&mut self) {
        self.status = ConnectionStatus::Disconnected;
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

/// Lifecycle state of a listener or stream sub-session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Active,
    Stopping,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}
