//! Response DTOs
//!
//! Status snapshots returned by the sessions and the control API.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{Connection, LiveEvent, SessionState};

/// One line of the recent-event log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentEvent {
    pub kind: &'static str,
    pub room_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub summary: String,
    pub value: i64,
    pub at: DateTime<Utc>,
}

impl From<&LiveEvent> for RecentEvent {
    fn from(event: &LiveEvent) -> Self {
        let summary = match event {
            LiveEvent::Gift(g) => format!("{} x{}", g.gift_name, g.gift_count),
            LiveEvent::Chat(c) => c.message.clone(),
        };
        Self {
            kind: event.kind(),
            room_id: event.room_id().to_string(),
            sender_id: event.sender_id().to_string(),
            sender_name: event.sender_name().to_string(),
            summary,
            value: event.value(),
            at: event.timestamp(),
        }
    }
}

/// Listener session snapshot.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerStatus {
    pub active: bool,
    pub state: SessionState,
    pub started_at: Option<DateTime<Utc>>,
    pub total_rooms: usize,
    pub connected_rooms: usize,
    pub buffered_events: usize,
    pub connections: Vec<Connection>,
    /// Most recent first
    pub recent_events: Vec<RecentEvent>,
}

/// Stream session snapshot.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    pub active: bool,
    pub state: SessionState,
    pub session_id: Option<String>,
    pub room_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub published_events: u64,
    pub dropped_events: u64,
    pub failed_events: u64,
    pub active_bindings: usize,
    pub heartbeat_running: bool,
    pub heartbeats_sent: u64,
    pub heartbeats_failed: u64,
}

/// Combined snapshot reported by the session manager.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    /// Both sub-sessions are active
    pub active: bool,
    pub listener: ListenerStatus,
    pub stream: StreamStatus,
}

impl SessionStatus {
    pub fn new(listener: ListenerStatus, stream: StreamStatus) -> Self {
        Self {
            active: listener.active && stream.active,
            listener,
            stream,
        }
    }
}

/// Acknowledgement for start/stop calls.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub ok: bool,
    pub status: SessionStatus,
}
