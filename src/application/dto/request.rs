//! Request DTOs
//!
//! Session configurations supplied by the operator when starting sessions.

use serde::{Deserialize, Serialize};

use crate::domain::{GiftDefinition, TeamConfig};

/// Listener configuration: which upstream rooms to ingest and how to value gifts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerConfig {
    /// Root upstream room. Falls back to the first entity room when absent.
    #[serde(default)]
    pub room_id: Option<String>,

    #[serde(default)]
    pub team: TeamConfig,

    /// Gift value overrides, in priority order
    #[serde(default)]
    pub gift_definitions: Vec<GiftDefinition>,
}

impl ListenerConfig {
    /// Root room the listener must connect to.
    pub fn root_room(&self) -> Option<String> {
        self.room_id
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .or_else(|| self.team.entity_rooms().into_iter().next())
    }

    /// Root room followed by every other distinct entity room.
    pub fn rooms(&self) -> Vec<String> {
        let Some(root) = self.root_room() else {
            return Vec::new();
        };
        let mut rooms = vec![root];
        for room in self.team.entity_rooms() {
            if !rooms.contains(&room) {
                rooms.push(room);
            }
        }
        rooms
    }
}

/// Stream configuration: the coordinator-side session to run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamConfig {
    /// Coordinator room id; events are published under this room
    pub room_id: String,

    #[serde(default)]
    pub duration_minutes: Option<u32>,

    #[serde(default)]
    pub team: TeamConfig,

    /// Extra attributes forwarded verbatim to the coordinator on start
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Combined configuration for single-call start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub listener: ListenerConfig,
    pub stream: StreamConfig,
}

/// Stream start body. `listener` is used only when the listener is inactive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartStreamRequest {
    pub stream: StreamConfig,
    #[serde(default)]
    pub listener: Option<ListenerConfig>,
}

/// Additional upstream room for an active listener.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachRoomRequest {
    pub room_id: String,
}

/// Stop request body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StopRequest {
    #[serde(default)]
    pub reason: Option<String>,
}
