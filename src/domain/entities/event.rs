//! Live interaction events decoded by the ingestion collaborator.
//!
//! Events arrive already parsed from the platform's wire protocol. The
//! relay only reads them, overrides gift values from the configured gift
//! table, and republishes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A gift sent by a viewer in a live room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftEvent {
    /// External (platform) room the gift was observed in
    #[serde(default)]
    pub room_id: String,
    pub sender_id: String,
    pub sender_name: String,
    #[serde(default)]
    pub sender_level: u32,
    pub gift_id: String,
    pub gift_name: String,
    #[serde(default = "default_gift_count")]
    pub gift_count: u32,
    /// Unit value of a single gift
    #[serde(default)]
    pub value: i64,
    /// Streamer the platform says the gift targeted. Never used for attribution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

fn default_gift_count() -> u32 {
    1
}

impl GiftEvent {
    /// Unit value multiplied by the repeat count.
    pub fn total_value(&self) -> i64 {
        self.value.saturating_mul(i64::from(self.gift_count))
    }
}

/// A chat message sent by a viewer in a live room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    #[serde(default)]
    pub room_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub message: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Tagged union of everything the relay forwards.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    Gift(GiftEvent),
    Chat(ChatEvent),
}

impl LiveEvent {
    /// Event kind as published in the `type` attribute.
    pub fn kind(&self) -> &'static str {
        match self {
            LiveEvent::Gift(_) => "GIFT",
            LiveEvent::Chat(_) => "CHAT",
        }
    }

    pub fn room_id(&self) -> &str {
        match self {
            LiveEvent::Gift(e) => &e.room_id,
            LiveEvent::Chat(e) => &e.room_id,
        }
    }

    pub fn sender_id(&self) -> &str {
        match self {
            LiveEvent::Gift(e) => &e.sender_id,
            LiveEvent::Chat(e) => &e.sender_id,
        }
    }

    pub fn sender_name(&self) -> &str {
        match self {
            LiveEvent::Gift(e) => &e.sender_name,
            LiveEvent::Chat(e) => &e.sender_name,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            LiveEvent::Gift(e) => e.timestamp,
            LiveEvent::Chat(e) => e.timestamp,
        }
    }

    /// Explicit attribution signal carried by the event, if any.
    ///
    /// Only gifts carry one (their name); chat never votes for an entity.
    pub fn trigger(&self) -> Option<&str> {
        match self {
            LiveEvent::Gift(e) => Some(e.gift_name.as_str()),
            LiveEvent::Chat(_) => None,
        }
    }

    /// Value contributed to a connection's running total.
    pub fn value(&self) -> i64 {
        match self {
            LiveEvent::Gift(e) => e.total_value(),
            LiveEvent::Chat(_) => 0,
        }
    }
}

impl From<GiftEvent> for LiveEvent {
    fn from(event: GiftEvent) -> Self {
        LiveEvent::Gift(event)
    }
}

impl From<ChatEvent> for LiveEvent {
    fn from(event: ChatEvent) -> Self {
        LiveEvent::Chat(event)
    }
}
