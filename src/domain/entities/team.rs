//! Team, entity, and gift-table configuration.
//!
//! These are supplied by the operator when a session starts and are
//! read-only for the lifetime of that session.

use serde::{Deserialize, Serialize};

use super::event::GiftEvent;

/// A team or streamer that events can be attributed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityConfig {
    pub id: String,
    pub name: String,

    /// Gift name that explicitly attributes a sender to this entity
    #[serde(default)]
    pub binding_trigger: Option<String>,

    /// Upstream room this streamer broadcasts from, if it has its own
    #[serde(default)]
    pub room_id: Option<String>,

    /// Scales the published value of events attributed to this entity
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

/// Unicode-aware case-insensitive name comparison.
fn names_match(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

impl EntityConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            binding_trigger: None,
            room_id: None,
            multiplier: default_multiplier(),
        }
    }

    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.binding_trigger = Some(trigger.into());
        self
    }

    pub fn with_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Case-insensitive trigger comparison.
    pub fn is_triggered_by(&self, value: &str) -> bool {
        self.binding_trigger
            .as_deref()
            .map(|t| !t.is_empty() && names_match(t, value))
            .unwrap_or(false)
    }
}

/// The set of entities competing in one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TeamConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
}

impl TeamConfig {
    /// Distinct upstream room ids declared by entities, in declaration order.
    pub fn entity_rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = Vec::new();
        for room in self
            .entities
            .iter()
            .filter_map(|e| e.room_id.as_deref())
            .filter(|r| !r.trim().is_empty())
        {
            if !rooms.iter().any(|r| r == room) {
                rooms.push(room.to_string());
            }
        }
        rooms
    }
}

/// Operator-supplied gift value override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftDefinition {
    pub id: String,
    pub name: String,
    pub value: i64,
}

/// Ordered gift-definition table.
///
/// Lookup is by id first, then by case-insensitive name. Within each pass
/// the first matching definition wins.
#[derive(Debug, Clone, Default)]
pub struct GiftCatalog {
    definitions: Vec<GiftDefinition>,
}

impl GiftCatalog {
    pub fn new(definitions: Vec<GiftDefinition>) -> Self {
        Self { definitions }
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn lookup(&self, gift_id: &str, gift_name: &str) -> Option<&GiftDefinition> {
        self.definitions
            .iter()
            .find(|d| !gift_id.is_empty() && d.id == gift_id)
            .or_else(|| {
                self.definitions
                    .iter()
                    .find(|d| names_match(&d.name, gift_name))
            })
    }

    /// Override the gift's declared unit value if a definition matches.
    pub fn apply(&self, gift: &mut GiftEvent) {
        if let Some(definition) = self.lookup(&gift.gift_id, &gift.gift_name) {
            gift.value = definition.value;
        }
    }
}
