//! Event attribution.
//!
//! Decides which configured entity an incoming event belongs to. Gift names
//! act as explicit votes: a gift whose name matches an entity's binding
//! trigger is attributed to that entity and binds its sender to it for a
//! bounded window. Later ambiguous events from the same sender (chat, or
//! gifts without a trigger) follow the most recent live binding. Anything
//! else is unattributed and must be dropped by the caller.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::domain::entities::{EntityConfig, LiveEvent};

/// Default lifetime of a sender binding.
pub const DEFAULT_BINDING_TTL: Duration = Duration::from_secs(60);

/// A sender's most recent explicit vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderBinding {
    pub entity_id: String,
    pub expires_at: Instant,
}

impl SenderBinding {
    pub fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Sender id to entity id cache with lazy expiry.
///
/// Holds at most one binding per sender; binding again overwrites. Binding
/// also sweeps expired entries at most once per TTL, so senders that never
/// come back do not accumulate.
#[derive(Debug)]
pub struct SenderBindingCache {
    ttl: Duration,
    bindings: HashMap<String, SenderBinding>,
    last_sweep: Option<Instant>,
}

impl SenderBindingCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            bindings: HashMap::new(),
            last_sweep: None,
        }
    }

    /// Bind `sender_id` to `entity_id` with a fresh TTL starting at `now`.
    pub fn bind(&mut self, sender_id: &str, entity_id: &str, now: Instant) {
        let sweep_due = self
            .last_sweep
            .map_or(true, |at| now.saturating_duration_since(at) >= self.ttl);
        if sweep_due {
            self.purge_expired(now);
            self.last_sweep = Some(now);
        }

        self.bindings.insert(
            sender_id.to_string(),
            SenderBinding {
                entity_id: entity_id.to_string(),
                expires_at: now + self.ttl,
            },
        );
    }

    /// Live binding target for `sender_id`. Expired entries are evicted.
    pub fn lookup(&mut self, sender_id: &str, now: Instant) -> Option<&str> {
        let expired = match self.bindings.get(sender_id) {
            Some(binding) => !binding.is_live(now),
            None => return None,
        };
        if expired {
            self.bindings.remove(sender_id);
            return None;
        }
        self.bindings.get(sender_id).map(|b| b.entity_id.as_str())
    }

    /// Drop every expired binding. Returns how many were removed.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.bindings.len();
        self.bindings.retain(|_, b| b.is_live(now));
        before - self.bindings.len()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Bindings still live at `now`, without evicting anything.
    pub fn live_len(&self, now: Instant) -> usize {
        self.bindings.values().filter(|b| b.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
        self.last_sweep = None;
    }
}

/// How an attribution was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributionSource {
    /// The event carried a matching binding trigger
    Trigger,
    /// The sender had a live binding from an earlier vote
    Binding,
}

/// The entity an event was attributed to.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribution {
    pub entity_id: String,
    pub entity_name: String,
    pub multiplier: f64,
    pub source: AttributionSource,
}

impl Attribution {
    fn from_entity(entity: &EntityConfig, source: AttributionSource) -> Self {
        Self {
            entity_id: entity.id.clone(),
            entity_name: entity.name.clone(),
            multiplier: entity.multiplier,
            source,
        }
    }

    /// Apply the entity multiplier to a raw value.
    pub fn scale(&self, value: i64) -> i64 {
        if (self.multiplier - 1.0).abs() < f64::EPSILON {
            return value;
        }
        (value as f64 * self.multiplier).round() as i64
    }
}

/// Strict-mode attribution over a fixed entity list.
#[derive(Debug)]
pub struct BindingResolver {
    entities: Vec<EntityConfig>,
    cache: SenderBindingCache,
}

impl BindingResolver {
    pub fn new(entities: Vec<EntityConfig>, binding_ttl: Duration) -> Self {
        Self {
            entities,
            cache: SenderBindingCache::new(binding_ttl),
        }
    }

    /// Entity whose binding trigger matches `trigger`, in configuration order.
    pub fn match_trigger<'a>(entities: &'a [EntityConfig], trigger: &str) -> Option<&'a EntityConfig> {
        entities.iter().find(|e| e.is_triggered_by(trigger))
    }

    /// Resolve the owning entity of `event` at `now`.
    ///
    /// A trigger match wins and (re)binds the sender. Otherwise a live
    /// sender binding is used. `None` means the event must not be counted.
    pub fn resolve(&mut self, event: &LiveEvent, now: Instant) -> Option<Attribution> {
        let sender_id = event.sender_id();

        if let Some(entity) = event
            .trigger()
            .and_then(|t| Self::match_trigger(&self.entities, t))
        {
            if !sender_id.is_empty() {
                self.cache.bind(sender_id, &entity.id, now);
            }
            return Some(Attribution::from_entity(entity, AttributionSource::Trigger));
        }

        if sender_id.is_empty() {
            return None;
        }

        let entity_id = self.cache.lookup(sender_id, now)?.to_string();
        self.entities
            .iter()
            .find(|e| e.id == entity_id)
            .map(|e| Attribution::from_entity(e, AttributionSource::Binding))
    }

    pub fn entities(&self) -> &[EntityConfig] {
        &self.entities
    }

    pub fn cache(&self) -> &SenderBindingCache {
        &self.cache
    }
}
