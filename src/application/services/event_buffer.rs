//! Time-windowed event buffer.
//!
//! Holds ingested events until the stream session confirms they reached the
//! downstream bus. Each entry carries a sequence number; a drain hands out
//! copies and only `acknowledge` removes an entry, so events whose publish
//! never completed are handed out again by the next drain. Entries older
//! than the TTL are evicted by the periodic cleanup pass and are never
//! returned from a drain.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::domain::LiveEvent;

/// Default buffer TTL.
pub const DEFAULT_BUFFER_TTL: Duration = Duration::from_secs(5 * 60);

/// A buffered event tagged with its delivery sequence number.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub seq: u64,
    pub event: LiveEvent,
}

#[derive(Debug, Clone)]
struct BufferedEvent {
    seq: u64,
    event: LiveEvent,
    enqueued_at: Instant,
}

/// FIFO of undelivered events with age-based eviction.
#[derive(Debug)]
pub struct EventBuffer {
    ttl: Duration,
    next_seq: u64,
    entries: VecDeque<BufferedEvent>,
}

impl EventBuffer {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            next_seq: 1,
            entries: VecDeque::new(),
        }
    }

    /// Append `event` and return its sequence number.
    pub fn push(&mut self, event: LiveEvent, now: Instant) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back(BufferedEvent {
            seq,
            event,
            enqueued_at: now,
        });
        seq
    }

    fn is_expired(&self, entry: &BufferedEvent, now: Instant) -> bool {
        now.saturating_duration_since(entry.enqueued_at) > self.ttl
    }

    /// Remove every entry older than the TTL. Returns how many were removed.
    pub fn evict_expired(&mut self, now: Instant) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|e| now.saturating_duration_since(e.enqueued_at) <= ttl);
        before - self.entries.len()
    }

    /// Every unexpired, unacknowledged event in arrival order.
    ///
    /// Entries stay buffered until acknowledged.
    pub fn drain(&mut self, now: Instant) -> Vec<PendingEvent> {
        self.evict_expired(now);
        self.entries
            .iter()
            .map(|e| PendingEvent {
                seq: e.seq,
                event: e.event.clone(),
            })
            .collect()
    }

    /// Mark `seq` as delivered. Returns `false` if it was already gone.
    pub fn acknowledge(&mut self, seq: u64) -> bool {
        // Sequence numbers are pushed in increasing order.
        match self.entries.binary_search_by_key(&seq, |e| e.seq) {
            Ok(index) => {
                self.entries.remove(index);
                true
            }
            Err(_) => false,
        }
    }

    /// Undelivered entries that would survive a cleanup pass at `now`.
    pub fn live_len(&self, now: Instant) -> usize {
        self.entries
            .iter()
            .filter(|e| !self.is_expired(e, now))
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry. Sequence numbers keep increasing across clears.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_TTL)
    }
}
