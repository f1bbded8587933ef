//! Future-step message buffer.
//!
//! Consensus messages that arrive ahead of the node's `(round, step)` are
//! parked here and drained, in arrival order, the moment the node reaches
//! their slot. Draining happens before any new network input is processed,
//! which makes early arrivals replay deterministically.

use sba_core::Event;
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

/// Bounded per-`(round, step)` buffer.
pub struct FutureQueue {
    slots: BTreeMap<(u64, u8), VecDeque<Event>>,
    capacity_per_slot: usize,
}

impl FutureQueue {
    pub fn new(capacity_per_slot: usize) -> Self {
        Self {
            slots: BTreeMap::new(),
            capacity_per_slot,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.values().map(|q| q.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Park an event under `(round, step)`. Overflowing a slot drops the
    /// event.
    pub fn push(&mut self, round: u64, step: u8, event: Event) {
        let slot = self.slots.entry((round, step)).or_default();
        if slot.len() >= self.capacity_per_slot {
            debug!(round, step, kind = event.type_name(), "future queue full, dropping");
            return;
        }
        slot.push_back(event);
    }

    /// Remove and return everything parked for `round` at steps up to and
    /// including `step`, in `(step, arrival)` order. Slots of earlier
    /// rounds are pruned.
    pub fn drain_up_to(&mut self, round: u64, step: u8) -> Vec<Event> {
        self.slots.retain(|(r, _), _| *r >= round);

        let keys: Vec<(u64, u8)> = self
            .slots
            .range((round, 0)..=(round, step))
            .map(|(k, _)| *k)
            .collect();
        let mut drained = Vec::new();
        for key in keys {
            if let Some(queue) = self.slots.remove(&key) {
                drained.extend(queue);
            }
        }
        drained
    }
}
