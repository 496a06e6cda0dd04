//! Pin-aware clock ring for approximate-LRU victim sampling.
//!
//! One ring tracks the recency state of the region entries routed to its
//! shard: a second-chance reference bit, a pin count for in-flight accesses,
//! and the occupancy weight recorded for the entry. The eviction controller
//! sweeps the ring with a clock hand when the region breaches its resource
//! bound.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────────┐
//!   │                          PinRing<K>                              │
//!   │                                                                  │
//!   │   index: FxHashMap<K, usize>   (key -> slot index)               │
//!   │   slots: Vec<Option<Slot>>     free: Vec<usize>                  │
//!   │                                                                  │
//!   │   slot[0] = { key A, w=120, ref=1, pins=0 }     hand ──┐         │
//!   │   slot[1] = { key B, w=40,  ref=0, pins=2 }            ▼         │
//!   │   slot[2] = { key C, w=75,  ref=0, pins=0 }    [A] [B] [C]       │
//!   │   slot[3] = None (free)                                          │
//!   │                                                                  │
//!   │   Victim sweep: A ref=1 -> clear, advance                        │
//!   │                 B pinned -> skip, advance                        │
//!   │                 C ref=0, unpinned -> evict C                     │
//!   └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Differences from a capacity-bounded second-chance ring
//!
//! - The ring never evicts on insert; it grows with the region and the
//!   controller drives [`pop_victim`](PinRing::pop_victim) explicitly when a
//!   bound is breached.
//! - Pinned slots are skipped by the sweep without losing their reference
//!   bit, so an in-flight access can never be selected.
//! - Each slot records the occupancy weight reported for the entry, letting
//!   the caller settle the usage counter exactly on eviction or removal.
//!
//! Ordering is approximate LRU: concurrent touches only flip a reference
//! bit, so the sweep sees bounded-stale recency instead of an exactly
//! ordered list.

use std::hash::Hash;

use rustc_hash::FxHashMap;

#[derive(Debug)]
struct Slot<K> {
    key: K,
    weight: u64,
    referenced: bool,
    pins: u32,
}

/// Growable clock ring tracking recency bits, pin counts, and recorded
/// weights for one shard of a region's key space.
#[derive(Debug, Default)]
pub struct PinRing<K> {
    slots: Vec<Option<Slot<K>>>,
    index: FxHashMap<K, usize>,
    free: Vec<usize>,
    hand: usize,
    len: usize,
}

impl<K> PinRing<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            index: FxHashMap::default(),
            free: Vec::new(),
            hand: 0,
            len: 0,
        }
    }

    /// Returns the number of tracked entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no entries are tracked.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if `key` is tracked.
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Returns the recorded weight for `key`.
    pub fn weight(&self, key: &K) -> Option<u64> {
        let idx = *self.index.get(key)?;
        self.slot(idx).map(|slot| slot.weight)
    }

    /// Tracks `key` at `weight`, or re-records the weight of an already
    /// tracked key. Returns the previous weight for an update.
    ///
    /// Fresh and updated entries both start referenced, so a newly written
    /// entry survives one full hand revolution before becoming a candidate.
    pub fn insert(&mut self, key: K, weight: u64) -> Option<u64> {
        if let Some(&idx) = self.index.get(&key) {
            let slot = self.slot_mut(idx).expect("indexed slot missing");
            slot.referenced = true;
            return Some(std::mem::replace(&mut slot.weight, weight));
        }

        let slot = Slot {
            key: key.clone(),
            weight,
            referenced: true,
            pins: 0,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(slot);
                idx
            },
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            },
        };
        self.index.insert(key, idx);
        self.len += 1;
        None
    }

    /// Sets the reference bit for `key`; returns `false` if untracked.
    pub fn touch(&mut self, key: &K) -> bool {
        let Some(&idx) = self.index.get(key) else {
            return false;
        };
        if let Some(slot) = self.slot_mut(idx) {
            slot.referenced = true;
            return true;
        }
        false
    }

    /// Increments the pin count for `key`; returns `false` if untracked.
    pub fn pin(&mut self, key: &K) -> bool {
        let Some(&idx) = self.index.get(key) else {
            return false;
        };
        if let Some(slot) = self.slot_mut(idx) {
            slot.pins += 1;
            return true;
        }
        false
    }

    /// Decrements the pin count for `key`; returns `false` if untracked.
    pub fn unpin(&mut self, key: &K) -> bool {
        let Some(&idx) = self.index.get(key) else {
            return false;
        };
        if let Some(slot) = self.slot_mut(idx) {
            slot.pins = slot.pins.saturating_sub(1);
            return true;
        }
        false
    }

    /// Returns `true` if `key` is tracked and currently pinned.
    pub fn is_pinned(&self, key: &K) -> bool {
        self.index
            .get(key)
            .and_then(|&idx| self.slot(idx))
            .is_some_and(|slot| slot.pins > 0)
    }

    /// Stops tracking `key`, returning its recorded weight.
    pub fn remove(&mut self, key: &K) -> Option<u64> {
        let idx = self.index.remove(key)?;
        let slot = self.slots[idx].take().expect("indexed slot missing");
        self.free.push(idx);
        self.len -= 1;
        Some(slot.weight)
    }

    /// Second-chance sweep: advances the hand, clearing reference bits, and
    /// removes the first unreferenced, unpinned entry encountered.
    ///
    /// Returns `(key, recorded_weight)`, or `None` when every tracked entry
    /// is pinned. Pinned slots are skipped without losing their reference
    /// bit. The sweep is bounded at two revolutions: the first may only be
    /// clearing bits, the second must then find any unpinned slot.
    pub fn pop_victim(&mut self) -> Option<(K, u64)> {
        if self.len == 0 {
            return None;
        }
        let cap = self.slots.len();
        for _ in 0..cap * 2 {
            let idx = self.hand;
            self.hand = (self.hand + 1) % cap;
            let Some(slot) = self.slots[idx].as_mut() else {
                continue;
            };
            if slot.pins > 0 {
                continue;
            }
            if slot.referenced {
                slot.referenced = false;
                continue;
            }

            let slot = self.slots[idx].take().expect("occupied slot missing");
            self.index.remove(&slot.key);
            self.free.push(idx);
            self.len -= 1;
            return Some((slot.key, slot.weight));
        }
        None
    }
}

impl<K> PinRing<K> {
    fn slot(&self, idx: usize) -> Option<&Slot<K>> {
        self.slots.get(idx)?.as_ref()
    }

    fn slot_mut(&mut self, idx: usize) -> Option<&mut Slot<K>> {
        self.slots.get_mut(idx)?.as_mut()
    }
}
