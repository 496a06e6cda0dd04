//! Per-region capacity enforcement.
//!
//! One controller per region (or per bucket of a partitioned region). The
//! controller owns the recency-sampling structure and the running usage
//! counter; the region runtime notifies it on every mutation and lookup and
//! applies the victims it returns.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────────┐
//!   │                     EvictionController<K>                        │
//!   │                                                                  │
//!   │   usage: AtomicU64          (bytes or entries, fetch-add only)   │
//!   │                                                                  │
//!   │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐    │
//!   │   │ Mutex     │  │ Mutex     │  │ Mutex     │  │ Mutex     │    │
//!   │   │ PinRing 0 │  │ PinRing 1 │  │ PinRing 2 │  │ PinRing 3 │    │
//!   │   └───────────┘  └───────────┘  └───────────┘  └───────────┘    │
//!   │         ▲            shard = router.shard_of(key)               │
//!   │         │                                                        │
//!   │   on_write / on_read / pin / unpin / on_removed                  │
//!   └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Writers touching different shards never serialize on one lock; the usage
//! counter is the only global mutable word and is maintained with atomic
//! fetch-add. Victim selection scans shards holding at most one shard lock
//! at a time, so ordering across shards is only approximately LRU: the
//! structure trades exact ordering for bounded staleness under contention.
//!
//! ## Accounting Protocol
//!
//! Every tracked entry carries the weight recorded at its last write. The
//! linearization point for an entry's occupancy is its presence in a ring:
//!
//! - `on_write` (re-)records the weight and settles the counter by the delta;
//! - a popped victim has its weight released by the controller before the
//!   key is handed back for action application;
//! - `on_removed` releases whatever weight is still tracked, so an explicit
//!   remove racing a victim application settles the counter exactly once.
//!
//! Victims returned by [`on_write`](EvictionController::on_write) are
//! therefore already untracked; the region must apply the policy action but
//! must not report them back through `on_removed` (a redundant call is a
//! harmless no-op).

use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::warn;

use crate::config::{EvictionAlgorithm, EvictionPolicy};
use crate::ds::{PinRing, ShardRouter};
use crate::traits::HeapMonitor;

/// Victims evicted at most per triggering write in heap-percentage mode.
///
/// A process-wide heap sample does not shrink the instant entries drop, so
/// heap-mode eviction works in bounded batches instead of looping until the
/// sample recovers.
const HEAP_EVICTION_BATCH: usize = 8;

/// Runtime knobs injected alongside the resolved policy.
///
/// These are member-wide settings owned by the embedding runtime, not part
/// of the region's policy.
#[derive(Debug, Clone)]
pub struct EvictionConfig {
    /// Heap threshold percent used when the policy algorithm is
    /// `ByHeapPercentage` and the policy limit is zero.
    pub default_heap_percent: u8,
    /// Recency-ring shard count (rounded up to a power of two).
    pub shards: usize,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            default_heap_percent: 80,
            shards: 8,
        }
    }
}

/// Per-region eviction decision engine.
pub struct EvictionController<K> {
    policy: EvictionPolicy,
    router: ShardRouter,
    shards: Vec<Mutex<PinRing<K>>>,
    usage: AtomicU64,
    scan_cursor: AtomicUsize,
    heap_threshold: u8,
    heap: Option<Arc<dyn HeapMonitor>>,
    pressure_events: AtomicU64,
}

impl<K> EvictionController<K>
where
    K: Eq + Hash + Clone,
{
    /// Creates a controller enforcing `policy`.
    ///
    /// `heap` is consulted only under `ByHeapPercentage`; a heap policy with
    /// no monitor never triggers (the member has opted out of sampling).
    pub fn new(
        policy: EvictionPolicy,
        config: EvictionConfig,
        heap: Option<Arc<dyn HeapMonitor>>,
    ) -> Self {
        let router = ShardRouter::new(config.shards, 0x9e37_79b9);
        let shards = (0..router.shard_count())
            .map(|_| Mutex::new(PinRing::new()))
            .collect();
        let heap_threshold = match policy.limit {
            0 => config.default_heap_percent,
            percent => percent.min(100) as u8,
        };
        Self {
            policy,
            router,
            shards,
            usage: AtomicU64::new(0),
            scan_cursor: AtomicUsize::new(0),
            heap_threshold,
            heap,
            pressure_events: AtomicU64::new(0),
        }
    }

    /// The policy this controller enforces.
    pub fn policy(&self) -> &EvictionPolicy {
        &self.policy
    }

    /// Current occupancy: aggregate sized bytes, or the entry count under
    /// `ByEntryCount`.
    pub fn current_usage(&self) -> u64 {
        self.usage.load(Ordering::Acquire)
    }

    /// Times eviction failed to reach the bound because every candidate was
    /// pinned.
    pub fn pressure_events(&self) -> u64 {
        self.pressure_events.load(Ordering::Relaxed)
    }

    /// Effective heap threshold percent (policy limit or injected default).
    pub fn heap_threshold(&self) -> u8 {
        self.heap_threshold
    }

    /// Records a write of `key` at sized weight `size` and returns the
    /// victims that must be applied to bring the region back under its
    /// bound. The returned keys are already untracked here; the caller
    /// applies the policy action to each.
    pub fn on_write(&self, key: &K, size: u64) -> Vec<K> {
        self.record(key, size);
        self.collect_victims()
    }

    /// Recency touch; occupancy unchanged.
    pub fn on_read(&self, key: &K) {
        let shard = self.router.shard_of(key);
        self.shards[shard].lock().touch(key);
    }

    /// Releases the weight still tracked for an entry the region removed.
    /// No-op if the key is untracked (for example an already-popped victim).
    pub fn on_removed(&self, key: &K) {
        let shard = self.router.shard_of(key);
        if let Some(weight) = self.shards[shard].lock().remove(key) {
            self.usage.fetch_sub(weight, Ordering::AcqRel);
        }
    }

    /// Re-registers an entry whose victim application failed and which
    /// therefore remains resident. No victim collection: the caller is
    /// already inside an eviction pass.
    pub fn reinstate(&self, key: &K, size: u64) {
        self.record(key, size);
    }

    /// (Re-)records `key` at `size` and settles the usage counter by the
    /// delta against any previously recorded weight.
    fn record(&self, key: &K, size: u64) {
        let size = self.occupancy_of(size);
        let shard = self.router.shard_of(key);
        let previous = self.shards[shard].lock().insert(key.clone(), size);
        match previous {
            Some(old) if old >= size => {
                self.usage.fetch_sub(old - size, Ordering::AcqRel);
            },
            Some(old) => {
                self.usage.fetch_add(size - old, Ordering::AcqRel);
            },
            None => {
                self.usage.fetch_add(size, Ordering::AcqRel);
            },
        }
    }

    /// Marks `key` as in-flight; a pinned entry is never selected as a
    /// victim. Returns `false` if the key is untracked.
    pub fn pin(&self, key: &K) -> bool {
        let shard = self.router.shard_of(key);
        self.shards[shard].lock().pin(key)
    }

    /// Releases one pin on `key`.
    pub fn unpin(&self, key: &K) -> bool {
        let shard = self.router.shard_of(key);
        self.shards[shard].lock().unpin(key)
    }

    fn occupancy_of(&self, size: u64) -> u64 {
        match self.policy.algorithm {
            EvictionAlgorithm::ByEntryCount => 1,
            EvictionAlgorithm::ByAggregateMemorySize | EvictionAlgorithm::ByHeapPercentage => size,
        }
    }

    fn over_limit(&self) -> bool {
        match self.policy.algorithm {
            EvictionAlgorithm::ByHeapPercentage => match &self.heap {
                Some(monitor) => monitor.used_percent() > self.heap_threshold,
                None => false,
            },
            EvictionAlgorithm::ByAggregateMemorySize | EvictionAlgorithm::ByEntryCount => {
                self.current_usage() > self.policy.limit
            },
        }
    }

    fn collect_victims(&self) -> Vec<K> {
        let heap_mode = matches!(self.policy.algorithm, EvictionAlgorithm::ByHeapPercentage);
        let mut victims = Vec::new();
        while self.over_limit() {
            if heap_mode && victims.len() >= HEAP_EVICTION_BATCH {
                break;
            }
            match self.pop_global_victim() {
                Some((key, weight)) => {
                    self.usage.fetch_sub(weight, Ordering::AcqRel);
                    victims.push(key);
                },
                None => {
                    self.pressure_events.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        usage = self.current_usage(),
                        limit = self.policy.limit,
                        "eviction cannot reach the bound: all candidates pinned"
                    );
                    break;
                },
            }
        }
        victims
    }

    /// Scans shards for the next victim, holding at most one shard lock at a
    /// time. The start shard rotates so one shard is not drained first.
    fn pop_global_victim(&self) -> Option<(K, u64)> {
        let start = self.scan_cursor.fetch_add(1, Ordering::Relaxed);
        let count = self.shards.len();
        for i in 0..count {
            let shard = (start + i) % count;
            if let Some(victim) = self.shards[shard].lock().pop_victim() {
                return Some(victim);
            }
        }
        None
    }
}

impl<K> std::fmt::Debug for EvictionController<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvictionController")
            .field("policy", &self.policy)
            .field("usage", &self.usage.load(Ordering::Relaxed))
            .field("shards", &self.shards.len())
            .finish_non_exhaustive()
    }
}
