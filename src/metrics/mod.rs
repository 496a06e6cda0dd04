//! Region-level operational counters.
//!
//! Counters are written with relaxed atomics on the hot paths and read as a
//! copyable [`RegionMetrics`] snapshot. Pressure events (eviction could not
//! bring the region under its bound because every candidate was pinned) are
//! reported here and through `tracing`; they are conditions, not errors.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of region-level metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionMetrics {
    pub read_hits: u64,
    pub read_misses: u64,
    pub writes: u64,
    pub removes: u64,
    pub evictions: u64,
    pub spills: u64,
    pub promotions: u64,
    pub distributed_destroys: u64,
    pub stale_rejections: u64,
    pub pressure_events: u64,
}

/// Atomically maintained counters behind a [`RegionMetrics`] snapshot.
#[derive(Debug, Default)]
pub struct RegionCounters {
    read_hits: AtomicU64,
    read_misses: AtomicU64,
    writes: AtomicU64,
    removes: AtomicU64,
    evictions: AtomicU64,
    spills: AtomicU64,
    promotions: AtomicU64,
    distributed_destroys: AtomicU64,
    stale_rejections: AtomicU64,
}

impl RegionCounters {
    /// Copies the current counter values. `pressure_events` is owned by the
    /// eviction controller and merged in by the region snapshot path.
    pub fn snapshot(&self) -> RegionMetrics {
        RegionMetrics {
            read_hits: self.read_hits.load(Ordering::Relaxed),
            read_misses: self.read_misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            spills: self.spills.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            distributed_destroys: self.distributed_destroys.load(Ordering::Relaxed),
            stale_rejections: self.stale_rejections.load(Ordering::Relaxed),
            pressure_events: 0,
        }
    }

    pub(crate) fn inc_read_hit(&self) {
        self.read_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_read_miss(&self) {
        self.read_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_remove(&self) {
        self.removes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_spill(&self) {
        self.spills.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_distributed_destroy(&self) {
        self.distributed_destroys.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_stale_rejection(&self) {
        self.stale_rejections.fetch_add(1, Ordering::Relaxed);
    }
}
