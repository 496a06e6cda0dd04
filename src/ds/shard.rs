//! Shared sharding helpers for consistent shard selection.
//!
//! Provides the deterministic key-to-shard mapping used by both the region's
//! entry maps and the eviction controller's recency rings. Routing the same
//! key to the same shard on both sides keeps per-key lock footprints small
//! and lets the controller find a key's recency state without a global index.
//!
//! ## Key Concepts
//!
//! - **Deterministic mapping**: given the same key, seed, and shard count,
//!   `shard_of` always returns the same shard index.
//! - **Seed isolation**: different seeds produce different distributions, so
//!   two structures sharing a key space need not share hot shards.
//! - **Power-of-two counts**: the requested shard count is rounded up so the
//!   index reduces to a mask instead of a modulo.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

/// Deterministic shard router using a seeded `FxHasher`.
///
/// Maps any `Hash`able key to a shard index in `[0, shard_count)`. The same
/// `(key, seed, shards)` tuple always produces the same result.
///
/// # Example
///
/// ```
/// use gridkit::ds::ShardRouter;
///
/// let router = ShardRouter::new(8, 42);
/// let shard = router.shard_of(&"order:1291");
/// assert!(shard < router.shard_count());
/// assert_eq!(router.shard_of(&"order:1291"), shard);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardRouter {
    mask: usize,
    seed: u64,
}

impl ShardRouter {
    /// Creates a router over `shards` shards, rounded up to a power of two.
    ///
    /// A request for zero shards is clamped to one.
    pub fn new(shards: usize, seed: u64) -> Self {
        let shards = shards.max(1).next_power_of_two();
        Self {
            mask: shards - 1,
            seed,
        }
    }

    /// Returns the number of shards (always a power of two).
    pub fn shard_count(&self) -> usize {
        self.mask + 1
    }

    /// Maps a key to a shard index in `[0, shard_count)`.
    pub fn shard_of<K: Hash>(&self, key: &K) -> usize {
        let mut hasher = FxHasher::default();
        self.seed.hash(&mut hasher);
        key.hash(&mut hasher);
        (hasher.finish() as usize) & self.mask
    }
}

impl Default for ShardRouter {
    /// Creates a single-shard router with seed 0.
    fn default() -> Self {
        Self::new(1, 0)
    }
}
