//! Raw region-creation options and the resolved immutable definition.
//!
//! [`RegionOptions`] is the wire-shaped request the administrative layer
//! hands over: every field optional, nothing validated yet.
//! [`RegionOptions::resolve`] turns it into a [`RegionDefinition`] (eviction
//! policy derived, grid defaults filled in), which is read-only input to
//! region construction. No mutation path is exposed back.

use crate::config::eviction::{EvictionPolicy, ObjectSizerRef, resolve_eviction};
use crate::config::partition::PartitionSpec;

/// Grid default for whether a write blocks until durably persisted.
pub const DEFAULT_DISK_SYNCHRONOUS: bool = true;

/// Grid default for per-entry concurrency-stamp checking.
pub const DEFAULT_CONCURRENCY_CHECKS_ENABLED: bool = true;

/// Grid default for value cloning on delta application.
pub const DEFAULT_CLONING_ENABLED: bool = false;

/// Grid default for the expected number of concurrently writing threads.
pub const DEFAULT_CONCURRENCY_LEVEL: u32 = 16;

/// Raw, partially specified region-creation request.
///
/// Mirrors what the administrative layer sends: every field is optional and
/// `None` means "not specified, use the grid default". The eviction fields
/// feed [`resolve_eviction`]; an absent `eviction_action` means the region
/// gets no eviction policy no matter which limits were supplied.
#[derive(Debug, Clone, Default)]
pub struct RegionOptions {
    pub eviction_action: Option<String>,
    pub max_memory: Option<u64>,
    pub max_entries: Option<u64>,
    pub object_sizer: Option<ObjectSizerRef>,
    pub partition: PartitionSpec,
    pub disk_synchronous: Option<bool>,
    pub concurrency_checks_enabled: Option<bool>,
    pub cloning_enabled: Option<bool>,
    pub concurrency_level: Option<u32>,
}

impl RegionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Eviction policy this request resolves to, or `None` when no action
    /// was supplied.
    pub fn eviction_policy(&self) -> Option<EvictionPolicy> {
        resolve_eviction(
            self.eviction_action.as_deref(),
            self.max_memory,
            self.max_entries,
            self.object_sizer.clone(),
        )
    }

    /// Resolves the request into the immutable definition attached to the
    /// region at creation time, filling grid defaults for absent flags.
    pub fn resolve(self) -> RegionDefinition {
        let eviction = self.eviction_policy();
        RegionDefinition {
            eviction,
            partition: self.partition,
            disk_synchronous: self.disk_synchronous.unwrap_or(DEFAULT_DISK_SYNCHRONOUS),
            concurrency_checks_enabled: self
                .concurrency_checks_enabled
                .unwrap_or(DEFAULT_CONCURRENCY_CHECKS_ENABLED),
            cloning_enabled: self.cloning_enabled.unwrap_or(DEFAULT_CLONING_ENABLED),
            concurrency_level: self.concurrency_level.unwrap_or(DEFAULT_CONCURRENCY_LEVEL),
        }
    }
}

/// Immutable, internally consistent region definition.
#[derive(Debug, Clone)]
pub struct RegionDefinition {
    eviction: Option<EvictionPolicy>,
    partition: PartitionSpec,
    disk_synchronous: bool,
    concurrency_checks_enabled: bool,
    cloning_enabled: bool,
    concurrency_level: u32,
}

impl RegionDefinition {
    pub fn eviction(&self) -> Option<&EvictionPolicy> {
        self.eviction.as_ref()
    }

    pub fn partition(&self) -> &PartitionSpec {
        &self.partition
    }

    /// Whether a spill blocks until the record is durably flushed.
    pub fn disk_synchronous(&self) -> bool {
        self.disk_synchronous
    }

    /// Whether incoming versioned writes are checked against the stored
    /// concurrency stamp.
    pub fn concurrency_checks_enabled(&self) -> bool {
        self.concurrency_checks_enabled
    }

    /// Whether the delta layer clones values before applying deltas.
    /// Consumed by the embedding runtime, not by this crate.
    pub fn cloning_enabled(&self) -> bool {
        self.cloning_enabled
    }

    /// Expected number of concurrently writing threads; sizes the region's
    /// shard count.
    pub fn concurrency_level(&self) -> u32 {
        self.concurrency_level
    }
}
