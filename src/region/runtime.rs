//! Region runtime: the cached key→value store.
//!
//! Entries live in sharded hash maps (per-shard `RwLock`, shard chosen by
//! the same deterministic router the eviction controller uses), so worker
//! threads touching different shards never serialize on one lock. Every
//! mutation notifies the region's [`EvictionController`]; the victims it
//! returns are applied here according to the policy action:
//!
//! - **LocalRemove**: delete from this member's map only.
//! - **SpillToSecondary**: serialize the value into the [`OverflowStore`]
//!   and swap in a placeholder; a later read promotes it back.
//! - **DistributedRemove**: delete locally and notify the
//!   [`DistributionObserver`] so redundant copies are destroyed too.
//!
//! ## Ordering Guarantees
//!
//! Per-key operations are linearizable with respect to each other: all
//! mutations of a key happen under its shard's write lock, and replicated
//! writes are checked against the entry's concurrency stamp when the region
//! has concurrency checks enabled. Victim selection across keys carries no
//! ordering guarantee beyond approximately least-recently-used.
//!
//! ## Blocking Points
//!
//! A spill blocks the path that triggered it when the region is
//! disk-synchronous; promotion blocks the calling read until the bytes are
//! retrieved. Both happen under the affected shard's write lock, which is
//! what makes spill completion and placeholder installation atomic.

use std::hash::Hash;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::config::{EvictionAction, RegionDefinition};
use crate::ds::ShardRouter;
use crate::error::RegionError;
use crate::eviction::{EvictionConfig, EvictionController};
use crate::metrics::{RegionCounters, RegionMetrics};
use crate::overflow::OverflowStore;
use crate::region::entry::{RegionEntry, Stored};
use crate::traits::{DistributionObserver, EntryCodec, EntrySizer, HeapMonitor};

const MAP_ROUTER_SEED: u64 = 0x6772_6964;

type Shard<K, V> = RwLock<FxHashMap<K, RegionEntry<V>>>;

/// Builder assembling a [`RegionRuntime`] from a resolved definition and the
/// member-level collaborators.
pub struct RegionBuilder<K, V> {
    name: String,
    definition: RegionDefinition,
    eviction_config: EvictionConfig,
    heap: Option<Arc<dyn HeapMonitor>>,
    overflow_dir: Option<PathBuf>,
    sizer: Option<Arc<dyn EntrySizer<V>>>,
    observer: Option<Arc<dyn DistributionObserver<K>>>,
}

impl<K, V> RegionBuilder<K, V> {
    pub fn new(name: impl Into<String>, definition: RegionDefinition) -> Self {
        Self {
            name: name.into(),
            definition,
            eviction_config: EvictionConfig::default(),
            heap: None,
            overflow_dir: None,
            sizer: None,
            observer: None,
        }
    }

    /// Member-wide eviction knobs (default heap threshold, shard count).
    pub fn eviction_config(mut self, config: EvictionConfig) -> Self {
        self.eviction_config = config;
        self
    }

    /// Heap sampler consulted by heap-percentage eviction.
    pub fn heap_monitor(mut self, monitor: Arc<dyn HeapMonitor>) -> Self {
        self.heap = Some(monitor);
        self
    }

    /// Directory holding this region's spill log. Defaults to the system
    /// temporary directory.
    pub fn overflow_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.overflow_dir = Some(dir.into());
        self
    }

    /// Sizer resolving a resident value to its occupancy weight. Defaults to
    /// the value's shallow size, which ignores heap-owned payloads; regions
    /// with an aggregate-memory policy should supply a real sizer.
    pub fn sizer(mut self, sizer: Arc<dyn EntrySizer<V>>) -> Self {
        self.sizer = Some(sizer);
        self
    }

    /// Replication hook notified of distributed destroys.
    pub fn distribution_observer(mut self, observer: Arc<dyn DistributionObserver<K>>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Constructs the runtime, opening the spill log when the policy action
    /// is overflow-to-disk.
    pub fn build(self) -> Result<RegionRuntime<K, V>, RegionError>
    where
        K: Eq + Hash + Clone + EntryCodec,
        V: EntryCodec,
    {
        let controller = self.definition.eviction().map(|policy| {
            EvictionController::new(policy.clone(), self.eviction_config.clone(), self.heap.clone())
        });
        let overflow = match self.definition.eviction() {
            Some(policy) if policy.action == EvictionAction::SpillToSecondary => {
                let dir = self.overflow_dir.unwrap_or_else(std::env::temp_dir);
                let path = dir.join(format!("{}.spill", self.name));
                Some(OverflowStore::open(path, self.definition.disk_synchronous())?)
            },
            _ => None,
        };
        let sizer: Arc<dyn EntrySizer<V>> = match self.sizer {
            Some(sizer) => sizer,
            None => Arc::new(|value: &V| std::mem::size_of_val(value) as u64),
        };
        let router = ShardRouter::new(self.definition.concurrency_level() as usize, MAP_ROUTER_SEED);
        let shards = (0..router.shard_count())
            .map(|_| RwLock::new(FxHashMap::default()))
            .collect();
        Ok(RegionRuntime {
            name: self.name,
            definition: self.definition,
            router,
            shards,
            controller,
            overflow,
            sizer,
            observer: self.observer,
            counters: RegionCounters::default(),
        })
    }
}

/// The cached key→value store for one region (or one bucket of a
/// partitioned region).
pub struct RegionRuntime<K, V> {
    name: String,
    definition: RegionDefinition,
    router: ShardRouter,
    shards: Vec<Shard<K, V>>,
    controller: Option<EvictionController<K>>,
    overflow: Option<OverflowStore>,
    sizer: Arc<dyn EntrySizer<V>>,
    observer: Option<Arc<dyn DistributionObserver<K>>>,
    counters: RegionCounters,
}

impl<K, V> RegionRuntime<K, V>
where
    K: Eq + Hash + Clone + EntryCodec,
    V: EntryCodec,
{
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &RegionDefinition {
        &self.definition
    }

    /// Spill log backing this region, when the policy action is
    /// overflow-to-disk. Exposed read-only for out-of-band compaction.
    pub fn overflow(&self) -> Option<&OverflowStore> {
        self.overflow.as_ref()
    }

    /// Current occupancy as tracked by the eviction controller; zero for a
    /// region without an eviction policy.
    pub fn usage(&self) -> u64 {
        self.controller
            .as_ref()
            .map_or(0, EvictionController::current_usage)
    }

    /// Number of entries, resident and spilled.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.read().is_empty())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.shards[self.router.shard_of(key)]
            .read()
            .contains_key(key)
    }

    /// Concurrency stamp of `key`, if present.
    pub fn version_of(&self, key: &K) -> Option<u64> {
        self.shards[self.router.shard_of(key)]
            .read()
            .get(key)
            .map(RegionEntry::version)
    }

    /// Whether `key` currently lives in the overflow store.
    pub fn is_spilled(&self, key: &K) -> bool {
        self.shards[self.router.shard_of(key)]
            .read()
            .get(key)
            .is_some_and(RegionEntry::is_spilled)
    }

    /// Counter snapshot including the controller's pressure events.
    pub fn metrics(&self) -> RegionMetrics {
        let mut snapshot = self.counters.snapshot();
        if let Some(controller) = &self.controller {
            snapshot.pressure_events = controller.pressure_events();
        }
        snapshot
    }

    /// Inserts or updates an entry under a locally bumped concurrency stamp.
    ///
    /// Returns the previous resident value, if any; overwriting a spilled
    /// placeholder returns `None` and orphans the record until compaction.
    pub fn put(&self, key: K, value: V) -> Option<Arc<V>> {
        let value = Arc::new(value);
        let size = self.sizer.size_of(&value);
        let shard = self.router.shard_of(&key);
        let (previous, victims) = {
            let mut map = self.shards[shard].write();
            let previous = match map.get_mut(&key) {
                Some(entry) => {
                    entry.version += 1;
                    match std::mem::replace(&mut entry.stored, Stored::Resident(Arc::clone(&value)))
                    {
                        Stored::Resident(old) => Some(old),
                        Stored::Spilled(_) => None,
                    }
                },
                None => {
                    map.insert(key.clone(), RegionEntry::new(Arc::clone(&value), 1));
                    None
                },
            };
            (previous, self.notify_write(&key, size))
        };
        self.counters.inc_write();
        self.apply_victims(victims);
        previous
    }

    /// Applies a replicated write carrying its own concurrency stamp.
    ///
    /// When the region has concurrency checks enabled, the incoming stamp
    /// must be strictly newer than the stored one or the write is rejected
    /// with [`RegionError::StaleVersion`], independent of eviction. With
    /// checks disabled the write is applied unconditionally.
    pub fn put_versioned(
        &self,
        key: K,
        value: V,
        version: u64,
    ) -> Result<Option<Arc<V>>, RegionError> {
        let value = Arc::new(value);
        let size = self.sizer.size_of(&value);
        let shard = self.router.shard_of(&key);
        let (previous, victims) = {
            let mut map = self.shards[shard].write();
            match map.get_mut(&key) {
                Some(entry) => {
                    if self.definition.concurrency_checks_enabled() && version <= entry.version {
                        self.counters.inc_stale_rejection();
                        return Err(RegionError::StaleVersion {
                            incoming: version,
                            stored: entry.version,
                        });
                    }
                    entry.version = version;
                    let previous = match std::mem::replace(
                        &mut entry.stored,
                        Stored::Resident(Arc::clone(&value)),
                    ) {
                        Stored::Resident(old) => Some(old),
                        Stored::Spilled(_) => None,
                    };
                    (previous, self.notify_write(&key, size))
                },
                None => {
                    map.insert(key.clone(), RegionEntry::new(Arc::clone(&value), version));
                    (None, self.notify_write(&key, size))
                },
            }
        };
        self.counters.inc_write();
        self.apply_victims(victims);
        Ok(previous)
    }

    /// Looks up `key`, touching its recency.
    ///
    /// A spilled entry is promoted back into memory (read-through). The
    /// promotion is re-counted as a fresh write for occupancy accounting and
    /// may itself evict colder entries.
    pub fn get(&self, key: &K) -> Result<Option<Arc<V>>, RegionError> {
        let shard = self.router.shard_of(key);
        {
            let map = self.shards[shard].read();
            match map.get(key) {
                None => {
                    self.counters.inc_read_miss();
                    return Ok(None);
                },
                Some(entry) => {
                    if let Stored::Resident(value) = &entry.stored {
                        let value = Arc::clone(value);
                        drop(map);
                        if let Some(controller) = &self.controller {
                            controller.on_read(key);
                        }
                        self.counters.inc_read_hit();
                        return Ok(Some(value));
                    }
                },
            }
        }
        self.promote(key, shard)
    }

    /// Removes `key`, returning the resident value if there was one.
    /// Removing a spilled entry drops the placeholder; the record itself is
    /// reclaimed by the next compaction.
    pub fn remove(&self, key: &K) -> Option<Arc<V>> {
        let shard = self.router.shard_of(key);
        let entry = {
            let mut map = self.shards[shard].write();
            let entry = map.remove(key)?;
            if let Some(controller) = &self.controller {
                controller.on_removed(key);
            }
            entry
        };
        self.counters.inc_remove();
        match entry.stored {
            Stored::Resident(value) => Some(value),
            Stored::Spilled(_) => None,
        }
    }

    /// Marks `key` as in-flight for the lifetime of the returned guard; a
    /// pinned entry is never selected as an eviction victim. Returns `None`
    /// if the key is absent.
    pub fn pin(&self, key: &K) -> Option<PinGuard<'_, K, V>> {
        let shard = self.router.shard_of(key);
        {
            let map = self.shards[shard].read();
            if !map.contains_key(key) {
                return None;
            }
            if let Some(controller) = &self.controller {
                controller.pin(key);
            }
        }
        Some(PinGuard {
            region: self,
            key: key.clone(),
        })
    }

    fn notify_write(&self, key: &K, size: u64) -> Vec<K> {
        self.controller
            .as_ref()
            .map(|controller| controller.on_write(key, size))
            .unwrap_or_default()
    }

    fn promote(&self, key: &K, shard: usize) -> Result<Option<Arc<V>>, RegionError> {
        let mut map = self.shards[shard].write();
        let Some(entry) = map.get_mut(key) else {
            self.counters.inc_read_miss();
            return Ok(None);
        };
        let reference = match &entry.stored {
            Stored::Resident(value) => {
                // Raced with another promotion of the same key.
                let value = Arc::clone(value);
                drop(map);
                if let Some(controller) = &self.controller {
                    controller.on_read(key);
                }
                self.counters.inc_read_hit();
                return Ok(Some(value));
            },
            Stored::Spilled(reference) => *reference,
        };

        let store = self
            .overflow
            .as_ref()
            .expect("spilled entry without an overflow store");
        let bytes = store.fetch(&reference)?;
        let value = Arc::new(V::decode(&bytes)?);
        entry.stored = Stored::Resident(Arc::clone(&value));
        let size = self.sizer.size_of(&value);
        let victims = self.notify_write(key, size);
        drop(map);

        self.counters.inc_promotion();
        self.counters.inc_read_hit();
        debug!(len = bytes.len(), "promoted spilled entry");
        self.apply_victims(victims);
        Ok(Some(value))
    }

    fn apply_victims(&self, victims: Vec<K>) {
        if victims.is_empty() {
            return;
        }
        let action = self
            .controller
            .as_ref()
            .expect("victims without a controller")
            .policy()
            .action;
        for key in victims {
            match action {
                EvictionAction::LocalRemove => self.evict_remove(&key, false),
                EvictionAction::DistributedRemove => self.evict_remove(&key, true),
                EvictionAction::SpillToSecondary => self.evict_spill(&key),
            }
        }
    }

    fn evict_remove(&self, key: &K, distributed: bool) {
        let shard = self.router.shard_of(key);
        let removed = {
            let mut map = self.shards[shard].write();
            match map.remove(key) {
                Some(_) => {
                    if let Some(controller) = &self.controller {
                        controller.on_removed(key);
                    }
                    true
                },
                None => false,
            }
        };
        if !removed {
            return;
        }
        self.counters.inc_eviction();
        if distributed {
            self.counters.inc_distributed_destroy();
            if let Some(observer) = &self.observer {
                observer.entry_destroyed(key);
            }
        }
    }

    fn evict_spill(&self, key: &K) {
        let store = self
            .overflow
            .as_ref()
            .expect("spill action without an overflow store");
        let controller = self
            .controller
            .as_ref()
            .expect("victims without a controller");
        let shard = self.router.shard_of(key);
        let mut map = self.shards[shard].write();
        let Some(entry) = map.get_mut(key) else {
            return;
        };
        let Stored::Resident(value) = &entry.stored else {
            return;
        };
        let value = Arc::clone(value);
        match store.spill(&key.encode(), &value.encode()) {
            Ok(reference) => {
                entry.stored = Stored::Spilled(reference);
                // Release any weight re-registered by a racing write; the
                // placeholder does not count toward occupancy.
                controller.on_removed(key);
                self.counters.inc_spill();
                self.counters.inc_eviction();
                debug!(len = reference.len(), "spilled entry");
            },
            Err(error) => {
                let size = self.sizer.size_of(&value);
                controller.reinstate(key, size);
                warn!(error = %error, "spill failed; entry remains resident");
            },
        }
    }
}

impl<K, V> std::fmt::Debug for RegionRuntime<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionRuntime")
            .field("name", &self.name)
            .field("shards", &self.shards.len())
            .field("eviction", &self.definition.eviction())
            .finish_non_exhaustive()
    }
}

/// RAII marker for an in-flight access. Dropping the guard releases the pin.
pub struct PinGuard<'a, K, V>
where
    K: Eq + Hash + Clone + EntryCodec,
    V: EntryCodec,
{
    region: &'a RegionRuntime<K, V>,
    key: K,
}

impl<K, V> Drop for PinGuard<'_, K, V>
where
    K: Eq + Hash + Clone + EntryCodec,
    V: EntryCodec,
{
    fn drop(&mut self) {
        if let Some(controller) = &self.region.controller {
            controller.unpin(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::RegionOptions;

    fn local_destroy_region(max_entries: u64) -> RegionRuntime<u64, String> {
        let definition = RegionOptions {
            eviction_action: Some("local-destroy".to_owned()),
            max_entries: Some(max_entries),
            concurrency_level: Some(4),
            ..RegionOptions::new()
        }
        .resolve();
        RegionBuilder::new("orders", definition).build().unwrap()
    }

    fn plain_region() -> RegionRuntime<u64, String> {
        RegionBuilder::new("plain", RegionOptions::new().resolve())
            .build()
            .unwrap()
    }

    // Clock-sweep order is only deterministic with a single recency ring.
    fn single_ring_region(max_entries: u64) -> RegionRuntime<u64, String> {
        let definition = RegionOptions {
            eviction_action: Some("local-destroy".to_owned()),
            max_entries: Some(max_entries),
            concurrency_level: Some(1),
            ..RegionOptions::new()
        }
        .resolve();
        RegionBuilder::new("orders", definition)
            .eviction_config(EvictionConfig {
                shards: 1,
                ..EvictionConfig::default()
            })
            .build()
            .unwrap()
    }

    #[test]
    fn put_get_remove_round_trip() {
        let region = plain_region();
        assert!(region.put(1, "one".to_owned()).is_none());
        assert_eq!(region.get(&1).unwrap().unwrap().as_str(), "one");
        assert_eq!(region.len(), 1);

        let previous = region.put(1, "uno".to_owned()).unwrap();
        assert_eq!(previous.as_str(), "one");

        assert_eq!(region.remove(&1).unwrap().as_str(), "uno");
        assert!(region.get(&1).unwrap().is_none());
        assert!(region.is_empty());
    }

    #[test]
    fn local_puts_bump_the_version_stamp() {
        let region = plain_region();
        region.put(7, "a".to_owned());
        assert_eq!(region.version_of(&7), Some(1));
        region.put(7, "b".to_owned());
        assert_eq!(region.version_of(&7), Some(2));
    }

    #[test]
    fn stale_versioned_write_is_rejected() {
        let region = plain_region();
        region
            .put_versioned(1, "v5".to_owned(), 5)
            .unwrap();

        let err = region.put_versioned(1, "v3".to_owned(), 3).unwrap_err();
        assert!(matches!(
            err,
            RegionError::StaleVersion {
                incoming: 3,
                stored: 5
            }
        ));
        // The stored value is untouched.
        assert_eq!(region.get(&1).unwrap().unwrap().as_str(), "v5");
        assert_eq!(region.metrics().stale_rejections, 1);

        // A newer stamp is accepted.
        region.put_versioned(1, "v9".to_owned(), 9).unwrap();
        assert_eq!(region.version_of(&1), Some(9));
    }

    #[test]
    fn disabled_concurrency_checks_accept_stale_writes() {
        let definition = RegionOptions {
            concurrency_checks_enabled: Some(false),
            ..RegionOptions::new()
        }
        .resolve();
        let region: RegionRuntime<u64, String> =
            RegionBuilder::new("relaxed", definition).build().unwrap();

        region.put_versioned(1, "v5".to_owned(), 5).unwrap();
        region.put_versioned(1, "v3".to_owned(), 3).unwrap();
        assert_eq!(region.version_of(&1), Some(3));
    }

    #[test]
    fn entry_count_breach_evicts_down_to_the_limit() {
        let region = local_destroy_region(4);
        for key in 0..12u64 {
            region.put(key, format!("value-{key}"));
        }
        assert!(region.usage() <= 4);
        assert!(region.len() <= 4);
        assert!(region.metrics().evictions >= 8);
    }

    #[test]
    fn eviction_favors_recently_touched_entries() {
        let region = single_ring_region(2);
        region.put(1, "a".to_owned());
        region.put(2, "b".to_owned());

        // First breach sweeps fresh reference bits and evicts in hand order.
        region.put(3, "c".to_owned());
        assert!(!region.contains(&1));

        // Touching 2 grants it a second chance over the colder 3.
        region.get(&2).unwrap();
        region.put(4, "d".to_owned());
        assert!(region.contains(&2));
        assert!(!region.contains(&3));
    }

    #[test]
    fn pin_guard_shields_an_entry_until_dropped() {
        let region = single_ring_region(2);
        region.put(1, "keep".to_owned());
        region.put(2, "churn".to_owned());

        let guard = region.pin(&1).unwrap();
        for key in 10..30u64 {
            region.put(key, "filler".to_owned());
        }
        assert!(region.contains(&1));
        drop(guard);

        for key in 30..50u64 {
            region.put(key, "filler".to_owned());
        }
        assert!(!region.contains(&1));
        assert!(region.pin(&99).is_none());
    }

    #[test]
    fn distributed_remove_notifies_the_observer() {
        use parking_lot::Mutex;

        #[derive(Default)]
        struct Recorder(Mutex<Vec<u64>>);

        impl DistributionObserver<u64> for Recorder {
            fn entry_destroyed(&self, key: &u64) {
                self.0.lock().push(*key);
            }
        }

        let definition = RegionOptions {
            eviction_action: Some("anything-else".to_owned()),
            max_entries: Some(2),
            ..RegionOptions::new()
        }
        .resolve();
        let recorder = Arc::new(Recorder::default());
        let region: RegionRuntime<u64, String> = RegionBuilder::new("replicated", definition)
            .distribution_observer(recorder.clone())
            .build()
            .unwrap();

        for key in 0..6u64 {
            region.put(key, "v".to_owned());
        }
        let destroyed = recorder.0.lock().len();
        assert!(destroyed >= 4);
        assert_eq!(region.metrics().distributed_destroys as usize, destroyed);
    }
}
