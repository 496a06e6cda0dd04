//! Eviction policy resolution.
//!
//! Turns the raw optional eviction fields of a region-creation request into a
//! fully resolved [`EvictionPolicy`], or no policy at all. Resolution is pure
//! and total: it performs no I/O, holds no state, and never fails.
//!
//! ## Derivation Rules
//!
//! The action name is the trigger; limits alone never synthesize a policy.
//! When an action is present, the algorithm and limit derive from which limit
//! argument was supplied, with memory size taking precedence:
//!
//! | `action`  | `max_memory` | `max_entries` | Result                                   |
//! |-----------|--------------|---------------|------------------------------------------|
//! | absent    | any          | any           | no policy                                |
//! | present   | `Some(m)`    | any           | `ByAggregateMemorySize`, `limit = m`     |
//! | present   | `None`       | `Some(n)`     | `ByEntryCount`, `limit = n`              |
//! | present   | `None`       | `None`        | `ByHeapPercentage`, `limit = 0`          |
//!
//! A zero limit under `ByHeapPercentage` means "use the runtime's default
//! heap threshold", an injected configuration value
//! ([`EvictionConfig::default_heap_percent`](crate::eviction::EvictionConfig));
//! the policy itself does not carry the default.
//!
//! ## Action Names
//!
//! | Name                 | Action                                        |
//! |----------------------|-----------------------------------------------|
//! | `"local-destroy"`    | [`EvictionAction::LocalRemove`]               |
//! | `"overflow-to-disk"` | [`EvictionAction::SpillToSecondary`]          |
//! | anything else        | [`EvictionAction::DistributedRemove`]         |
//!
//! Unrecognized names fall back to the default destroy action instead of
//! erroring, preserving forward compatibility with newer administrative
//! layers. This is the single permitted fallback point; every downstream
//! consumer matches the closed enums exhaustively.

/// Resource metric that decides when eviction is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionAlgorithm {
    /// Evict when the process-wide heap sample exceeds a percentage.
    ByHeapPercentage,
    /// Evict when the aggregate sized weight of resident values exceeds a
    /// byte limit.
    ByAggregateMemorySize,
    /// Evict when the resident entry count exceeds a limit.
    ByEntryCount,
}

/// What happens to a victim entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionAction {
    /// Delete the entry from this member's in-memory map only.
    LocalRemove,
    /// Serialize the value into the overflow store and leave a placeholder.
    SpillToSecondary,
    /// Destroy the entry on all redundant copies, not just locally.
    DistributedRemove,
}

impl EvictionAction {
    /// Maps an administrative action name to an action.
    ///
    /// # Example
    ///
    /// ```
    /// use gridkit::config::EvictionAction;
    ///
    /// assert_eq!(
    ///     EvictionAction::from_name("local-destroy"),
    ///     EvictionAction::LocalRemove
    /// );
    /// assert_eq!(
    ///     EvictionAction::from_name("some-future-action"),
    ///     EvictionAction::DistributedRemove
    /// );
    /// ```
    pub fn from_name(name: &str) -> Self {
        match name {
            "local-destroy" => Self::LocalRemove,
            "overflow-to-disk" => Self::SpillToSecondary,
            _ => Self::DistributedRemove,
        }
    }
}

/// Named reference to an object sizer registered with the embedding runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectSizerRef(String);

impl ObjectSizerRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Fully resolved eviction rule for one region.
///
/// Exists only when the region-creation request supplied an explicit action;
/// owned by the region definition and immutable after region creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionPolicy {
    pub algorithm: EvictionAlgorithm,
    pub action: EvictionAction,
    /// Percentage, byte count, or entry count depending on `algorithm`. Zero
    /// under `ByHeapPercentage` defers to the runtime default threshold.
    pub limit: u64,
    /// Retained only when `algorithm` is `ByAggregateMemorySize`.
    pub sizer: Option<ObjectSizerRef>,
}

/// Derives the eviction policy for a region-creation request.
///
/// See the module documentation for the full rule table. Never fails.
///
/// # Example
///
/// ```
/// use gridkit::config::{EvictionAlgorithm, resolve_eviction};
///
/// // Limits alone never create a policy.
/// assert!(resolve_eviction(None, Some(1000), None, None).is_none());
///
/// // An action with no limit selects the heap-percentage algorithm.
/// let policy = resolve_eviction(Some("local-destroy"), None, None, None).unwrap();
/// assert_eq!(policy.algorithm, EvictionAlgorithm::ByHeapPercentage);
/// assert_eq!(policy.limit, 0);
/// ```
pub fn resolve_eviction(
    action: Option<&str>,
    max_memory: Option<u64>,
    max_entries: Option<u64>,
    sizer: Option<ObjectSizerRef>,
) -> Option<EvictionPolicy> {
    let action = EvictionAction::from_name(action?);
    let (algorithm, limit) = match (max_memory, max_entries) {
        (Some(bytes), _) => (EvictionAlgorithm::ByAggregateMemorySize, bytes),
        (None, Some(entries)) => (EvictionAlgorithm::ByEntryCount, entries),
        (None, None) => (EvictionAlgorithm::ByHeapPercentage, 0),
    };
    let sizer = match algorithm {
        EvictionAlgorithm::ByAggregateMemorySize => sizer,
        _ => None,
    };
    Some(EvictionPolicy {
        algorithm,
        action,
        limit,
        sizer,
    })
}
