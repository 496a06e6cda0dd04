//! Region entry representation.

use std::sync::Arc;

use crate::overflow::SpillRef;

/// Value slot of an entry: resident in memory, or a placeholder pointing at
/// a spilled record.
#[derive(Debug, Clone)]
pub enum Stored<V> {
    Resident(Arc<V>),
    Spilled(SpillRef),
}

impl<V> Stored<V> {
    /// Returns the resident value, if any.
    pub fn resident(&self) -> Option<&Arc<V>> {
        match self {
            Stored::Resident(value) => Some(value),
            Stored::Spilled(_) => None,
        }
    }

    pub fn is_spilled(&self) -> bool {
        matches!(self, Stored::Spilled(_))
    }
}

/// One region entry: value-or-placeholder plus its concurrency stamp.
///
/// The stamp is a per-entry version token. Local writes bump it; replicated
/// writes carry their own stamp, which must be newer than the stored one
/// when the region has concurrency checks enabled.
#[derive(Debug, Clone)]
pub struct RegionEntry<V> {
    pub(crate) stored: Stored<V>,
    pub(crate) version: u64,
}

impl<V> RegionEntry<V> {
    pub(crate) fn new(value: Arc<V>, version: u64) -> Self {
        Self {
            stored: Stored::Resident(value),
            version,
        }
    }

    /// Current concurrency stamp.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether the value currently lives in the overflow store.
    pub fn is_spilled(&self) -> bool {
        self.stored.is_spilled()
    }
}
