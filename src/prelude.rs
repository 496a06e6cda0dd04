pub use crate::config::{
    EvictionAction, EvictionAlgorithm, EvictionPolicy, ObjectSizerRef, PartitionSpec,
    RegionDefinition, RegionOptions, ResolverRef, resolve_eviction,
};
pub use crate::error::{DecodeError, OverflowError, RegionError};
pub use crate::eviction::{EvictionConfig, EvictionController};
pub use crate::metrics::RegionMetrics;
pub use crate::overflow::{OverflowStore, SpillRef};
pub use crate::region::{PinGuard, RegionBuilder, RegionRuntime};
pub use crate::traits::{DistributionObserver, EntryCodec, EntrySizer, HeapMonitor};
