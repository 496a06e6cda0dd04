//! Region configuration: raw administrative inputs and their resolution into
//! an immutable, internally consistent region definition.

pub mod eviction;
pub mod partition;
pub mod region;

pub use eviction::{
    EvictionAction, EvictionAlgorithm, EvictionPolicy, ObjectSizerRef, resolve_eviction,
};
pub use partition::{PartitionSpec, ResolverRef};
pub use region::{RegionDefinition, RegionOptions};
