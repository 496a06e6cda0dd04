//! The cached key→value store and its eviction integration.

pub mod entry;
pub mod runtime;

pub use entry::{RegionEntry, Stored};
pub use runtime::{PinGuard, RegionBuilder, RegionRuntime};
