//! Overflow-to-disk persistence.

pub mod store;

pub use store::{OverflowStore, SpillRef};
