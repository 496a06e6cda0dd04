//! Capacity enforcement.

pub mod controller;

pub use controller::{EvictionConfig, EvictionController};
