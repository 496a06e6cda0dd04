pub mod pin_ring;
pub mod shard;

pub use pin_ring::PinRing;
pub use shard::ShardRouter;
