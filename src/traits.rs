//! # Collaborator Seams
//!
//! This module defines the traits at the boundary between this crate and the
//! distributed runtime that embeds it. The region runtime and eviction
//! controller consume these seams; they never depend on a concrete
//! implementation.
//!
//! ## Architecture
//!
//! ```text
//!                  ┌──────────────────────────────────────────┐
//!                  │              RegionRuntime               │
//!                  │                                          │
//!                  │   EntryCodec   ── value <-> spill bytes  │
//!                  │   EntrySizer   ── value -> occupancy     │
//!                  │   Distribution ── destroy propagation    │
//!                  └────────────────────┬─────────────────────┘
//!                                       │
//!                  ┌────────────────────▼─────────────────────┐
//!                  │            EvictionController            │
//!                  │                                          │
//!                  │   HeapMonitor  ── process heap sample    │
//!                  └──────────────────────────────────────────┘
//! ```
//!
//! | Trait                  | Consumed by        | Purpose                          |
//! |------------------------|--------------------|----------------------------------|
//! | [`HeapMonitor`]        | controller         | heap-percentage eviction trigger |
//! | [`DistributionObserver`]| region            | propagate distributed destroys   |
//! | [`EntryCodec`]         | region             | serialize values for the spill log |
//! | [`EntrySizer`]         | region             | occupancy weight of a value      |
//!
//! `EntrySizer` is blanket-implemented for `Fn(&V) -> u64` closures, so a
//! sizer can be supplied inline without a named type.

use crate::error::DecodeError;

/// Process-wide heap usage sample consulted by heap-percentage eviction.
///
/// The grid's resource manager owns the real sampler; this crate only reads
/// it. The threshold compared against is the policy limit, or the injected
/// runtime default when the limit is zero.
pub trait HeapMonitor: Send + Sync {
    /// Current heap usage as a percentage of the configured maximum, 0-100.
    fn used_percent(&self) -> u8;
}

/// Replication-layer hook notified when a distributed destroy must propagate.
///
/// Called after the local copy has been removed; the observer is responsible
/// for destroying the remaining redundant copies.
pub trait DistributionObserver<K>: Send + Sync {
    fn entry_destroyed(&self, key: &K);
}

/// Serialization seam between resident values and the overflow spill log.
///
/// Region keys and values must both implement this: the spill log stores
/// `(key, value)` byte tuples so the in-memory map can be reconstructed after
/// a restart or a compaction pass.
pub trait EntryCodec: Sized {
    /// Serializes the value for the spill log.
    fn encode(&self) -> Vec<u8>;

    /// Reconstructs a value promoted back from the spill log.
    fn decode(bytes: &[u8]) -> Result<Self, DecodeError>;
}

impl EntryCodec for Vec<u8> {
    fn encode(&self) -> Vec<u8> {
        self.clone()
    }

    fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(bytes.to_vec())
    }
}

impl EntryCodec for String {
    fn encode(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError)
    }
}

impl EntryCodec for u64 {
    fn encode(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let bytes: [u8; 8] = bytes.try_into().map_err(|_| DecodeError)?;
        Ok(u64::from_le_bytes(bytes))
    }
}

/// Occupancy weight of a resident value, in bytes.
///
/// Consulted only when the region's eviction algorithm is aggregate memory
/// size. The configuration layer names a sizer by reference
/// ([`ObjectSizerRef`](crate::config::ObjectSizerRef)); the embedding runtime
/// maps that name to an implementation at region construction.
pub trait EntrySizer<V>: Send + Sync {
    fn size_of(&self, value: &V) -> u64;
}

impl<V, F> EntrySizer<V> for F
where
    F: Fn(&V) -> u64 + Send + Sync,
{
    fn size_of(&self, value: &V) -> u64 {
        self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_codec_round_trips() {
        let value = vec![0u8, 1, 2, 254, 255];
        assert_eq!(Vec::<u8>::decode(&value.encode()).unwrap(), value);
    }

    #[test]
    fn string_codec_rejects_invalid_utf8() {
        assert_eq!(String::decode(&[0xff, 0xfe]), Err(DecodeError));
        assert_eq!(String::decode(b"grid").unwrap(), "grid");
    }

    #[test]
    fn u64_codec_rejects_short_buffers() {
        assert_eq!(u64::decode(&42u64.encode()).unwrap(), 42);
        assert_eq!(u64::decode(&[1, 2, 3]), Err(DecodeError));
    }

    #[test]
    fn closures_act_as_sizers() {
        let sizer = |value: &Vec<u8>| value.len() as u64;
        assert_eq!(sizer.size_of(&vec![0u8; 16]), 16);
    }
}
