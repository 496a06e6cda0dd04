//! Error types for the gridkit library.
//!
//! ## Key Components
//!
//! - [`OverflowError`]: failures of the append-only spill log backing
//!   overflow-to-disk eviction.
//! - [`DecodeError`]: a spilled value could not be reconstructed on read-back.
//! - [`RegionError`]: failures scoped to a single region operation.
//!
//! Two conditions a reader might expect here are deliberately absent:
//!
//! - There is no configuration error. Eviction-policy resolution is total;
//!   unrecognized action names fall back to the default destroy action rather
//!   than erroring, so newer administrative layers stay compatible with older
//!   members.
//! - Eviction pressure (every candidate pinned while the region is over its
//!   bound) is a reported condition, surfaced through metrics and logging. It
//!   never fails the write that triggered it.
//!
//! Nothing in this crate is process-fatal; every failure is scoped to the
//! single operation that encountered it.

use thiserror::Error;

// ---------------------------------------------------------------------------
// OverflowError
// ---------------------------------------------------------------------------

/// Errors produced by the overflow spill log.
#[derive(Debug, Error)]
pub enum OverflowError {
    /// The reference points at a record that no longer exists: the log was
    /// compacted to a newer generation, or the reference never matched a
    /// completed append.
    #[error("spill record not found (compacted or stale reference)")]
    NotFound,

    /// The caller's deadline elapsed before the operation completed. The
    /// triggering entry is left in its pre-operation state; no placeholder
    /// ever references a record from a timed-out spill.
    #[error("spill log operation exceeded the caller deadline")]
    Timeout,

    #[error("spill log i/o: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// DecodeError
// ---------------------------------------------------------------------------

/// A spilled value could not be decoded back into its in-memory form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("spilled value could not be decoded")]
pub struct DecodeError;

// ---------------------------------------------------------------------------
// RegionError
// ---------------------------------------------------------------------------

/// Errors scoped to a single region operation.
#[derive(Debug, Error)]
pub enum RegionError {
    /// Concurrency-stamp check failed: the incoming version is not newer than
    /// the stored one. Raised only when the region has concurrency checks
    /// enabled, and independent of eviction.
    #[error("stale version: incoming {incoming} is not newer than stored {stored}")]
    StaleVersion { incoming: u64, stored: u64 },

    #[error(transparent)]
    Overflow(#[from] OverflowError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_not_found_display() {
        let err = OverflowError::NotFound;
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn overflow_io_wraps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = OverflowError::from(io);
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn stale_version_reports_both_stamps() {
        let err = RegionError::StaleVersion {
            incoming: 3,
            stored: 7,
        };
        let text = err.to_string();
        assert!(text.contains('3') && text.contains('7'));
    }

    #[test]
    fn region_error_from_overflow() {
        let err = RegionError::from(OverflowError::Timeout);
        assert!(matches!(err, RegionError::Overflow(OverflowError::Timeout)));
    }

    #[test]
    fn errors_implement_std_error() {
        fn assert_error<T: std::error::Error>() {}
        assert_error::<OverflowError>();
        assert_error::<RegionError>();
        assert_error::<DecodeError>();
    }
}
