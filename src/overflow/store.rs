//! Append-only spill log backing overflow-to-disk eviction.
//!
//! One log file per region or bucket. Records are length-prefixed
//! `(key, value)` tuples; the key is stored so the in-memory map can be
//! reconstructed after a restart or a compaction pass.
//!
//! ## Record Layout
//!
//! ```text
//!   ┌──────────────┬──────────────┬───────────┬─────────────┐
//!   │ key_len: u32 │ val_len: u32 │ key bytes │ value bytes │
//!   └──────────────┴──────────────┴───────────┴─────────────┘
//!                                              ▲
//!                                   SpillRef.offset points here
//! ```
//!
//! A [`SpillRef`] addresses the value bytes directly and carries the log
//! generation it was written in. Compaction rewrites surviving records into
//! a fresh generation; references from older generations then fail `fetch`
//! with [`OverflowError::NotFound`].
//!
//! ## Durability Modes
//!
//! - **synchronous**: `spill` returns only after `sync_data`, so a completed
//!   spill survives a crash.
//! - **asynchronous**: the record may sit in the OS cache when `spill`
//!   returns, trading a crash-loss window for write latency.
//!
//! Both `spill` and `fetch` accept an optional caller deadline. A deadline
//! miss fails with [`OverflowError::Timeout`] and never advances the log
//! tail, so a timed-out spill leaves no record reachable by a reference.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::error::OverflowError;

const RECORD_HEADER: u64 = 8;

/// Stable reference to a spilled record, valid within one log generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpillRef {
    generation: u64,
    offset: u64,
    len: u32,
}

impl SpillRef {
    /// Log generation this reference was written in.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Length of the referenced value bytes.
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug)]
struct LogState {
    file: File,
    tail: u64,
    generation: u64,
}

/// Append-only byte store for one region or bucket.
#[derive(Debug)]
pub struct OverflowStore {
    state: Mutex<LogState>,
    path: PathBuf,
    synchronous: bool,
}

impl OverflowStore {
    /// Opens (or creates) the spill log at `path`.
    ///
    /// `synchronous` selects the durability mode for every subsequent
    /// `spill`; it is inherited from the owning region's `disk_synchronous`
    /// flag.
    pub fn open(path: impl AsRef<Path>, synchronous: bool) -> Result<Self, OverflowError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let tail = file.metadata()?.len();
        debug!(path = %path.display(), tail, synchronous, "opened spill log");
        Ok(Self {
            state: Mutex::new(LogState {
                file,
                tail,
                generation: 0,
            }),
            path,
            synchronous,
        })
    }

    /// Path of the backing log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current log tail in bytes.
    pub fn len_bytes(&self) -> u64 {
        self.state.lock().tail
    }

    /// Current log generation; bumped by compaction.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Appends a `(key, value)` record and returns a reference to the value.
    pub fn spill(&self, key: &[u8], value: &[u8]) -> Result<SpillRef, OverflowError> {
        self.spill_deadline(key, value, None)
    }

    /// [`spill`](Self::spill) with a caller deadline.
    ///
    /// Checked on entry and again after the (possibly flushed) write. A late
    /// completion fails with `Timeout` without advancing the tail: the bytes
    /// are orphaned, unreferenced, and reclaimed by the next append or
    /// compaction.
    pub fn spill_deadline(
        &self,
        key: &[u8],
        value: &[u8],
        deadline: Option<Instant>,
    ) -> Result<SpillRef, OverflowError> {
        check_deadline(deadline)?;

        let mut record = Vec::with_capacity(RECORD_HEADER as usize + key.len() + value.len());
        record.extend_from_slice(&(key.len() as u32).to_le_bytes());
        record.extend_from_slice(&(value.len() as u32).to_le_bytes());
        record.extend_from_slice(key);
        record.extend_from_slice(value);

        let mut state = self.state.lock();
        let offset = state.tail;
        state.file.write_all_at(&record, offset)?;
        if self.synchronous {
            state.file.sync_data()?;
        }
        check_deadline(deadline)?;

        state.tail = offset + record.len() as u64;
        let reference = SpillRef {
            generation: state.generation,
            offset: offset + RECORD_HEADER + key.len() as u64,
            len: value.len() as u32,
        };
        debug!(offset, len = value.len(), "spilled record");
        Ok(reference)
    }

    /// Reads back the value bytes for `reference`.
    pub fn fetch(&self, reference: &SpillRef) -> Result<Vec<u8>, OverflowError> {
        self.fetch_deadline(reference, None)
    }

    /// [`fetch`](Self::fetch) with a caller deadline, checked before the
    /// read begins.
    pub fn fetch_deadline(
        &self,
        reference: &SpillRef,
        deadline: Option<Instant>,
    ) -> Result<Vec<u8>, OverflowError> {
        check_deadline(deadline)?;

        let state = self.state.lock();
        if reference.generation != state.generation {
            return Err(OverflowError::NotFound);
        }
        if reference.offset + u64::from(reference.len) > state.tail {
            return Err(OverflowError::NotFound);
        }
        let mut buf = vec![0u8; reference.len as usize];
        state.file.read_exact_at(&mut buf, reference.offset)?;
        Ok(buf)
    }

    /// Rewrites the given live records into a fresh generation, truncates
    /// the log, and returns the old→new reference remapping.
    ///
    /// References not listed, and every reference from an older generation,
    /// fail subsequent `fetch` calls with `NotFound`. Runs out of band with
    /// respect to region mutation: the caller is responsible for swapping the
    /// remapped references into its placeholders.
    pub fn compact(&self, live: &[SpillRef]) -> Result<Vec<(SpillRef, SpillRef)>, OverflowError> {
        let mut state = self.state.lock();

        let live_offsets: FxHashMap<u64, SpillRef> = live
            .iter()
            .filter(|r| r.generation == state.generation)
            .map(|r| (r.offset, *r))
            .collect();

        // Scan the current generation, buffering surviving records.
        let mut surviving: Vec<(SpillRef, Vec<u8>, Vec<u8>)> = Vec::new();
        let mut cursor = 0u64;
        while cursor + RECORD_HEADER <= state.tail {
            let mut header = [0u8; RECORD_HEADER as usize];
            state.file.read_exact_at(&mut header, cursor)?;
            let key_len = u64::from(u32::from_le_bytes([
                header[0], header[1], header[2], header[3],
            ]));
            let val_len = u64::from(u32::from_le_bytes([
                header[4], header[5], header[6], header[7],
            ]));
            let value_offset = cursor + RECORD_HEADER + key_len;
            if let Some(old) = live_offsets.get(&value_offset) {
                let mut key = vec![0u8; key_len as usize];
                state.file.read_exact_at(&mut key, cursor + RECORD_HEADER)?;
                let mut value = vec![0u8; val_len as usize];
                state.file.read_exact_at(&mut value, value_offset)?;
                surviving.push((*old, key, value));
            }
            cursor = value_offset + val_len;
        }

        // Rewrite from the start of the file under the next generation.
        let generation = state.generation + 1;
        let mut tail = 0u64;
        let mut remap = Vec::with_capacity(surviving.len());
        for (old, key, value) in surviving {
            let mut record = Vec::with_capacity(RECORD_HEADER as usize + key.len() + value.len());
            record.extend_from_slice(&(key.len() as u32).to_le_bytes());
            record.extend_from_slice(&(value.len() as u32).to_le_bytes());
            record.extend_from_slice(&key);
            record.extend_from_slice(&value);
            state.file.write_all_at(&record, tail)?;
            remap.push((
                old,
                SpillRef {
                    generation,
                    offset: tail + RECORD_HEADER + key.len() as u64,
                    len: value.len() as u32,
                },
            ));
            tail += record.len() as u64;
        }

        state.file.set_len(tail)?;
        if self.synchronous {
            state.file.sync_data()?;
        }
        let reclaimed = state.tail.saturating_sub(tail);
        state.tail = tail;
        state.generation = generation;
        info!(records = remap.len(), reclaimed, generation, "compacted spill log");
        Ok(remap)
    }
}

fn check_deadline(deadline: Option<Instant>) -> Result<(), OverflowError> {
    match deadline {
        Some(deadline) if Instant::now() > deadline => Err(OverflowError::Timeout),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    fn temp_store(synchronous: bool) -> (tempfile::TempDir, OverflowStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = OverflowStore::open(dir.path().join("bucket-0.spill"), synchronous).unwrap();
        (dir, store)
    }

    #[test]
    fn spill_then_fetch_round_trips() {
        let (_dir, store) = temp_store(true);
        let reference = store.spill(b"k1", b"hello grid").unwrap();
        assert_eq!(store.fetch(&reference).unwrap(), b"hello grid");
    }

    #[test]
    fn empty_value_round_trips() {
        let (_dir, store) = temp_store(false);
        let reference = store.spill(b"k", b"").unwrap();
        assert!(reference.is_empty());
        assert_eq!(store.fetch(&reference).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn references_survive_interleaved_appends() {
        let (_dir, store) = temp_store(false);
        let a = store.spill(b"a", &[1u8; 100]).unwrap();
        let b = store.spill(b"b", &[2u8; 50]).unwrap();
        let c = store.spill(b"c", &[3u8; 7]).unwrap();
        assert_eq!(store.fetch(&b).unwrap(), vec![2u8; 50]);
        assert_eq!(store.fetch(&a).unwrap(), vec![1u8; 100]);
        assert_eq!(store.fetch(&c).unwrap(), vec![3u8; 7]);
    }

    #[test]
    fn expired_deadline_fails_without_advancing_tail() {
        let (_dir, store) = temp_store(false);
        let before = store.len_bytes();
        let past = Instant::now() - Duration::from_millis(10);
        let err = store.spill_deadline(b"k", b"v", Some(past)).unwrap_err();
        assert!(matches!(err, OverflowError::Timeout));
        assert_eq!(store.len_bytes(), before);
    }

    #[test]
    fn compaction_invalidates_dropped_references() {
        let (_dir, store) = temp_store(true);
        let keep = store.spill(b"keep", b"kept value").unwrap();
        let dropped = store.spill(b"drop", b"dropped value").unwrap();

        let remap = store.compact(&[keep]).unwrap();
        assert_eq!(remap.len(), 1);
        let (old, new) = remap[0];
        assert_eq!(old, keep);
        assert_eq!(new.generation(), 1);

        assert_eq!(store.fetch(&new).unwrap(), b"kept value");
        assert!(matches!(store.fetch(&keep), Err(OverflowError::NotFound)));
        assert!(matches!(store.fetch(&dropped), Err(OverflowError::NotFound)));
    }

    #[test]
    fn compaction_reclaims_dead_space() {
        let (_dir, store) = temp_store(false);
        for i in 0..16u8 {
            store.spill(&[i], &[i; 64]).unwrap();
        }
        let survivor = store.spill(b"last", &[9u8; 8]).unwrap();
        let before = store.len_bytes();

        let remap = store.compact(&[survivor]).unwrap();
        assert!(store.len_bytes() < before);
        assert_eq!(store.fetch(&remap[0].1).unwrap(), vec![9u8; 8]);
    }
}
