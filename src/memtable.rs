//! In-memory ordered index backed by a concurrent skip list.
//!
//! The memtable is the write-absorbing tier of the store. Keys are
//! unique and ordered by unsigned lexicographic byte comparison, which
//! is what the flush path relies on when streaming a memtable into a
//! sorted segment file. Deletions are regular entries with the
//! tombstone bit set and an empty value.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_skiplist::SkipMap;

use crate::error::Result;
use crate::sstable::Writer;

/// Fixed per-entry metadata charge added to the size estimate on top of
/// key and value bytes.
const ENTRY_OVERHEAD: usize = 12;

/// One observation of a key: its value, opaque flags, and whether the
/// key was deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: Vec<u8>,
    pub flags: u32,
    pub tombstone: bool,
}

/// In-memory sorted table over a concurrent skip list.
///
/// The size counter is a flush trigger, not an exact byte count: every
/// `set` adds `key + value + 12` bytes, including overwrites.
#[derive(Debug, Default)]
pub struct Memtable {
    data: SkipMap<Vec<u8>, Entry>,
    size: AtomicUsize,
}

impl Memtable {
    /// Creates a new empty memtable.
    pub fn new() -> Self {
        Self {
            data: SkipMap::new(),
            size: AtomicUsize::new(0),
        }
    }

    /// Inserts or overwrites a key. Overwrites replace value, flags and
    /// tombstone in place.
    pub fn set(&self, key: Vec<u8>, value: Vec<u8>, flags: u32, tombstone: bool) {
        let delta = key.len() + value.len() + ENTRY_OVERHEAD;
        self.data.insert(
            key,
            Entry {
                value,
                flags,
                tombstone,
            },
        );
        self.size.fetch_add(delta, Ordering::SeqCst);
    }

    /// Retrieves the entry for a key, tombstones included.
    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        self.data.get(key).map(|entry| entry.value().clone())
    }

    /// Marks a key as deleted.
    pub fn delete(&self, key: Vec<u8>) {
        self.set(key, Vec::new(), 0, true);
    }

    /// Approximate size in bytes.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Streams every entry, in ascending key order, into a segment
    /// writer.
    pub fn flush_to(&self, writer: &mut Writer) -> Result<()> {
        for entry in self.data.iter() {
            let record = entry.value();
            writer.add(entry.key(), &record.value, record.flags, record.tombstone)?;
        }
        Ok(())
    }
}
