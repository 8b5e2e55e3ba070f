//! Sparse index over a segment's data region.
//!
//! One entry per roughly `block_size` bytes of data, each holding the
//! key and absolute file offset of the record that opens a block. The
//! index locates the short byte range that can contain a target key;
//! the reader then scans that range record by record.

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct SparseIndex {
    entries: Vec<(Vec<u8>, u64)>,
}

impl SparseIndex {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends an entry. Keys must arrive in ascending order, which the
    /// writer guarantees by iterating a sorted memtable.
    pub fn push(&mut self, key: Vec<u8>, offset: u64) {
        self.entries.push((key, offset));
    }

    /// Index of the block that may contain `key`: the greatest entry
    /// whose key is ≤ `key`, or block 0 when `key` sorts before every
    /// entry (the scan then terminates at the first greater record).
    /// Returns `None` only when the index is empty.
    pub fn find(&self, key: &[u8]) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }
        let first_greater = self.entries.partition_point(|(k, _)| k.as_slice() <= key);
        Some(first_greater.saturating_sub(1))
    }

    /// Offset of the entry at `index`.
    pub fn offset(&self, index: usize) -> Option<u64> {
        self.entries.get(index).map(|(_, offset)| *offset)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes every entry into `w`: u16 key_len, key bytes, u64
    /// offset, all big-endian.
    pub fn encode_into<W: Write>(&self, w: &mut W) -> Result<()> {
        for (key, offset) in &self.entries {
            w.write_u16::<BigEndian>(key.len() as u16)?;
            w.write_all(key)?;
            w.write_u64::<BigEndian>(*offset)?;
        }
        Ok(())
    }

    /// Parses a serialized index region. `buf` must span exactly the
    /// index region; an entry overrunning it means the file is corrupt.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut cursor = std::io::Cursor::new(buf);
        let mut entries = Vec::new();

        while (cursor.position() as usize) < buf.len() {
            let key_len = cursor.read_u16::<BigEndian>().map_err(|_| {
                Error::CorruptSegment("sparse index entry overruns region".into())
            })? as usize;

            let mut key = vec![0u8; key_len];
            cursor
                .read_exact(&mut key)
                .map_err(|_| Error::CorruptSegment("sparse index key overruns region".into()))?;

            let offset = cursor.read_u64::<BigEndian>().map_err(|_| {
                Error::CorruptSegment("sparse index offset overruns region".into())
            })?;

            entries.push((key, offset));
        }

        Ok(Self { entries })
    }
}
