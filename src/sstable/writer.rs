//! Segment file writer.
//!
//! Streams records sequentially through a buffered writer, tracking the
//! data-region offset in memory so it never seeks. Records must be
//! added in ascending key order; the engine feeds the writer from a
//! sorted memtable.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{BigEndian, WriteBytesExt};

use crate::error::Result;
use crate::filter::Filter;
use crate::sstable::format::{self, RECORD_HEADER_LEN};
use crate::sstable::index::SparseIndex;

/// Target false-positive rate for the per-segment membership filter.
const FILTER_FP_RATE: f64 = 0.01;

/// Heuristic divisor turning a memtable's approximate byte size into an
/// expected key count for filter sizing.
const FILTER_SIZE_DIVISOR: usize = 64;

pub struct Writer {
    out: BufWriter<File>,
    filter: Filter,
    index: SparseIndex,
    block_size: u64,
    offset: u64,
    last_index_offset: u64,
}

impl Writer {
    /// Opens `path` for write-truncate. `size_hint` is the source
    /// memtable's approximate byte size and only influences filter
    /// sizing.
    pub fn create(path: &Path, block_size: u64, size_hint: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            out: BufWriter::new(file),
            filter: Filter::new(size_hint / FILTER_SIZE_DIVISOR, FILTER_FP_RATE),
            index: SparseIndex::new(),
            block_size,
            offset: 0,
            last_index_offset: 0,
        })
    }

    /// Appends one record to the data region. Emits a sparse-index
    /// entry for the first record and whenever the data offset has
    /// advanced by at least `block_size` bytes since the last entry.
    pub fn add(&mut self, key: &[u8], value: &[u8], flags: u32, tombstone: bool) -> Result<()> {
        if self.offset == 0 || self.offset - self.last_index_offset >= self.block_size {
            self.index.push(key.to_vec(), self.offset);
            self.last_index_offset = self.offset;
        }

        self.filter.add(key);
        format::encode_record(&mut self.out, key, value, flags, tombstone)?;
        self.offset += (RECORD_HEADER_LEN + key.len() + value.len()) as u64;

        Ok(())
    }

    /// Writes the filter region, sparse-index region and trailer, then
    /// flushes and fsyncs the file.
    pub fn finish(mut self) -> Result<()> {
        let bloom_start = self.offset;
        let filter_bytes = self.filter.as_bytes();
        self.out.write_u32::<BigEndian>(filter_bytes.len() as u32)?;
        self.out.write_all(filter_bytes)?;

        let index_start = bloom_start + 4 + filter_bytes.len() as u64;
        self.index.encode_into(&mut self.out)?;

        self.out.write_u64::<BigEndian>(bloom_start)?;
        self.out.write_u64::<BigEndian>(index_start)?;

        self.out.flush()?;
        self.out.get_ref().sync_all()?;

        Ok(())
    }

    /// Bytes written to the data region so far.
    pub fn data_bytes(&self) -> u64 {
        self.offset
    }
}
