//! Segment file reader.
//!
//! Opening a segment reads the trailer, the membership filter and the
//! sparse index into memory, then makes one pass over the data region
//! (headers and keys only) to build an exact per-key hash index. After
//! open the reader is immutable; lookups use positional reads, so a
//! single reader is safe to share across threads.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::os::unix::fs::FileExt;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::hash::hash64;
use crate::memtable::Entry;
use crate::sstable::format::{self, RECORD_HEADER_LEN, TRAILER_LEN};
use crate::sstable::index::SparseIndex;

pub struct Reader {
    file: File,
    filter: Filter,
    index: SparseIndex,
    hash_index: Option<HashMap<u64, u64>>,
    bloom_start: u64,
}

impl Reader {
    /// Opens a segment file and loads its lookup structures. Passing
    /// `build_hash_index = false` skips the data-region scan; the
    /// sparse-index block scan alone remains correct.
    pub fn open(path: &Path, build_hash_index: bool) -> Result<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        if file_size < TRAILER_LEN {
            return Err(Error::CorruptSegment(format!(
                "{}: file shorter than trailer",
                path.display()
            )));
        }

        let mut trailer = [0u8; TRAILER_LEN as usize];
        file.read_exact_at(&mut trailer, file_size - TRAILER_LEN)?;
        let bloom_start = BigEndian::read_u64(&trailer[0..8]);
        let index_start = BigEndian::read_u64(&trailer[8..16]);

        if bloom_start > index_start || index_start > file_size - TRAILER_LEN {
            return Err(Error::CorruptSegment(format!(
                "{}: trailer offsets out of bounds",
                path.display()
            )));
        }

        let filter = Self::read_filter(&file, bloom_start, index_start)?;

        let index_len = (file_size - TRAILER_LEN - index_start) as usize;
        let mut index_buf = vec![0u8; index_len];
        file.read_exact_at(&mut index_buf, index_start)?;
        let index = SparseIndex::decode(&index_buf)?;

        let hash_index = if build_hash_index {
            Some(Self::scan_hash_index(&file, bloom_start)?)
        } else {
            None
        };

        Ok(Self {
            file,
            filter,
            index,
            hash_index,
            bloom_start,
        })
    }

    fn read_filter(file: &File, bloom_start: u64, index_start: u64) -> Result<Filter> {
        let mut len_buf = [0u8; 4];
        file.read_exact_at(&mut len_buf, bloom_start)?;
        let filter_len = u64::from(BigEndian::read_u32(&len_buf));

        if bloom_start + 4 + filter_len > index_start {
            return Err(Error::CorruptSegment(
                "filter region overruns sparse index".into(),
            ));
        }

        let mut filter_bytes = vec![0u8; filter_len as usize];
        file.read_exact_at(&mut filter_bytes, bloom_start + 4)?;
        Ok(Filter::from_bytes(filter_bytes))
    }

    /// One sequential pass over the data region, reading each record's
    /// header and key and skipping the value bytes.
    fn scan_hash_index(file: &File, bloom_start: u64) -> Result<HashMap<u64, u64>> {
        let mut map = HashMap::new();
        let mut reader = BufReader::new(file);
        let mut header_buf = [0u8; RECORD_HEADER_LEN];
        let mut pos = 0u64;

        while pos < bloom_start {
            if pos + RECORD_HEADER_LEN as u64 > bloom_start {
                return Err(Error::CorruptSegment(
                    "record header overruns data region".into(),
                ));
            }
            reader.read_exact(&mut header_buf)?;
            let header = format::decode_header(&header_buf)?;

            let record_len = header.record_len() as u64;
            if pos + record_len > bloom_start {
                return Err(Error::CorruptSegment(
                    "record overruns data region".into(),
                ));
            }

            let mut key = vec![0u8; header.key_len];
            reader.read_exact(&mut key)?;
            reader.seek_relative(header.value_len as i64)?;

            map.insert(hash64(&key), pos);
            pos += record_len;
        }

        Ok(map)
    }

    /// Point lookup. Returns the record (tombstones included) or `None`
    /// when the segment holds no observation of `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        if !self.filter.contains(key) {
            return Ok(None);
        }

        if let Some(hash_index) = &self.hash_index {
            if let Some(&offset) = hash_index.get(&hash64(key)) {
                if let Some(entry) = self.read_record_at(offset, key)? {
                    return Ok(Some(entry));
                }
                // Hash hit on a different key; fall through to the
                // sparse-index scan.
            }
        }

        let Some(block) = self.index.find(key) else {
            return Ok(None);
        };
        let start = self
            .index
            .offset(block)
            .ok_or_else(|| Error::Internal("sparse index lost an entry".into()))?;
        let end = self.index.offset(block + 1).unwrap_or(self.bloom_start);

        let mut block_buf = vec![0u8; (end - start) as usize];
        self.file.read_exact_at(&mut block_buf, start)?;

        let mut pos = 0usize;
        while pos < block_buf.len() {
            let header = format::decode_header(&block_buf[pos..])?;
            let record_len = header.record_len();
            if pos + record_len > block_buf.len() {
                return Err(Error::CorruptSegment("record overruns block".into()));
            }

            let key_start = pos + RECORD_HEADER_LEN;
            let record_key = &block_buf[key_start..key_start + header.key_len];
            match record_key.cmp(key) {
                Ordering::Equal => {
                    let value_start = key_start + header.key_len;
                    return Ok(Some(Entry {
                        value: block_buf[value_start..value_start + header.value_len].to_vec(),
                        flags: header.flags,
                        tombstone: header.tombstone,
                    }));
                }
                Ordering::Greater => return Ok(None),
                Ordering::Less => pos += record_len,
            }
        }

        Ok(None)
    }

    /// Reads the record at `offset` and returns it if its key matches.
    /// A mismatch is the hash-collision guard, not an error.
    fn read_record_at(&self, offset: u64, key: &[u8]) -> Result<Option<Entry>> {
        let mut header_buf = [0u8; RECORD_HEADER_LEN];
        self.file.read_exact_at(&mut header_buf, offset)?;
        let header = format::decode_header(&header_buf)?;

        if offset + header.record_len() as u64 > self.bloom_start {
            return Err(Error::CorruptSegment(
                "record overruns data region".into(),
            ));
        }

        let mut body = vec![0u8; header.key_len + header.value_len];
        self.file
            .read_exact_at(&mut body, offset + RECORD_HEADER_LEN as u64)?;

        if &body[..header.key_len] != key {
            return Ok(None);
        }

        Ok(Some(Entry {
            value: body[header.key_len..].to_vec(),
            flags: header.flags,
            tombstone: header.tombstone,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memtable::Memtable;
    use crate::sstable::Writer;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_temp_dir() -> TempDir {
        TempDir::new().expect("failed to create temporary directory")
    }

    fn write_segment(dir: &TempDir, name: &str, memtable: &Memtable, block_size: u64) -> PathBuf {
        let path = dir.path().join(name);
        let mut writer = Writer::create(&path, block_size, memtable.size()).unwrap();
        memtable.flush_to(&mut writer).unwrap();
        writer.finish().unwrap();
        path
    }

    #[test]
    fn test_round_trip_all_records() {
        let temp_dir = create_temp_dir();
        let memtable = Memtable::new();
        for i in 0..500 {
            memtable.set(
                format!("key_{i:04}").into_bytes(),
                format!("value_{i}").into_bytes(),
                i as u32,
                false,
            );
        }
        let path = write_segment(&temp_dir, "0.1.sst", &memtable, 256);

        let reader = Reader::open(&path, true).unwrap();
        for i in 0..500 {
            let entry = reader
                .get(format!("key_{i:04}").as_bytes())
                .unwrap()
                .unwrap_or_else(|| panic!("key_{i:04} missing"));
            assert_eq!(entry.value, format!("value_{i}").into_bytes());
            assert_eq!(entry.flags, i as u32);
            assert!(!entry.tombstone);
        }
    }

    #[test]
    fn test_absent_keys_return_none() {
        let temp_dir = create_temp_dir();
        let memtable = Memtable::new();
        memtable.set(b"bbb".to_vec(), b"1".to_vec(), 0, false);
        memtable.set(b"ddd".to_vec(), b"2".to_vec(), 0, false);
        let path = write_segment(&temp_dir, "0.2.sst", &memtable, 4096);

        let reader = Reader::open(&path, true).unwrap();
        // before the first key, between keys, and past the last key
        assert!(reader.get(b"aaa").unwrap().is_none());
        assert!(reader.get(b"ccc").unwrap().is_none());
        assert!(reader.get(b"zzz").unwrap().is_none());
    }

    #[test]
    fn test_tombstones_survive_round_trip() {
        let temp_dir = create_temp_dir();
        let memtable = Memtable::new();
        memtable.set(b"alive".to_vec(), b"v".to_vec(), 3, false);
        memtable.delete(b"dead".to_vec());
        let path = write_segment(&temp_dir, "0.3.sst", &memtable, 4096);

        let reader = Reader::open(&path, true).unwrap();
        let entry = reader.get(b"dead").unwrap().expect("tombstone missing");
        assert!(entry.tombstone);
        assert!(entry.value.is_empty());

        let entry = reader.get(b"alive").unwrap().unwrap();
        assert!(!entry.tombstone);
        assert_eq!(entry.flags, 3);
    }

    #[test]
    fn test_lookup_without_hash_index() {
        let temp_dir = create_temp_dir();
        let memtable = Memtable::new();
        for i in 0..200 {
            memtable.set(
                format!("key_{i:03}").into_bytes(),
                vec![b'x'; 32],
                0,
                false,
            );
        }
        let path = write_segment(&temp_dir, "0.4.sst", &memtable, 128);

        let reader = Reader::open(&path, false).unwrap();
        assert!(reader.hash_index.is_none());
        for i in (0..200).step_by(17) {
            let entry = reader.get(format!("key_{i:03}").as_bytes()).unwrap();
            assert!(entry.is_some(), "key_{i:03} not found via block scan");
        }
        assert!(reader.get(b"key_999").unwrap().is_none());
    }

    #[test]
    fn test_tail_key_past_last_index_entry() {
        let temp_dir = create_temp_dir();
        // A large block size keeps the sparse index at a single entry,
        // so every key but the first lives between the last index
        // entry and bloom_start.
        let memtable = Memtable::new();
        for i in 0..50 {
            memtable.set(
                format!("key_{i:02}").into_bytes(),
                format!("v{i}").into_bytes(),
                0,
                false,
            );
        }
        let path = write_segment(&temp_dir, "0.5.sst", &memtable, 1 << 20);

        let reader = Reader::open(&path, false).unwrap();
        assert_eq!(reader.index.len(), 1);
        let entry = reader.get(b"key_49").unwrap().expect("tail key missing");
        assert_eq!(entry.value, b"v49");
    }

    #[test]
    fn test_large_key_and_value_widths() {
        let temp_dir = create_temp_dir();
        let memtable = Memtable::new();
        // Sizes that exercise the u16/u32 length fields beyond one byte.
        let big_key = vec![b'k'; 300];
        let big_value = vec![b'v'; 70_000];
        memtable.set(big_key.clone(), big_value.clone(), 1, false);
        let path = write_segment(&temp_dir, "0.6.sst", &memtable, 4096);

        let reader = Reader::open(&path, true).unwrap();
        let entry = reader.get(&big_key).unwrap().expect("big key missing");
        assert_eq!(entry.value, big_value);
    }

    #[test]
    fn test_empty_segment() {
        let temp_dir = create_temp_dir();
        let path = temp_dir.path().join("0.7.sst");
        let writer = Writer::create(&path, 4096, 0).unwrap();
        writer.finish().unwrap();

        let reader = Reader::open(&path, true).unwrap();
        assert!(reader.get(b"anything").unwrap().is_none());
    }

    #[test]
    fn test_truncated_file_rejected() {
        let temp_dir = create_temp_dir();
        let path = temp_dir.path().join("0.8.sst");
        std::fs::write(&path, b"short").unwrap();

        assert!(matches!(
            Reader::open(&path, true),
            Err(Error::CorruptSegment(_))
        ));
    }

    #[test]
    fn test_garbage_trailer_rejected() {
        let temp_dir = create_temp_dir();
        let path = temp_dir.path().join("0.9.sst");
        // 32 bytes of 0xff: trailer offsets point far outside the file.
        std::fs::write(&path, vec![0xff; 32]).unwrap();

        assert!(matches!(
            Reader::open(&path, true),
            Err(Error::CorruptSegment(_))
        ));
    }

    #[test]
    fn test_truncated_data_region_rejected() {
        let temp_dir = create_temp_dir();
        let memtable = Memtable::new();
        memtable.set(b"key".to_vec(), vec![b'v'; 100], 0, false);
        let path = write_segment(&temp_dir, "0.10.sst", &memtable, 4096);

        // Rewrite the trailer so bloom_start points into the middle of
        // the only record, simulating a half-written data region.
        let mut bytes = std::fs::read(&path).unwrap();
        let trailer_at = bytes.len() - TRAILER_LEN as usize;
        BigEndian::write_u64(&mut bytes[trailer_at..trailer_at + 8], 20);
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            Reader::open(&path, true),
            Err(Error::CorruptSegment(_))
        ));
    }
}
