//! The storage engine.
//!
//! Composes sharded memtables, the segment-file registry and a
//! single-flight flush into a durable concurrent store. Writes go to
//! the shard owning the key; reads probe that shard and then every
//! segment file from newest to oldest until a value or a tombstone
//! settles the answer.
//!
//! Locking discipline: each shard's memtable sits behind its own
//! `RwLock`; the segment registry has an engine-wide `RwLock`; a
//! `Mutex` acquired with `try_lock` serializes flushes so writers
//! never queue behind one. Within `get` the shard lock is released
//! before the registry lock is taken, and flush acquires shard locks
//! one at a time, so no lock cycle exists.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, RwLock, TryLockError};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::hash::hash32;
use crate::memtable::Memtable;
use crate::sstable::{Reader, Writer};

const SEGMENT_EXT: &str = "sst";

struct Shard {
    memtable: RwLock<Memtable>,
}

pub struct Engine {
    config: Config,
    shards: Vec<Shard>,
    /// Opened segment readers, oldest first. A key found in a later
    /// reader shadows every earlier one.
    segments: RwLock<Vec<Reader>>,
    /// Sum of shard memtable sizes. Only a flush trigger; transient
    /// drift around the threshold is acceptable.
    mem_size: AtomicI64,
    flush_lock: Mutex<()>,
}

impl Engine {
    /// Opens the engine: creates the data directory if needed and loads
    /// every existing segment file in creation order.
    pub fn open(config: Config) -> Result<Self> {
        if config.block_size == 0 {
            return Err(Error::InvalidArgument("block_size must be positive".into()));
        }
        if config.max_mem_size <= 0 {
            return Err(Error::InvalidArgument(
                "max_mem_size must be positive".into(),
            ));
        }
        if config.shard_count == 0 {
            return Err(Error::InvalidArgument(
                "shard_count must be positive".into(),
            ));
        }

        fs::create_dir_all(&config.dir)?;

        let shards = (0..config.shard_count)
            .map(|_| Shard {
                memtable: RwLock::new(Memtable::new()),
            })
            .collect();

        let segments = Self::load_segments(&config)?;
        tracing::info!(
            dir = %config.dir.display(),
            segments = segments.len(),
            shards = config.shard_count,
            "opened engine"
        );

        Ok(Self {
            config,
            shards,
            segments: RwLock::new(segments),
            mem_size: AtomicI64::new(0),
            flush_lock: Mutex::new(()),
        })
    }

    /// Enumerates `*.sst` files and opens them sorted by file name.
    /// Names embed nanosecond creation timestamps, so lexicographic
    /// order reproduces creation order.
    fn load_segments(config: &Config) -> Result<Vec<Reader>> {
        let mut paths: Vec<PathBuf> = Vec::new();
        for dir_entry in fs::read_dir(&config.dir)? {
            let path = dir_entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == SEGMENT_EXT) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut segments = Vec::with_capacity(paths.len());
        for path in paths {
            segments.push(Reader::open(&path, config.hash_index)?);
        }
        Ok(segments)
    }

    fn shard(&self, key: &[u8]) -> &Shard {
        &self.shards[(hash32(key) % self.config.shard_count) as usize]
    }

    /// Inserts or overwrites a key. Triggers a flush when the aggregate
    /// in-memory size reaches the configured budget.
    pub fn set(&self, key: &[u8], value: Vec<u8>, flags: u32) -> Result<()> {
        check_key(key)?;
        check_value(&value)?;

        let delta = {
            let memtable = self.shard(key).memtable.write()?;
            let pre = memtable.size();
            memtable.set(key.to_vec(), value, flags, false);
            memtable.size() as i64 - pre as i64
        };

        if self.mem_size.fetch_add(delta, Ordering::SeqCst) + delta >= self.config.max_mem_size {
            self.flush(true)?;
        }

        Ok(())
    }

    /// Point lookup. Tombstones are a definitive negative: once one is
    /// met, older sources are not consulted.
    pub fn get(&self, key: &[u8]) -> Result<Option<(Vec<u8>, u32)>> {
        check_key(key)?;

        {
            let memtable = self.shard(key).memtable.read()?;
            if let Some(entry) = memtable.get(key) {
                if entry.tombstone {
                    return Ok(None);
                }
                return Ok(Some((entry.value, entry.flags)));
            }
        }

        let segments = self.segments.read()?;
        for segment in segments.iter().rev() {
            if let Some(entry) = segment.get(key)? {
                if entry.tombstone {
                    return Ok(None);
                }
                return Ok(Some((entry.value, entry.flags)));
            }
        }

        Ok(None)
    }

    /// Marks a key as deleted. The tombstone shadows any observation of
    /// the key in older segment files.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        check_key(key)?;

        let delta = {
            let memtable = self.shard(key).memtable.write()?;
            let pre = memtable.size();
            memtable.delete(key.to_vec());
            memtable.size() as i64 - pre as i64
        };

        if self.mem_size.fetch_add(delta, Ordering::SeqCst) + delta >= self.config.max_mem_size {
            self.flush(true)?;
        }

        Ok(())
    }

    /// Flushes remaining in-memory state and closes every segment
    /// reader.
    pub fn close(&self) -> Result<()> {
        self.flush(false)?;

        let mut segments = self.segments.write()?;
        tracing::info!(segments = segments.len(), "closing engine");
        segments.clear();
        Ok(())
    }

    /// Drains every non-empty shard into a new segment file.
    ///
    /// Single-flight: if another flush is in progress the call returns
    /// immediately without error; the in-flight flush drains the
    /// shards, and the next writer to cross the threshold retries.
    fn flush(&self, load_new: bool) -> Result<()> {
        let _guard = match self.flush_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Ok(()),
            Err(TryLockError::Poisoned(err)) => {
                return Err(Error::Internal(format!("poisoned flush lock: {err}")))
            }
        };

        if self.mem_size.load(Ordering::SeqCst) <= 0 {
            return Ok(());
        }

        tracing::info!("starting flush");

        for (shard_index, shard) in self.shards.iter().enumerate() {
            let mut memtable = shard.memtable.write()?;
            if memtable.size() == 0 {
                continue;
            }

            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_err(|err| Error::Internal(format!("system clock before epoch: {err}")))?
                .as_nanos();
            let name = format!("{shard_index}.{nanos}.{SEGMENT_EXT}");
            let path = self.config.dir.join(&name);

            let mut writer = Writer::create(&path, self.config.block_size, memtable.size())?;
            memtable.flush_to(&mut writer)?;
            writer.finish()?;

            // Only after the segment is durable: release the bytes from
            // the aggregate and swap in a fresh memtable. On a write
            // error above, the shard keeps its contents and the next
            // flush retries.
            self.mem_size
                .fetch_sub(memtable.size() as i64, Ordering::SeqCst);
            let entries = memtable.len();
            *memtable = Memtable::new();
            drop(memtable);

            tracing::debug!(segment = %name, entries, "wrote segment");

            if load_new {
                let reader = Reader::open(&path, self.config.hash_index)?;
                self.segments.write()?.push(reader);
            }
        }

        tracing::info!("flush complete");
        Ok(())
    }
}

fn check_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidArgument("empty key".into()));
    }
    if key.len() > u16::MAX as usize {
        return Err(Error::InvalidArgument(format!(
            "key length {} exceeds {}",
            key.len(),
            u16::MAX
        )));
    }
    Ok(())
}

fn check_value(value: &[u8]) -> Result<()> {
    if value.len() > u32::MAX as usize {
        return Err(Error::InvalidArgument(format!(
            "value length {} exceeds {}",
            value.len(),
            u32::MAX
        )));
    }
    Ok(())
}
