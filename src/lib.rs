//! A persistent, single-node ordered key-value store built on a
//! log-structured merge arrangement.
//!
//! Writes land in sharded in-memory skip lists. When the aggregate
//! in-memory size crosses a configured budget, each non-empty shard is
//! drained into an immutable sorted segment file. Reads consult the
//! owning shard first, then segment files from newest to oldest, and
//! stop at the first definitive answer (a value or a tombstone).
//!
//! ```text
//!           set/get/delete
//!                 │
//!        ┌────────▼────────┐
//!        │     Engine      │  hash32(key) % shard_count
//!        └───┬────────┬────┘
//!            ▼        ▼
//!      ┌─────────┐ ┌─────────┐
//!      │ Shard 0 │ │ Shard N │  RwLock<Memtable>
//!      └────┬────┘ └────┬────┘
//!           │   flush   │
//!           ▼           ▼
//!      ┌────────────────────┐
//!      │   Segment files    │  <shard>.<nanos>.sst, newest wins
//!      └────────────────────┘
//! ```
//!
//! There is no write-ahead log: durability covers exactly the data that
//! has been flushed and fsynced. Segment files accumulate monotonically;
//! there is no compaction.

pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod hash;
pub mod memtable;
pub mod sstable;

pub use config::Config;
pub use engine::Engine;
pub use error::{Error, Result};
