//! Segment files: immutable, sorted on-disk snapshots of a memtable.
//!
//! A segment file has four regions laid out sequentially:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ data region      records in ascending key order      │
//! ├──────────────────────────────────────────────────────┤ ← bloom_start
//! │ filter region    u32 length + raw filter bit bytes   │
//! ├──────────────────────────────────────────────────────┤ ← index_start
//! │ sparse index     u16 key_len | key | u64 offset ...  │
//! ├──────────────────────────────────────────────────────┤
//! │ trailer          bloom_start (8) | index_start (8)   │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are big-endian. There is no header or magic number;
//! integrity rests on the trailer and the length fields. Once written
//! and fsynced, a segment is never modified.

pub mod format;
pub mod index;
pub mod reader;
pub mod writer;

pub use index::SparseIndex;
pub use reader::Reader;
pub use writer::Writer;
