//! Key hashing.
//!
//! Two non-cryptographic hashes are used for distinct purposes and must
//! both stay stable: [`hash64`] feeds the membership filter probes and
//! the per-segment hash index, so it is part of the on-disk contract;
//! [`hash32`] only routes keys to memtable shards.

use std::hash::Hasher;

use fnv::FnvHasher;

/// 64-bit FNV-1a hash of a key.
///
/// The serialized membership filter inside every segment file is probed
/// with positions derived from this value, so changing it invalidates
/// existing segments.
pub fn hash64(key: &[u8]) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(key);
    hasher.finish()
}

const FNV32_OFFSET: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a hash of a key, used for shard routing.
pub fn hash32(key: &[u8]) -> u32 {
    let mut hash = FNV32_OFFSET;
    for &byte in key {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV32_PRIME);
    }
    hash
}
