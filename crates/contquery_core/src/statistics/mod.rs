//! Probabilistic sketches backing the streaming aggregates.
pub mod bloom;
pub mod cmsketch;
pub mod hyperloglog;
pub mod tdigest;
pub mod topk;

use std::hash::Hash;

/// Fixed seeds so hashes are stable across processes for the same build.
const HASH_SEEDS: (u64, u64, u64, u64) = (
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
);

/// Hash a value with fixed seeds. Sketches built in different batches must
/// agree on hashes to be mergeable.
pub fn stable_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let hasher = ahash::RandomState::with_seeds(HASH_SEEDS.0, HASH_SEEDS.1, HASH_SEEDS.2, HASH_SEEDS.3);
    hasher.hash_one(value)
}

/// Split a hash into the two halves used for double hashing. The second
/// half is forced odd so the derived positions stay distinct.
pub(crate) fn double_hash(hash: u64) -> (u64, u64) {
    (hash & 0xffff_ffff, (hash >> 32) | 1)
}
