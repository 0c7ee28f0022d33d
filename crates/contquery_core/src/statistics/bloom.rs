//! Bloom filter for approximate set membership.
//!
//! Filters built with the same parameters can be unioned and intersected,
//! which is what makes them usable as partial aggregate states.

use std::hash::Hash;

use contquery_error::{DbError, ErrorKind, Result, ResultExt};
use serde::{Deserialize, Serialize};

use super::{double_hash, stable_hash};

/// Default false positive rate.
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.02;
/// Default number of expected elements.
pub const DEFAULT_EXPECTED_ELEMENTS: u64 = 16384;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloomFilter {
    /// Number of bits.
    m: u64,
    /// Number of hash functions.
    k: u32,
    blocks: Vec<u64>,
}

impl Default for BloomFilter {
    fn default() -> Self {
        // Defaults are within range.
        Self::build(DEFAULT_FALSE_POSITIVE_RATE, DEFAULT_EXPECTED_ELEMENTS)
    }
}

impl BloomFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a filter sized for `n` elements at false positive rate `p`.
    pub fn with_params(p: f64, n: u64) -> Result<Self> {
        if !(p > 0.0 && p < 1.0) {
            return Err(DbError::new("Bloom filter false positive rate must be in (0, 1)")
                .with_kind(ErrorKind::Execution)
                .with_field("p", p));
        }
        if n == 0 {
            return Err(DbError::new("Bloom filter expected element count must be positive")
                .with_kind(ErrorKind::Execution));
        }
        Ok(Self::build(p, n))
    }

    fn build(p: f64, n: u64) -> Self {
        let ln2 = std::f64::consts::LN_2;
        let m = (-(n as f64) * p.ln() / (ln2 * ln2)).ceil().max(64.0) as u64;
        let k = ((m as f64 / n as f64) * ln2).round().max(1.0) as u32;
        BloomFilter {
            m,
            k,
            blocks: vec![0; m.div_ceil(64) as usize],
        }
    }

    fn positions(&self, hash: u64) -> impl Iterator<Item = u64> + '_ {
        let (h1, h2) = double_hash(hash);
        (0..self.k as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % self.m)
    }

    pub fn insert<T: Hash + ?Sized>(&mut self, value: &T) {
        let positions: Vec<u64> = self.positions(stable_hash(value)).collect();
        for pos in positions {
            self.blocks[(pos / 64) as usize] |= 1 << (pos % 64);
        }
    }

    pub fn contains<T: Hash + ?Sized>(&self, value: &T) -> bool {
        self.positions(stable_hash(value))
            .all(|pos| self.blocks[(pos / 64) as usize] & (1 << (pos % 64)) != 0)
    }

    fn check_compatible(&self, other: &BloomFilter, op: &str) -> Result<()> {
        if self.m != other.m || self.k != other.k {
            return Err(DbError::new(format!(
                "bloom_{op} operands must all have the same p and n"
            ))
            .with_kind(ErrorKind::Execution));
        }
        Ok(())
    }

    pub fn union(&mut self, other: &BloomFilter) -> Result<()> {
        self.check_compatible(other, "union")?;
        for (block, other) in self.blocks.iter_mut().zip(&other.blocks) {
            *block |= other;
        }
        Ok(())
    }

    pub fn intersect(&mut self, other: &BloomFilter) -> Result<()> {
        self.check_compatible(other, "intersection")?;
        for (block, other) in self.blocks.iter_mut().zip(&other.blocks) {
            *block &= other;
        }
        Ok(())
    }

    /// Estimate the number of distinct elements from the fill ratio.
    pub fn cardinality(&self) -> u64 {
        let set: u64 = self.blocks.iter().map(|b| b.count_ones() as u64).sum();
        if set == 0 {
            return 0;
        }
        let m = self.m as f64;
        if set >= self.m {
            return (m / self.k as f64).round() as u64;
        }
        let estimate = -(m / self.k as f64) * (1.0 - set as f64 / m).ln();
        estimate.round() as u64
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("Failed to serialize bloom filter")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bloom: BloomFilter =
            serde_json::from_slice(bytes).context("Failed to deserialize bloom filter")?;
        if bloom.m == 0 || bloom.k == 0 || bloom.blocks.len() as u64 != bloom.m.div_ceil(64) {
            return Err(DbError::new("Invalid bloom filter")
                .with_field("m", bloom.m)
                .with_field("blocks", bloom.blocks.len()));
        }
        Ok(bloom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_false_negatives() {
        let mut bloom = BloomFilter::new();
        for i in 0..1000_i64 {
            bloom.insert(&i);
        }
        assert!((0..1000_i64).all(|i| bloom.contains(&i)));

        let false_positives = (1000..11_000_i64).filter(|i| bloom.contains(i)).count();
        assert!(false_positives < 200, "false positives: {false_positives}");
    }

    #[test]
    fn union_and_intersection() {
        let mut a = BloomFilter::new();
        let mut b = BloomFilter::new();
        for v in ["x", "y"] {
            a.insert(v);
        }
        for v in ["y", "z"] {
            b.insert(v);
        }

        let mut both = a.clone();
        both.intersect(&b).unwrap();
        assert!(both.contains("y"));
        assert!(!both.contains("x"));

        a.union(&b).unwrap();
        assert!(["x", "y", "z"].iter().all(|v| a.contains(v)));
        assert_eq!(3, a.cardinality());
    }

    #[test]
    fn mismatched_params_rejected() {
        let mut a = BloomFilter::new();
        let b = BloomFilter::with_params(0.1, 100).unwrap();
        assert!(a.union(&b).is_err());
        assert!(BloomFilter::with_params(1.5, 100).is_err());
        assert!(BloomFilter::with_params(0.1, 0).is_err());
    }

    #[test]
    fn bytes_round_trip() {
        let mut bloom = BloomFilter::with_params(0.05, 64).unwrap();
        bloom.insert(&42_i64);
        let restored = BloomFilter::from_bytes(&bloom.to_bytes().unwrap()).unwrap();
        assert_eq!(bloom, restored);
        assert!(BloomFilter::from_bytes(b"{}").is_err());
    }
}
