//! HyperLogLog sketch for approximate distinct counts.
//!
//! Registers are kept sparse until enough of them are set, which keeps the
//! serialized partial state small for low cardinality groups.

use std::hash::Hash;

use contquery_error::{DbError, Result, ResultExt};
use serde::{Deserialize, Serialize};

use super::stable_hash;

/// Number of index bits.
const PRECISION: u32 = 14;
const NUM_REGISTERS: usize = 1 << PRECISION;
/// Switch to dense registers once this many are set.
const SPARSE_THRESHOLD: usize = NUM_REGISTERS / 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum Registers {
    /// Sorted (index, rank) pairs.
    Sparse(Vec<(u16, u8)>),
    Dense(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HyperLogLog {
    registers: Registers,
}

impl Default for HyperLogLog {
    fn default() -> Self {
        HyperLogLog {
            registers: Registers::Sparse(Vec::new()),
        }
    }
}

impl HyperLogLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Hash + ?Sized>(&mut self, value: &T) {
        self.insert_hash(stable_hash(value));
    }

    pub fn insert_hash(&mut self, hash: u64) {
        let idx = (hash as usize) & (NUM_REGISTERS - 1);
        // Guard bit keeps the rank bounded when the remaining bits are zero.
        let rest = (hash >> PRECISION) | (1 << (64 - PRECISION));
        let rank = rest.trailing_zeros() as u8 + 1;
        self.update_register(idx, rank);
    }

    fn update_register(&mut self, idx: usize, rank: u8) {
        match &mut self.registers {
            Registers::Sparse(pairs) => {
                match pairs.binary_search_by_key(&(idx as u16), |(i, _)| *i) {
                    Ok(pos) => {
                        if pairs[pos].1 < rank {
                            pairs[pos].1 = rank;
                        }
                    }
                    Err(pos) => pairs.insert(pos, (idx as u16, rank)),
                }
                if pairs.len() > SPARSE_THRESHOLD {
                    self.densify();
                }
            }
            Registers::Dense(regs) => {
                if regs[idx] < rank {
                    regs[idx] = rank;
                }
            }
        }
    }

    fn densify(&mut self) {
        if let Registers::Sparse(pairs) = &self.registers {
            let mut regs = vec![0; NUM_REGISTERS];
            for (idx, rank) in pairs {
                regs[*idx as usize] = *rank;
            }
            self.registers = Registers::Dense(regs);
        }
    }

    /// Merge another sketch into this one, taking the max of each register.
    pub fn merge(&mut self, other: &HyperLogLog) {
        match &other.registers {
            Registers::Sparse(pairs) => {
                for (idx, rank) in pairs {
                    self.update_register(*idx as usize, *rank);
                }
            }
            Registers::Dense(other_regs) => {
                self.densify();
                if let Registers::Dense(regs) = &mut self.registers {
                    for (reg, other) in regs.iter_mut().zip(other_regs) {
                        if *reg < *other {
                            *reg = *other;
                        }
                    }
                }
            }
        }
    }

    /// Estimate the number of distinct values inserted.
    pub fn cardinality(&self) -> u64 {
        let m = NUM_REGISTERS as f64;
        let alpha = 0.7213 / (1.0 + 1.079 / m);

        let (sum, zeros) = match &self.registers {
            Registers::Sparse(pairs) => {
                if pairs.is_empty() {
                    return 0;
                }
                let set: f64 = pairs.iter().map(|(_, r)| 2f64.powi(-(*r as i32))).sum();
                let zeros = NUM_REGISTERS - pairs.len();
                (set + zeros as f64, zeros)
            }
            Registers::Dense(regs) => {
                let mut sum = 0.0;
                let mut zeros = 0;
                for r in regs {
                    sum += 2f64.powi(-(*r as i32));
                    if *r == 0 {
                        zeros += 1;
                    }
                }
                (sum, zeros)
            }
        };

        let estimate = alpha * m * m / sum;
        let estimate = if estimate <= 2.5 * m && zeros != 0 {
            // Linear counting for small cardinalities.
            m * (m / zeros as f64).ln()
        } else {
            estimate
        };

        estimate.max(0.0).round() as u64
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("Failed to serialize hyperloglog")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let hll: HyperLogLog =
            serde_json::from_slice(bytes).context("Failed to deserialize hyperloglog")?;
        if let Registers::Dense(regs) = &hll.registers {
            if regs.len() != NUM_REGISTERS {
                return Err(DbError::new("Invalid hyperloglog register count")
                    .with_field("registers", regs.len()));
            }
        }
        Ok(hll)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(expected: u64, actual: u64) {
        let err = (expected as f64 - actual as f64).abs() / expected as f64;
        assert!(err < 0.03, "expected ~{expected}, got {actual}");
    }

    #[test]
    fn empty_is_zero() {
        assert_eq!(0, HyperLogLog::new().cardinality());
    }

    #[test]
    fn small_counts_exactish() {
        let mut hll = HyperLogLog::new();
        for i in 0..10_i64 {
            hll.insert(&i);
            hll.insert(&i);
        }
        assert_eq!(10, hll.cardinality());
    }

    #[test]
    fn large_counts_dense() {
        let mut hll = HyperLogLog::new();
        for i in 0..100_000_i64 {
            hll.insert(&i);
        }
        assert!(matches!(hll.registers, Registers::Dense(_)));
        assert_close(100_000, hll.cardinality());
    }

    #[test]
    fn merge_overlapping() {
        let mut a = HyperLogLog::new();
        let mut b = HyperLogLog::new();
        for i in 0..3000_i64 {
            a.insert(&i);
        }
        for i in 2000..6000_i64 {
            b.insert(&i);
        }
        a.merge(&b);
        assert_close(6000, a.cardinality());

        let restored = HyperLogLog::from_bytes(&a.to_bytes().unwrap()).unwrap();
        assert_eq!(a, restored);
    }
}
