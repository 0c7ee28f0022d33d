//! Count-min sketch for approximate frequencies.
//!
//! Estimates never undercount. With width `e / eps` and depth
//! `ln(1 / (1 - p))`, an estimate exceeds the true count by more than
//! `eps * total` with probability at most `1 - p`.

use std::hash::Hash;

use contquery_error::{DbError, ErrorKind, Result, ResultExt};
use serde::{Deserialize, Serialize};

use super::{double_hash, stable_hash};

pub const DEFAULT_EPSILON: f64 = 0.002;
pub const DEFAULT_CONFIDENCE: f64 = 0.995;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountMinSketch {
    width: u32,
    depth: u32,
    /// Row major, `depth` rows of `width` counters.
    counters: Vec<u64>,
    /// Sum of every count added.
    total: u64,
}

impl Default for CountMinSketch {
    fn default() -> Self {
        Self::build(DEFAULT_EPSILON, DEFAULT_CONFIDENCE)
    }
}

impl CountMinSketch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(epsilon: f64, confidence: f64) -> Result<Self> {
        if !(epsilon > 0.0 && epsilon < 1.0) || !(confidence > 0.0 && confidence < 1.0) {
            return Err(DbError::new("Count-min sketch parameters must be in (0, 1)")
                .with_kind(ErrorKind::Execution)
                .with_field("epsilon", epsilon)
                .with_field("confidence", confidence));
        }
        Ok(Self::build(epsilon, confidence))
    }

    fn build(epsilon: f64, confidence: f64) -> Self {
        let width = (std::f64::consts::E / epsilon).ceil() as u32;
        let depth = (1.0 / (1.0 - confidence)).ln().ceil().max(1.0) as u32;
        CountMinSketch {
            width,
            depth,
            counters: vec![0; width as usize * depth as usize],
            total: 0,
        }
    }

    fn cells(&self, hash: u64) -> impl Iterator<Item = usize> + '_ {
        let (h1, h2) = double_hash(hash);
        let width = self.width as u64;
        (0..self.depth as u64).map(move |row| {
            let col = h1.wrapping_add(row.wrapping_mul(h2)) % width;
            (row * width + col) as usize
        })
    }

    pub fn add<T: Hash + ?Sized>(&mut self, value: &T, count: u64) {
        let cells: Vec<usize> = self.cells(stable_hash(value)).collect();
        for cell in cells {
            self.counters[cell] = self.counters[cell].saturating_add(count);
        }
        self.total = self.total.saturating_add(count);
    }

    /// Estimated number of times the value was added.
    pub fn estimate<T: Hash + ?Sized>(&self, value: &T) -> u64 {
        self.cells(stable_hash(value))
            .map(|cell| self.counters[cell])
            .min()
            .unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn merge(&mut self, other: &CountMinSketch) -> Result<()> {
        if self.width != other.width || self.depth != other.depth {
            return Err(DbError::new("Count-min sketches must have the same dimensions to be merged")
                .with_kind(ErrorKind::Execution)
                .with_field("left", (self.width, self.depth))
                .with_field("right", (other.width, other.depth)));
        }
        for (counter, other) in self.counters.iter_mut().zip(&other.counters) {
            *counter = counter.saturating_add(*other);
        }
        self.total = self.total.saturating_add(other.total);
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("Failed to serialize count-min sketch")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let cms: CountMinSketch =
            serde_json::from_slice(bytes).context("Failed to deserialize count-min sketch")?;
        if cms.width == 0 || cms.counters.len() != cms.width as usize * cms.depth as usize {
            return Err(DbError::new("Invalid count-min sketch")
                .with_field("width", cms.width)
                .with_field("depth", cms.depth));
        }
        Ok(cms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_dimensions() {
        let cms = CountMinSketch::new();
        assert_eq!(1360, cms.width);
        assert_eq!(6, cms.depth);
    }

    #[test]
    fn never_undercounts() {
        let mut cms = CountMinSketch::new();
        for i in 0..500_i64 {
            cms.add(&i, (i % 7) as u64 + 1);
        }
        for i in 0..500_i64 {
            assert!(cms.estimate(&i) >= (i % 7) as u64 + 1);
        }
        assert_eq!(0, CountMinSketch::new().estimate("missing"));
    }

    #[test]
    fn merge_adds_counts() {
        let mut a = CountMinSketch::new();
        let mut b = CountMinSketch::new();
        a.add("x", 3);
        b.add("x", 4);
        b.add("y", 1);
        a.merge(&b).unwrap();
        assert_eq!(7, a.estimate("x"));
        assert_eq!(8, a.total());

        let small = CountMinSketch::with_params(0.1, 0.9).unwrap();
        assert!(a.merge(&small).is_err());
    }
}
