//! Space-saving sketch tracking the most frequent values.
//!
//! At most `k * CAPACITY_FACTOR` counters are kept. When a new value arrives
//! and every counter is taken, the smallest counter is reassigned to it and
//! the evicted count is carried as the new value's error bound.

use contquery_error::{DbError, ErrorKind, Result, ResultExt};
use serde::{Deserialize, Serialize};

use crate::arrays::scalar::ScalarValue;

/// Counters kept per requested value.
const CAPACITY_FACTOR: usize = 6;
/// Largest supported `k`.
pub const MAX_K: usize = 1 << 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Counter {
    value: ScalarValue,
    count: u64,
    /// Upper bound on how much `count` overestimates.
    error: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopK {
    k: usize,
    counters: Vec<Counter>,
}

impl TopK {
    pub fn new(k: usize) -> Result<Self> {
        if k == 0 || k > MAX_K {
            return Err(DbError::new(format!("k must be between 1 and {MAX_K}"))
                .with_kind(ErrorKind::Execution)
                .with_field("k", k));
        }
        Ok(TopK {
            k,
            counters: Vec::new(),
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    fn capacity(&self) -> usize {
        self.k * CAPACITY_FACTOR
    }

    fn is_full(&self) -> bool {
        self.counters.len() >= self.capacity()
    }

    /// Smallest tracked count, zero while counters are still free.
    fn floor(&self) -> u64 {
        if !self.is_full() {
            return 0;
        }
        self.counters.iter().map(|c| c.count).min().unwrap_or(0)
    }

    pub fn increment(&mut self, value: &ScalarValue, weight: u64) {
        if let Some(counter) = self.counters.iter_mut().find(|c| &c.value == value) {
            counter.count = counter.count.saturating_add(weight);
            return;
        }
        if !self.is_full() {
            self.counters.push(Counter {
                value: value.clone(),
                count: weight,
                error: 0,
            });
            return;
        }
        if let Some(min) = self.counters.iter_mut().min_by_key(|c| c.count) {
            min.value = value.clone();
            min.error = min.count;
            min.count = min.count.saturating_add(weight);
        }
    }

    /// Merge another sketch. Values missing from one side are assumed to
    /// have that side's smallest count.
    pub fn merge(&mut self, other: &TopK) -> Result<()> {
        if self.k != other.k {
            return Err(DbError::new("Top-k sketches must have the same k to be merged")
                .with_kind(ErrorKind::Execution)
                .with_field("left", self.k)
                .with_field("right", other.k));
        }
        let (floor, other_floor) = (self.floor(), other.floor());

        let mut merged: Vec<Counter> = Vec::with_capacity(self.counters.len() + other.counters.len());
        for counter in &self.counters {
            let (count, error) = match other.counters.iter().find(|c| c.value == counter.value) {
                Some(o) => (o.count, o.error),
                None => (other_floor, other_floor),
            };
            merged.push(Counter {
                value: counter.value.clone(),
                count: counter.count.saturating_add(count),
                error: counter.error.saturating_add(error),
            });
        }
        for counter in &other.counters {
            if self.counters.iter().any(|c| c.value == counter.value) {
                continue;
            }
            merged.push(Counter {
                value: counter.value.clone(),
                count: counter.count.saturating_add(floor),
                error: counter.error.saturating_add(floor),
            });
        }

        sort_counters(&mut merged);
        merged.truncate(self.capacity());
        self.counters = merged;
        Ok(())
    }

    /// Up to `k` most frequent values with their estimated counts, most
    /// frequent first.
    pub fn top(&self) -> Vec<(ScalarValue, u64)> {
        let mut counters = self.counters.clone();
        sort_counters(&mut counters);
        counters
            .into_iter()
            .take(self.k)
            .map(|c| (c.value, c.count))
            .collect()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("Failed to serialize top-k sketch")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let topk: TopK = serde_json::from_slice(bytes).context("Failed to deserialize top-k sketch")?;
        if topk.k == 0 || topk.k > MAX_K || topk.counters.len() > topk.capacity() {
            return Err(DbError::new("Invalid top-k sketch").with_field("k", topk.k));
        }
        Ok(topk)
    }
}

/// Highest count first, ties by value so results are deterministic.
fn sort_counters(counters: &mut [Counter]) {
    counters.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> ScalarValue {
        ScalarValue::from(v)
    }

    #[test]
    fn exact_below_capacity() {
        let mut topk = TopK::new(2).unwrap();
        for v in ["a", "b", "a", "c", "a", "b"] {
            topk.increment(&s(v), 1);
        }
        assert_eq!(vec![(s("a"), 3), (s("b"), 2)], topk.top());
    }

    #[test]
    fn heavy_hitter_survives_eviction() {
        let mut topk = TopK::new(1).unwrap();
        for i in 0..100 {
            topk.increment(&ScalarValue::Int64(i), 1);
            topk.increment(&ScalarValue::Int64(-1), 1);
        }
        let top = topk.top();
        assert_eq!(ScalarValue::Int64(-1), top[0].0);
        assert!(top[0].1 >= 100);
    }

    #[test]
    fn merge_sums_shared_values() {
        let mut a = TopK::new(2).unwrap();
        let mut b = TopK::new(2).unwrap();
        a.increment(&s("x"), 5);
        a.increment(&s("y"), 1);
        b.increment(&s("y"), 7);
        b.increment(&s("z"), 2);
        a.merge(&b).unwrap();
        assert_eq!(vec![(s("y"), 8), (s("x"), 5)], a.top());

        let restored = TopK::from_bytes(&a.to_bytes().unwrap()).unwrap();
        assert_eq!(a, restored);
        assert!(a.merge(&TopK::new(3).unwrap()).is_err());
    }

    #[test]
    fn invalid_k() {
        // (k, ok)
        let cases = [(0, false), (1, true), (MAX_K, true), (MAX_K + 1, false)];
        for (k, ok) in cases {
            assert_eq!(ok, TopK::new(k).is_ok(), "k: {k}");
        }
    }
}
