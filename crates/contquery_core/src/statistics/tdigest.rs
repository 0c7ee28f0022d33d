//! T-Digest sketch for approximate quantiles over combinable partial states.
//!
//! <https://arxiv.org/abs/1902.04023>

use std::cmp::Ordering;

use contquery_error::{DbError, Result, ResultExt};
use serde::{Deserialize, Serialize};

pub const DEFAULT_COMPRESSION: usize = 100;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub mean: f64,
    pub weight: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TDigest {
    /// Centroids sorted by ascending mean.
    centroids: Vec<Centroid>,
    total_weight: f64,
    /// Compression parameter 'delta'.
    compression: usize,
}

impl Default for TDigest {
    fn default() -> Self {
        TDigest {
            centroids: Vec::new(),
            total_weight: 0.0,
            compression: DEFAULT_COMPRESSION,
        }
    }
}

impl TDigest {
    pub fn try_new(compression: usize) -> Result<Self> {
        if compression == 0 {
            return Err(DbError::new("TDigest compression cannot be zero"));
        }
        Ok(TDigest {
            centroids: Vec::new(),
            total_weight: 0.0,
            compression,
        })
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    /// Insert a single value.
    ///
    /// The value is merged into its nearest centroid when that centroid's
    /// size bound allows it, otherwise it becomes a new centroid.
    pub fn add(&mut self, x: f64) {
        if x.is_nan() {
            return;
        }

        if self.centroids.is_empty() {
            self.centroids.push(Centroid {
                mean: x,
                weight: 1.0,
            });
            self.total_weight = 1.0;
            return;
        }

        let idx = self
            .centroids
            .partition_point(|c| c.mean.total_cmp(&x) == Ordering::Less);

        // Pick the closest of the neighbors around the insertion point.
        let best = match (idx.checked_sub(1), self.centroids.get(idx)) {
            (Some(left), Some(right)) => {
                if (self.centroids[left].mean - x).abs() <= (right.mean - x).abs() {
                    left
                } else {
                    idx
                }
            }
            (Some(left), None) => left,
            (None, _) => idx,
        };

        let cumulative: f64 = self.centroids[..best].iter().map(|c| c.weight).sum();
        let w_best = self.centroids[best].weight;
        let q_best = (cumulative + w_best * 0.5) / self.total_weight;
        let w_max = self.size_bound(q_best);

        if w_best + 1.0 <= w_max {
            let c = &mut self.centroids[best];
            let new_weight = w_best + 1.0;
            c.mean = (c.mean * w_best + x) / new_weight;
            c.weight = new_weight;
        } else {
            self.centroids.insert(
                idx,
                Centroid {
                    mean: x,
                    weight: 1.0,
                },
            );
        }

        self.total_weight += 1.0;

        if self.centroids.len() > self.compression * 20 {
            self.compress();
        }
    }

    /// Merge another digest into this one.
    pub fn merge(&mut self, other: &TDigest) -> Result<()> {
        if self.compression != other.compression {
            return Err(DbError::new("Cannot merge tdigests with different compression")
                .with_field("left", self.compression)
                .with_field("right", other.compression));
        }
        if other.is_empty() {
            return Ok(());
        }
        self.centroids.extend(other.centroids.iter().cloned());
        self.total_weight += other.total_weight;
        self.compress();
        Ok(())
    }

    /// Approximate value at quantile `q`, NaN when empty.
    pub fn quantile(&self, q: f64) -> f64 {
        if self.centroids.is_empty() || self.total_weight == 0.0 {
            return f64::NAN;
        }
        let target = q.clamp(0.0, 1.0) * self.total_weight;
        let mut cumulative = 0.0;

        for (i, c) in self.centroids.iter().enumerate() {
            if target < cumulative + c.weight {
                let offset = if c.weight > 0.0 {
                    (target - cumulative) / c.weight
                } else {
                    0.0
                };
                let next_mean = self.centroids.get(i + 1).map(|n| n.mean).unwrap_or(c.mean);
                return c.mean + offset * (next_mean - c.mean);
            }
            cumulative += c.weight;
        }

        self.centroids.last().map(|c| c.mean).unwrap_or(f64::NAN)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("Failed to serialize tdigest")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("Failed to deserialize tdigest")
    }

    fn size_bound(&self, q: f64) -> f64 {
        let n = self.total_weight;
        if n > 0.0 {
            4.0 * n * q * (1.0 - q) / self.compression as f64
        } else {
            f64::INFINITY
        }
    }

    /// Re-sort centroids and merge neighbors that fit within the size bound.
    fn compress(&mut self) {
        if self.centroids.is_empty() {
            return;
        }

        self.centroids.sort_by(|a, b| a.mean.total_cmp(&b.mean));

        let mut merged: Vec<Centroid> = Vec::with_capacity(self.centroids.len());
        let mut running_weight = 0.0;

        for c in std::mem::take(&mut self.centroids) {
            match merged.last_mut() {
                Some(last) => {
                    let cum_before_last = running_weight - last.weight;
                    let q_last = (cum_before_last + last.weight * 0.5) / self.total_weight;
                    if last.weight + c.weight <= self.size_bound(q_last) {
                        let new_weight = last.weight + c.weight;
                        last.mean = (last.mean * last.weight + c.mean * c.weight) / new_weight;
                        last.weight = new_weight;
                    } else {
                        merged.push(c.clone());
                    }
                }
                None => merged.push(c.clone()),
            }
            running_weight += c.weight;
        }

        self.centroids = merged;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantiles_near_exact() {
        let mut td = TDigest::default();
        for i in 0..1000 {
            td.add(i as f64);
        }
        let median = td.quantile(0.5);
        assert!((median - 499.5).abs() < 20.0, "median: {median}");
        let p90 = td.quantile(0.9);
        assert!((p90 - 899.0).abs() < 20.0, "p90: {p90}");
    }

    #[test]
    fn merge_halves() {
        let mut a = TDigest::default();
        let mut b = TDigest::default();
        for i in 0..500 {
            a.add(i as f64);
        }
        for i in 500..1000 {
            b.add(i as f64);
        }
        a.merge(&b).unwrap();
        assert_eq!(1000.0, a.total_weight());
        let median = a.quantile(0.5);
        assert!((median - 499.5).abs() < 20.0, "median: {median}");
    }

    #[test]
    fn merge_mismatched_compression() {
        let mut a = TDigest::try_new(10).unwrap();
        let mut b = TDigest::try_new(20).unwrap();
        b.add(1.0);
        assert!(a.merge(&b).is_err());
    }

    #[test]
    fn bytes_round_trip() {
        let mut td = TDigest::default();
        td.add(3.0);
        td.add(4.0);
        let restored = TDigest::from_bytes(&td.to_bytes().unwrap()).unwrap();
        assert_eq!(td, restored);
    }

    #[test]
    fn empty_quantile_is_nan() {
        assert!(TDigest::default().quantile(0.5).is_nan());
        assert!(TDigest::try_new(0).is_err());
    }
}
