//! T-Digest quantile sketch.
//!
//! Memory is O(compression) regardless of stream length. Accuracy is best at
//! the tails (p < 0.01 or p > 0.99), which is where replication lag outliers
//! live.
//!
//! Reads never mutate the digest: buffered values are merged into a temporary
//! view when a quantile is requested, and folded in for real only when the
//! buffer fills up during [`TDigest::add`].

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use thiserror::Error;

/// Errors from sketch reads.
#[derive(Debug, Error, PartialEq)]
pub enum SketchError {
    #[error("Sketch is empty")]
    Empty,

    #[error("Quantile must be between 0 and 1, got {0}")]
    InvalidQuantile(f64),
}

/// Compression parameter. Higher = more accurate but more memory.
const COMPRESSION: f64 = 200.0;

/// A centroid in the T-Digest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Centroid {
    mean: f64,
    weight: f64,
}

impl Centroid {
    fn new(mean: f64, weight: f64) -> Self {
        Self { mean, weight }
    }

    /// Merge another centroid into this one.
    fn merge(&mut self, other: &Centroid) {
        let total_weight = self.weight + other.weight;
        if total_weight > 0.0 {
            self.mean = (self.mean * self.weight + other.mean * other.weight) / total_weight;
            self.weight = total_weight;
        }
    }
}

fn by_mean(a: &Centroid, b: &Centroid) -> Ordering {
    a.mean.partial_cmp(&b.mean).unwrap_or(Ordering::Equal)
}

/// T-Digest for quantile estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TDigest {
    /// Sorted centroids.
    centroids: Vec<Centroid>,
    /// Unprocessed buffer of (value, weight) pairs.
    buffer: Vec<(f64, f64)>,
    /// Total weight, including buffered values.
    total_weight: f64,
    min: f64,
    max: f64,
}

impl TDigest {
    pub fn new() -> Self {
        Self {
            centroids: Vec::new(),
            buffer: Vec::new(),
            total_weight: 0.0,
            min: f64::MAX,
            max: f64::MIN,
        }
    }

    /// Maximum buffer size before auto-merge.
    fn buffer_capacity(&self) -> usize {
        (COMPRESSION * 2.0) as usize
    }

    /// Add a value to the digest. Non-finite values are ignored.
    pub fn add(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.buffer.push((value, 1.0));
        self.total_weight += 1.0;

        if self.buffer.len() >= self.buffer_capacity() {
            self.process_buffer();
        }
    }

    /// Fold the buffer into the centroid list.
    fn process_buffer(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let merged = self.merged_with_buffer();
        self.buffer.clear();
        self.centroids = merged;
    }

    /// Existing centroids plus buffered values, sorted and compressed.
    fn merged_with_buffer(&self) -> Vec<Centroid> {
        let mut all_centroids = self.centroids.clone();
        all_centroids.extend(
            self.buffer
                .iter()
                .map(|&(value, weight)| Centroid::new(value, weight)),
        );
        all_centroids.sort_by(by_mean);
        self.compress_centroids(all_centroids)
    }

    /// Centroid view used by reads; borrows when nothing is buffered.
    fn view(&self) -> Cow<'_, [Centroid]> {
        if self.buffer.is_empty() {
            Cow::Borrowed(&self.centroids)
        } else {
            Cow::Owned(self.merged_with_buffer())
        }
    }

    /// Compress centroids using the T-Digest scale function.
    fn compress_centroids(&self, centroids: Vec<Centroid>) -> Vec<Centroid> {
        let mut iter = centroids.into_iter();
        let Some(mut current) = iter.next() else {
            return Vec::new();
        };

        let mut result = Vec::new();
        let mut weight_so_far = 0.0;
        let total = self.total_weight;

        for centroid in iter {
            let proposed_weight = current.weight + centroid.weight;
            let q = (weight_so_far + proposed_weight / 2.0) / total;

            if proposed_weight <= self.scale_limit(q) {
                current.merge(&centroid);
            } else {
                weight_so_far += current.weight;
                result.push(current);
                current = centroid;
            }
        }

        result.push(current);
        result
    }

    /// Compute the weight limit at a given quantile.
    fn scale_limit(&self, q: f64) -> f64 {
        let q = q.clamp(0.0001, 0.9999);
        let k = COMPRESSION * (q * (1.0 - q)).sqrt() * 4.0;
        k.max(1.0)
    }

    /// Estimate a quantile (0 to 1).
    pub fn quantile(&self, q: f64) -> Result<f64, SketchError> {
        if !(0.0..=1.0).contains(&q) {
            return Err(SketchError::InvalidQuantile(q));
        }

        let centroids = self.view();
        if centroids.is_empty() {
            return Err(SketchError::Empty);
        }

        if q == 0.0 {
            return Ok(self.min);
        }
        if q == 1.0 {
            return Ok(self.max);
        }

        let n = centroids.len();
        let target_weight = q * self.total_weight;

        let mut cum_weight = Vec::with_capacity(n + 1);
        cum_weight.push(0.0);
        let mut total = 0.0;
        for c in centroids.iter() {
            total += c.weight;
            cum_weight.push(total);
        }

        let idx = (0..n)
            .find(|&i| target_weight >= cum_weight[i] && target_weight <= cum_weight[i + 1])
            .unwrap_or(n - 1);

        let centroid = &centroids[idx];
        let lower_cum = cum_weight[idx];
        let upper_cum = cum_weight[idx + 1];

        let centroid_frac = if upper_cum > lower_cum {
            (target_weight - lower_cum) / (upper_cum - lower_cum)
        } else {
            0.5
        };

        // Each centroid spans from the midpoint with its left neighbour to the
        // midpoint with its right neighbour; the outermost ones reach min/max.
        let (range_min, range_max) = if n == 1 {
            (self.min, self.max)
        } else if idx == 0 {
            let next = &centroids[1];
            (self.min, (centroid.mean + next.mean) / 2.0)
        } else if idx == n - 1 {
            let prev = &centroids[n - 2];
            ((prev.mean + centroid.mean) / 2.0, self.max)
        } else {
            let prev = &centroids[idx - 1];
            let next = &centroids[idx + 1];
            (
                (prev.mean + centroid.mean) / 2.0,
                (centroid.mean + next.mean) / 2.0,
            )
        };

        Ok(range_min + centroid_frac * (range_max - range_min))
    }

    pub fn is_empty(&self) -> bool {
        self.total_weight == 0.0
    }
}

impl Default for TDigest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tdigest_basic() {
        let mut td = TDigest::new();

        for i in 1..=100 {
            td.add(i as f64);
        }

        let median = td.quantile(0.5).unwrap();
        assert!((median - 50.0).abs() < 2.0);

        let p99 = td.quantile(0.99).unwrap();
        assert!((p99 - 99.0).abs() < 2.0);
    }

    #[test]
    fn test_tdigest_large_stream_percentiles() {
        let mut td = TDigest::new();

        for i in 1..=1000 {
            td.add(i as f64);
        }

        for (q, expected) in [(0.5, 500.0), (0.9, 900.0), (0.99, 990.0)] {
            assert!((td.quantile(q).unwrap() - expected).abs() < 20.0);
        }
    }

    #[test]
    fn test_tdigest_empty() {
        let td = TDigest::new();
        assert_eq!(td.quantile(0.5), Err(SketchError::Empty));
        assert!(td.is_empty());
    }

    #[test]
    fn test_tdigest_single_value() {
        let mut td = TDigest::new();
        td.add(42.0);

        assert_eq!(td.quantile(0.0).unwrap(), 42.0);
        assert_eq!(td.quantile(0.5).unwrap(), 42.0);
        assert_eq!(td.quantile(1.0).unwrap(), 42.0);
    }

    #[test]
    fn test_tdigest_constant_stream() {
        let mut td = TDigest::new();
        for _ in 0..5 {
            td.add(1.0);
        }
        assert_eq!(td.quantile(0.9).unwrap(), 1.0);
    }

    #[test]
    fn test_tdigest_invalid_quantile() {
        let mut td = TDigest::new();
        td.add(1.0);

        assert!(td.quantile(-0.1).is_err());
        assert!(td.quantile(1.1).is_err());
    }

    #[test]
    fn test_tdigest_ignores_non_finite() {
        let mut td = TDigest::new();
        td.add(f64::NAN);
        td.add(f64::INFINITY);
        assert!(td.is_empty());
    }

    #[test]
    fn test_quantile_does_not_fold_buffer() {
        let mut td = TDigest::new();
        td.add(3.0);
        td.add(1.0);
        let _ = td.quantile(0.5).unwrap();
        assert!(td.centroids.is_empty());
        assert_eq!(td.buffer.len(), 2);
    }

    #[test]
    fn test_tdigest_compression() {
        let mut td = TDigest::new();

        for i in 0..100_000 {
            td.add(i as f64);
        }

        assert!(td.view().len() < 1000);
    }
}
