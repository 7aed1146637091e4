//! Online summary statistics over a stream of samples.
//!
//! [`Summary`] keeps exact count, sum, min, max and variance (Welford), a
//! [`TDigest`] for p50/p90/p95/p99, and a fixed log2 bucket histogram. Memory
//! is bounded by the digest compression and the bucket count; no individual
//! samples are retained.
//!
//! Non-finite samples (NaN, ±inf) are rejected and counted separately.
//! Negative samples are accepted and land in the lowest bucket.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::sketch::TDigest;

/// Number of histogram buckets. Bucket 0 holds everything below 1.0, bucket
/// `i >= 1` holds `[2^(i-1), 2^i)`, the last bucket is open-ended.
const BUCKETS: usize = 48;

/// Percentiles included in every report.
const REPORT_QUANTILES: [(f64, &str); 4] = [(0.50, "p50"), (0.90, "p90"), (0.95, "p95"), (0.99, "p99")];

/// Width of the widest histogram bar.
const BAR_WIDTH: u64 = 40;

fn bucket_index(x: f64) -> usize {
    if x < 1.0 {
        0
    } else {
        ((x.log2().floor() as usize) + 1).min(BUCKETS - 1)
    }
}

fn bucket_bounds(index: usize) -> (f64, f64) {
    match index {
        0 => (f64::NEG_INFINITY, 1.0),
        i if i == BUCKETS - 1 => (2f64.powi(i as i32 - 1), f64::INFINITY),
        i => (2f64.powi(i as i32 - 1), 2f64.powi(i as i32)),
    }
}

/// Mutable accumulator over a stream of doubles.
#[derive(Debug, Clone)]
pub struct Summary {
    count: u64,
    rejected: u64,
    sum: f64,
    min: f64,
    max: f64,
    // Welford running mean and sum of squared deviations. The mean stays
    // finite even when `sum` overflows.
    w_mean: f64,
    w_m2: f64,
    digest: TDigest,
    buckets: [u64; BUCKETS],
}

impl Default for Summary {
    fn default() -> Self {
        Self::new()
    }
}

impl Summary {
    pub fn new() -> Self {
        Summary {
            count: 0,
            rejected: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            w_mean: 0.0,
            w_m2: 0.0,
            digest: TDigest::new(),
            buckets: [0; BUCKETS],
        }
    }

    /// Incorporate one sample. Non-finite samples are counted as rejected.
    pub fn add(&mut self, x: f64) {
        if !x.is_finite() {
            self.rejected += 1;
            return;
        }

        self.count += 1;
        self.sum += x;
        self.min = self.min.min(x);
        self.max = self.max.max(x);

        let n = self.count as f64;
        let delta = x - self.w_mean;
        self.w_mean += x / n - self.w_mean / n;
        self.w_m2 += delta * (x - self.w_mean);

        self.digest.add(x);
        self.buckets[bucket_index(x)] += 1;
    }

    /// Number of accepted samples.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Number of rejected (non-finite) samples.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.w_mean)
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    /// Population standard deviation.
    pub fn stddev(&self) -> Option<f64> {
        (self.count > 0).then(|| (self.w_m2 / self.count as f64).max(0.0).sqrt())
    }

    /// Approximate quantile, `None` when empty or `q` is outside [0, 1].
    pub fn quantile(&self, q: f64) -> Option<f64> {
        self.digest.quantile(q).ok()
    }

    /// Non-empty histogram buckets between the first and last occupied one.
    pub fn histogram(&self) -> Vec<BucketCount> {
        let first = self.buckets.iter().position(|&c| c > 0);
        let last = self.buckets.iter().rposition(|&c| c > 0);
        match (first, last) {
            (Some(first), Some(last)) => (first..=last)
                .map(|i| {
                    let (lower, upper) = bucket_bounds(i);
                    BucketCount {
                        lower: lower.is_finite().then_some(lower),
                        upper: upper.is_finite().then_some(upper),
                        count: self.buckets[i],
                    }
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Serializable point-in-time view of the accumulator.
    pub fn snapshot(&self) -> SummarySnapshot {
        SummarySnapshot {
            count: self.count,
            rejected: self.rejected,
            mean: self.mean(),
            stddev: self.stddev(),
            min: self.min(),
            max: self.max(),
            p50: self.quantile(0.50),
            p90: self.quantile(0.90),
            p95: self.quantile(0.95),
            p99: self.quantile(0.99),
            histogram: self.histogram(),
        }
    }

    /// Fixed-format text report. Does not mutate the accumulator.
    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "count  : {}", self.count)?;
        if self.rejected > 0 {
            writeln!(out, "reject : {}", self.rejected)?;
        }
        if self.count == 0 {
            return writeln!(out, "(no samples)");
        }

        let fmt_opt = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{:.3}", v));
        writeln!(out, "mean   : {}", fmt_opt(self.mean()))?;
        writeln!(out, "stddev : {}", fmt_opt(self.stddev()))?;
        writeln!(out, "min    : {}", fmt_opt(self.min()))?;
        writeln!(out, "max    : {}", fmt_opt(self.max()))?;
        for (q, label) in REPORT_QUANTILES {
            writeln!(out, "{:<6} : {}", label, fmt_opt(self.quantile(q)))?;
        }

        let histogram = self.histogram();
        let peak = histogram.iter().map(|b| b.count).max().unwrap_or(1).max(1);
        writeln!(out, "histogram:")?;
        for bucket in &histogram {
            let bar_len = (bucket.count * BAR_WIDTH).div_ceil(peak) as usize;
            let bar_len = if bucket.count == 0 { 0 } else { bar_len };
            writeln!(
                out,
                "  {:>24} {:>8} {}",
                bucket.label(),
                bucket.count,
                "#".repeat(bar_len)
            )?;
        }
        Ok(())
    }
}

/// One histogram bucket. `None` bounds are unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketCount {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub count: u64,
}

impl BucketCount {
    /// Interval label, e.g. `[4, 8)` or `(-inf, 1)`.
    pub fn label(&self) -> String {
        match (self.lower, self.upper) {
            (None, Some(upper)) => format!("(-inf, {})", upper),
            (Some(lower), None) => format!("[{}, +inf)", lower),
            (Some(lower), Some(upper)) => format!("[{}, {})", lower, upper),
            (None, None) => "(-inf, +inf)".to_string(),
        }
    }
}

/// Serializable view of a [`Summary`]; statistics are `None` when empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarySnapshot {
    pub count: u64,
    pub rejected: u64,
    pub mean: Option<f64>,
    pub stddev: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub p50: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub histogram: Vec<BucketCount>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_render_is_well_defined() {
        let summary = Summary::new();
        let text = summary.render();
        assert!(text.contains("count  : 0"));
        assert!(text.contains("(no samples)"));
        assert_eq!(summary.mean(), None);
        assert!(summary.histogram().is_empty());
    }

    #[test]
    fn test_basic_statistics() {
        let mut summary = Summary::new();
        for x in [1.0, 2.0, 3.0, 4.0] {
            summary.add(x);
        }
        assert_eq!(summary.count(), 4);
        assert_eq!(summary.min(), Some(1.0));
        assert_eq!(summary.max(), Some(4.0));
        assert_eq!(summary.mean(), Some(2.5));
        let sd = summary.stddev().unwrap();
        assert!((sd - 1.118_033_988).abs() < 1e-6);
    }

    #[test]
    fn test_mean_survives_sum_overflow() {
        let mut summary = Summary::new();
        summary.add(f64::MAX);
        summary.add(f64::MAX);
        assert!(summary.sum().is_infinite());
        assert_eq!(summary.mean(), Some(f64::MAX));
        assert_eq!(summary.stddev(), Some(0.0));

        let mut mixed = Summary::new();
        for x in [f64::MAX, f64::MAX / 2.0, f64::MAX / 4.0] {
            mixed.add(x);
        }
        let mean = mixed.mean().unwrap();
        assert!(mean.is_finite());
        let expected = f64::MAX / 12.0 * 7.0;
        assert!((mean - expected).abs() <= expected * 1e-12);
    }

    #[test]
    fn test_nan_rejected_negative_accepted() {
        let mut summary = Summary::new();
        summary.add(f64::NAN);
        summary.add(-3.0);
        summary.add(f64::NEG_INFINITY);
        assert_eq!(summary.count(), 1);
        assert_eq!(summary.rejected(), 2);
        assert_eq!(summary.min(), Some(-3.0));
        assert!(summary.render().contains("reject : 2"));
    }

    #[test]
    fn test_bucket_layout() {
        assert_eq!(bucket_index(0.0), 0);
        assert_eq!(bucket_index(-5.0), 0);
        assert_eq!(bucket_index(1.0), 1);
        assert_eq!(bucket_index(1.9), 1);
        assert_eq!(bucket_index(2.0), 2);
        assert_eq!(bucket_index(401.0), 9);
        assert_eq!(bucket_index(1e300), BUCKETS - 1);
        assert_eq!(bucket_bounds(9), (256.0, 512.0));
    }

    #[test]
    fn test_histogram_spans_first_to_last_bucket() {
        let mut summary = Summary::new();
        summary.add(1.0);
        summary.add(5.0);
        let histogram = summary.histogram();
        // [1,2) [2,4) [4,8)
        assert_eq!(histogram.len(), 3);
        assert_eq!(histogram[0].label(), "[1, 2)");
        assert_eq!(histogram[1].count, 0);
        assert_eq!(histogram[2].count, 1);
    }

    #[test]
    fn test_render_lists_percentiles() {
        let mut summary = Summary::new();
        for i in 1..=100 {
            summary.add(i as f64);
        }
        let text = summary.render();
        for label in ["mean", "min", "max", "p50", "p90", "p95", "p99", "histogram:"] {
            assert!(text.contains(label), "missing {label} in\n{text}");
        }
    }

    #[test]
    fn test_snapshot_serializes_empty_as_null() {
        let json = serde_json::to_value(Summary::new().snapshot()).unwrap();
        assert_eq!(json["count"], 0);
        assert!(json["mean"].is_null());
    }

    proptest! {
        #[test]
        fn prop_count_min_max_mean(samples in prop::collection::vec(-1.0e6f64..1.0e6, 1..300)) {
            let mut summary = Summary::new();
            for &x in &samples {
                summary.add(x);
            }
            let _ = summary.render();

            let true_min = samples.iter().cloned().fold(f64::INFINITY, f64::min);
            let true_max = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let true_sum: f64 = samples.iter().sum();

            prop_assert_eq!(summary.count(), samples.len() as u64);
            prop_assert_eq!(summary.min(), Some(true_min));
            prop_assert_eq!(summary.max(), Some(true_max));
            let mean = summary.mean().unwrap();
            let expected = true_sum / samples.len() as f64;
            prop_assert!((mean - expected).abs() <= 1e-6 * expected.abs().max(1.0));
        }

        #[test]
        fn prop_render_is_pure(samples in prop::collection::vec(0.0f64..1000.0, 0..100)) {
            let mut summary = Summary::new();
            for &x in &samples {
                summary.add(x);
            }
            let first = summary.render();
            let second = summary.render();
            prop_assert_eq!(first, second);
            prop_assert_eq!(summary.count(), samples.len() as u64);
        }

        #[test]
        fn prop_quantiles_within_range(samples in prop::collection::vec(0.0f64..500.0, 1..200)) {
            let mut summary = Summary::new();
            for &x in &samples {
                summary.add(x);
            }
            let min = summary.min().unwrap();
            let max = summary.max().unwrap();
            for q in [0.5, 0.9, 0.99] {
                let v = summary.quantile(q).unwrap();
                prop_assert!(v >= min - 1e-9 && v <= max + 1e-9);
            }
        }
    }
}
