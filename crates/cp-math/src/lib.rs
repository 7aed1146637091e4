//! Consistency probe math utilities.
//!
//! - [`TDigest`]: bounded-memory quantile sketch
//! - [`Summary`]: online accumulator (count, mean, min, max, percentiles,
//!   log2 bucket histogram) with a fixed-format text report

pub mod sketch;
pub mod summary;

pub use sketch::{SketchError, TDigest};
pub use summary::{BucketCount, Summary, SummarySnapshot};
