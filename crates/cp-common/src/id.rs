//! Run identity types.
//!
//! Every probe run writes its entities under a run prefix so that repeated or
//! concurrent runs against the same store never collide.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp-derived namespace for one probe run.
///
/// Format: `YYYY-MM-DD HH:MM:SS.ffffff ` (microsecond resolution, trailing space)
/// Example: `2026-01-15 14:30:22.123456 `
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunPrefix(String);

impl RunPrefix {
    /// Generate a prefix from the current wall clock.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Generate a prefix from a fixed timestamp.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        RunPrefix(at.format("%Y-%m-%d %H:%M:%S%.6f ").to_string())
    }

    /// Use an arbitrary string as the prefix (tests, replays).
    pub fn from_raw(prefix: impl Into<String>) -> Self {
        RunPrefix(prefix.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the record written by trial `index`.
    pub fn record_name(&self, index: u32) -> String {
        format!("{}name{}", self.0, index)
    }

    /// Value expected back from the record written by trial `index`.
    pub fn record_value(&self, index: u32) -> String {
        format!("{}value{}", self.0, index)
    }

    /// Name of the run's ancestor record.
    pub fn root_name(&self) -> String {
        format!("{}name-root", self.0)
    }
}

impl fmt::Display for RunPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
