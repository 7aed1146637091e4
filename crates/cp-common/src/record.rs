//! The record shape written by probe trials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::RunPrefix;

/// Property names as stored in the datastore.
pub mod fields {
    pub const NAME: &str = "name";
    pub const VALUE: &str = "value";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";
}

/// Entity under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeRecord {
    pub name: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProbeRecord {
    /// Build the record for trial `index` of a run.
    pub fn for_trial(prefix: &RunPrefix, index: u32, now: DateTime<Utc>) -> Self {
        ProbeRecord {
            name: prefix.record_name(index),
            value: prefix.record_value(index),
            created_at: now,
            updated_at: now,
        }
    }

    /// Build the run's ancestor record. Its value is always empty.
    pub fn ancestor(prefix: &RunPrefix, now: DateTime<Utc>) -> Self {
        ProbeRecord {
            name: prefix.root_name(),
            value: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trial_record_is_deterministic() {
        let prefix = RunPrefix::from_raw("run ");
        let now = Utc::now();
        let a = ProbeRecord::for_trial(&prefix, 3, now);
        let b = ProbeRecord::for_trial(&prefix, 3, now);
        assert_eq!(a, b);
        assert_eq!(a.name, "run name3");
        assert_eq!(a.value, "run value3");
    }

    #[test]
    fn test_ancestor_has_empty_value() {
        let prefix = RunPrefix::from_raw("run ");
        let root = ProbeRecord::ancestor(&prefix, Utc::now());
        assert_eq!(root.name, "run name-root");
        assert!(root.value.is_empty());
    }
}
