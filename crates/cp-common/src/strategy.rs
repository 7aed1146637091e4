//! Read strategies used to observe a freshly written record.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// How a probe run polls for the record it just wrote.
///
/// The strategy is fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadStrategy {
    /// Direct get by the key returned from the write.
    LookupByKey,
    /// Equality filter on the indexed `name` property.
    IndexedQuery,
    /// Same filter, returning only the `value` and `updated_at` properties.
    ProjectionQuery,
    /// Same filter, scoped to descendants of the run's ancestor record.
    AncestorQuery,
}

impl ReadStrategy {
    /// All strategies, in route order.
    pub const ALL: [ReadStrategy; 4] = [
        ReadStrategy::LookupByKey,
        ReadStrategy::IndexedQuery,
        ReadStrategy::ProjectionQuery,
        ReadStrategy::AncestorQuery,
    ];

    /// Stable kebab-case name used in routes, logs, and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadStrategy::LookupByKey => "lookup-by-key",
            ReadStrategy::IndexedQuery => "indexed-query",
            ReadStrategy::ProjectionQuery => "projection-query",
            ReadStrategy::AncestorQuery => "ancestor-query",
        }
    }

    /// Whether trial records are written under a per-run ancestor.
    pub fn needs_ancestor(&self) -> bool {
        matches!(self, ReadStrategy::AncestorQuery)
    }
}

impl std::fmt::Display for ReadStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReadStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReadStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| format!("unknown read strategy: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_names() {
        for strategy in ReadStrategy::ALL {
            assert_eq!(strategy.as_str().parse::<ReadStrategy>().unwrap(), strategy);
        }
    }

    #[test]
    fn test_only_ancestor_query_needs_ancestor() {
        let needing: Vec<_> = ReadStrategy::ALL
            .into_iter()
            .filter(|s| s.needs_ancestor())
            .collect();
        assert_eq!(needing, vec![ReadStrategy::AncestorQuery]);
    }

    #[test]
    fn test_serde_uses_kebab_case() {
        assert_eq!(
            serde_json::to_string(&ReadStrategy::ProjectionQuery).unwrap(),
            "\"projection-query\""
        );
    }

    #[test]
    fn test_unknown_strategy() {
        assert!("by-ancestor".parse::<ReadStrategy>().is_err());
    }
}
