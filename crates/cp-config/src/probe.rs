//! The `probe.json` document.
//!
//! Every field has a default so partial files are accepted; only
//! `schema_version` is checked strictly.

use serde::{Deserialize, Serialize};

use crate::CONFIG_SCHEMA_VERSION;

/// Trials per run when nothing else is configured.
pub const DEFAULT_TRIAL_COUNT: u32 = 100;
/// Fixed sleep between poll attempts.
pub const DEFAULT_ATTEMPT_DELAY_MS: u64 = 5;
/// Attempt ceiling per trial.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 400;
/// Entity kind written by probe trials.
pub const DEFAULT_KIND: &str = "testkind";

fn default_schema_version() -> String {
    CONFIG_SCHEMA_VERSION.to_string()
}

fn default_kind() -> String {
    DEFAULT_KIND.to_string()
}

fn default_trial_count() -> u32 {
    DEFAULT_TRIAL_COUNT
}

fn default_attempt_delay_ms() -> u64 {
    DEFAULT_ATTEMPT_DELAY_MS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

/// Top-level probe configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    /// Entity kind written and queried by trials.
    #[serde(default = "default_kind")]
    pub kind: String,

    #[serde(default = "default_trial_count")]
    pub trial_count: u32,

    #[serde(default = "default_attempt_delay_ms")]
    pub attempt_delay_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            schema_version: default_schema_version(),
            kind: default_kind(),
            trial_count: DEFAULT_TRIAL_COUNT,
            attempt_delay_ms: DEFAULT_ATTEMPT_DELAY_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            store: StoreConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Settings for the built-in simulated store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub visibility: VisibilityConfig,

    /// Ancestor-scoped queries see writes immediately.
    #[serde(default = "default_true")]
    pub ancestor_consistent: bool,
}

fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            visibility: VisibilityConfig::default(),
            ancestor_consistent: true,
        }
    }
}

/// When a write becomes visible to eventually-consistent reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityMode {
    /// Strongly consistent.
    #[default]
    Immediate,
    /// Visible on the N-th read that targets the record.
    AfterReads,
    /// Visible once N milliseconds have passed since the write.
    AfterMillis,
    /// Never visible (exercises the attempt ceiling).
    Never,
}

impl std::fmt::Display for VisibilityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VisibilityMode::Immediate => write!(f, "immediate"),
            VisibilityMode::AfterReads => write!(f, "after_reads"),
            VisibilityMode::AfterMillis => write!(f, "after_millis"),
            VisibilityMode::Never => write!(f, "never"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VisibilityConfig {
    #[serde(default)]
    pub mode: VisibilityMode,
    /// Used by `after_reads`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reads: Option<u32>,
    /// Used by `after_millis`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub millis: Option<u64>,
}

/// Bind settings for `cp-core serve`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_experiment() {
        let config = ProbeConfig::default();
        assert_eq!(config.trial_count, 100);
        assert_eq!(config.attempt_delay_ms, 5);
        assert_eq!(config.max_attempts, 400);
        assert_eq!(config.kind, "testkind");
        assert_eq!(config.store.visibility.mode, VisibilityMode::Immediate);
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: ProbeConfig =
            serde_json::from_str(r#"{"trial_count": 5, "store": {"visibility": {"mode": "after_reads", "reads": 3}}}"#)
                .unwrap();
        assert_eq!(config.trial_count, 5);
        assert_eq!(config.max_attempts, 400);
        assert_eq!(config.store.visibility.reads, Some(3));
        assert!(config.store.ancestor_consistent);
        assert_eq!(config.schema_version, CONFIG_SCHEMA_VERSION);
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let parsed: Result<ProbeConfig, _> =
            serde_json::from_str(r#"{"store": {"visibility": {"mode": "sometimes"}}}"#);
        assert!(parsed.is_err());
    }
}
