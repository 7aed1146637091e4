//! Error types for the consistency probe.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for automation
//! - Remediation suggestions for humans
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Probe Run Aborted
//!   Reason: read failed during polling: backend unavailable
//!   Fix: The storage API itself is failing; check the backend before re-running.
//! ```
//!
//! # Agent-Facing Output
//!
//! ```json
//! {
//!   "code": 31,
//!   "category": "probe",
//!   "message": "read failed during polling: backend unavailable",
//!   "recoverable": false,
//!   "suggested_action": "abort"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for consistency probe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration file and argument errors.
    Config,
    /// Storage collaborator failures.
    Storage,
    /// Probe run failures (fatal, run aborted).
    Probe,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Storage => write!(f, "storage"),
            ErrorCategory::Probe => write!(f, "probe"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Suggested actions for automation reacting to an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Retry the operation.
    Retry,
    /// Reset configuration to defaults.
    ResetConfig,
    /// Run the config validation command.
    RunCheck,
    /// Abort; the run cannot continue.
    Abort,
    /// Manual intervention required.
    ManualIntervention,
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestedAction::Retry => write!(f, "retry"),
            SuggestedAction::ResetConfig => write!(f, "reset_config"),
            SuggestedAction::RunCheck => write!(f, "run_check"),
            SuggestedAction::Abort => write!(f, "abort"),
            SuggestedAction::ManualIntervention => write!(f, "manual_intervention"),
        }
    }
}

/// Unified error type for the consistency probe.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid probe configuration: {0}")]
    InvalidConfig(String),

    #[error("schema version mismatch: expected {expected}, got {actual}")]
    SchemaVersion { expected: String, actual: String },

    // Storage errors (20-29)
    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("no statistics for kind {kind}")]
    NoKindStats { kind: String },

    // Probe errors (30-39)
    #[error("ancestor record could not be created: {0}")]
    AncestorCreate(String),

    #[error("read failed during polling: {0}")]
    ProbeRead(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Storage errors
    /// - 30-39: Probe errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidConfig(_) => 11,
            Error::SchemaVersion { .. } => 12,
            Error::Storage(_) => 20,
            Error::InvalidQuery(_) => 21,
            Error::NoKindStats { .. } => 22,
            Error::AncestorCreate(_) => 30,
            Error::ProbeRead(_) => 31,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidConfig(_) | Error::SchemaVersion { .. } => {
                ErrorCategory::Config
            }
            Error::Storage(_) | Error::InvalidQuery(_) | Error::NoKindStats { .. } => {
                ErrorCategory::Storage
            }
            Error::AncestorCreate(_) | Error::ProbeRead(_) => ErrorCategory::Probe,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether this error is potentially recoverable by retrying or
    /// fixing configuration.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Config(_) => true,
            Error::InvalidConfig(_) => true,
            Error::SchemaVersion { .. } => true,

            Error::Storage(_) => true,
            // A malformed query fails the same way every time
            Error::InvalidQuery(_) => false,
            Error::NoKindStats { .. } => true, // statistics are computed lazily by some backends

            Error::AncestorCreate(_) => true,
            Error::ProbeRead(_) => false,

            Error::Io(_) => true,
            Error::Json(_) => false,
        }
    }

    /// Returns the suggested action for automation.
    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            Error::Config(_) => SuggestedAction::RunCheck,
            Error::InvalidConfig(_) => SuggestedAction::RunCheck,
            Error::SchemaVersion { .. } => SuggestedAction::ResetConfig,

            Error::Storage(_) => SuggestedAction::Retry,
            Error::InvalidQuery(_) => SuggestedAction::Abort,
            Error::NoKindStats { .. } => SuggestedAction::Retry,

            Error::AncestorCreate(_) => SuggestedAction::Retry,
            Error::ProbeRead(_) => SuggestedAction::Abort,

            Error::Io(_) => SuggestedAction::Retry,
            Error::Json(_) => SuggestedAction::ManualIntervention,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => {
                "Run 'cp-core config validate' to check the configuration file."
            }
            Error::InvalidConfig(_) => {
                "Fix the reported field in probe.json or pass a corrected CLI flag."
            }
            Error::SchemaVersion { .. } => {
                "Regenerate probe.json with 'cp-core config show --format json' and re-apply your edits."
            }

            Error::Storage(_) => {
                "The storage backend rejected the request. Retry, and check backend health if it persists."
            }
            Error::InvalidQuery(_) => {
                "The read query is malformed. This is a bug in the probe, not replication lag."
            }
            Error::NoKindStats { .. } => {
                "Kind statistics may not be computed yet. Write some entities and retry later."
            }

            Error::AncestorCreate(_) => {
                "The run could not write its ancestor record. Check write access to the store and retry."
            }
            Error::ProbeRead(_) => {
                "The storage API itself is failing; check the backend before re-running."
            }

            Error::Io(_) => "Check permissions and that the target paths exist. Retry the operation.",
            Error::Json(_) => {
                "Invalid JSON. Check syntax with 'cat <file> | jq .' or restore from backup."
            }
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::InvalidConfig(_) => "Invalid Configuration",
            Error::SchemaVersion { .. } => "Schema Version Mismatch",

            Error::Storage(_) => "Storage Error",
            Error::InvalidQuery(_) => "Invalid Query",
            Error::NoKindStats { .. } => "Kind Statistics Unavailable",

            Error::AncestorCreate(_) => "Probe Run Aborted",
            Error::ProbeRead(_) => "Probe Run Aborted",

            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Suggested action for automation.
    pub suggested_action: SuggestedAction,

    /// Additional structured context (e.g. kind, expected version).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::SchemaVersion { expected, actual } => {
                context.insert("expected".to_string(), serde_json::json!(expected));
                context.insert("actual".to_string(), serde_json::json!(actual));
            }
            Error::NoKindStats { kind } => {
                context.insert("kind".to_string(), serde_json::json!(kind));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            suggested_action: err.suggested_action(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }

    /// Serialize to pretty JSON string.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.to_json())
    }
}

/// Format an error for human-readable stderr output.
///
/// Output format:
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        red = red,
        cyan = cyan,
        reset = reset,
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(Error::Config("test".into()).code(), 10);
        assert_eq!(Error::InvalidQuery("bad".into()).code(), 21);
        assert_eq!(Error::ProbeRead("down".into()).code(), 31);
    }

    #[test]
    fn test_error_category() {
        assert_eq!(Error::Config("test".into()).category(), ErrorCategory::Config);
        assert_eq!(
            Error::NoKindStats { kind: "testkind".into() }.category(),
            ErrorCategory::Storage
        );
        assert_eq!(Error::AncestorCreate("x".into()).category(), ErrorCategory::Probe);
    }

    #[test]
    fn test_error_recoverable() {
        assert!(Error::Storage("busy".into()).is_recoverable());
        assert!(!Error::InvalidQuery("bad".into()).is_recoverable());
        assert!(!Error::ProbeRead("down".into()).is_recoverable());
    }

    #[test]
    fn test_suggested_action() {
        assert_eq!(
            Error::ProbeRead("down".into()).suggested_action(),
            SuggestedAction::Abort
        );
        assert_eq!(
            Error::SchemaVersion {
                expected: "1.0.0".into(),
                actual: "0.9.0".into()
            }
            .suggested_action(),
            SuggestedAction::ResetConfig
        );
    }

    #[test]
    fn test_structured_error_from_error() {
        let err = Error::NoKindStats {
            kind: "testkind".into(),
        };
        let structured = StructuredError::from(&err);

        assert_eq!(structured.code, 22);
        assert_eq!(structured.category, ErrorCategory::Storage);
        assert!(structured.recoverable);
        assert_eq!(
            structured.context.get("kind"),
            Some(&serde_json::json!("testkind"))
        );
    }

    #[test]
    fn test_structured_error_json() {
        let err = Error::ProbeRead("backend unavailable".into());
        let json = StructuredError::from(&err).to_json();

        assert!(json.contains(r#""code":31"#));
        assert!(json.contains(r#""category":"probe""#));
        assert!(json.contains(r#""recoverable":false"#));
        assert!(json.contains(r#""suggested_action":"abort""#));
    }

    #[test]
    fn test_format_error_human() {
        let err = Error::AncestorCreate("quota exceeded".into());
        let formatted = format_error_human(&err, false);

        assert!(formatted.contains("Probe Run Aborted"));
        assert!(formatted.contains("quota exceeded"));
        assert!(formatted.contains("Fix:"));
    }

    #[test]
    fn test_display_enums() {
        assert_eq!(ErrorCategory::Storage.to_string(), "storage");
        assert_eq!(SuggestedAction::RunCheck.to_string(), "run_check");
    }
}
