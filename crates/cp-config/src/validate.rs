//! Semantic validation of probe configuration.

use thiserror::Error;

use crate::probe::{ProbeConfig, VisibilityMode};
use crate::CONFIG_SCHEMA_VERSION;

/// Upper bound on the per-attempt delay; anything larger is almost
/// certainly a unit mistake (seconds given as milliseconds).
pub const MAX_ATTEMPT_DELAY_MS: u64 = 60_000;

/// Upper bound on the attempt ceiling.
pub const MAX_ATTEMPTS_LIMIT: u32 = 1_000_000;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::MissingField(_) => 64,
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::VersionMismatch { .. } => 66,
        }
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Validate a probe configuration.
pub fn validate_config(config: &ProbeConfig) -> ValidationResult<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    if config.kind.trim().is_empty() {
        return Err(invalid("kind", "must not be empty"));
    }
    if config.trial_count == 0 {
        return Err(invalid("trial_count", "must be at least 1"));
    }
    if config.max_attempts == 0 {
        return Err(invalid("max_attempts", "must be at least 1"));
    }
    if config.max_attempts > MAX_ATTEMPTS_LIMIT {
        return Err(invalid(
            "max_attempts",
            format!(
                "must be at most {}, got {}",
                MAX_ATTEMPTS_LIMIT, config.max_attempts
            ),
        ));
    }
    if config.attempt_delay_ms > MAX_ATTEMPT_DELAY_MS {
        return Err(invalid(
            "attempt_delay_ms",
            format!(
                "must be at most {}, got {}",
                MAX_ATTEMPT_DELAY_MS, config.attempt_delay_ms
            ),
        ));
    }

    let visibility = &config.store.visibility;
    match visibility.mode {
        VisibilityMode::AfterReads => match visibility.reads {
            None => {
                return Err(ValidationError::MissingField(
                    "store.visibility.reads".to_string(),
                ))
            }
            Some(0) => return Err(invalid("store.visibility.reads", "must be at least 1")),
            Some(_) => {}
        },
        VisibilityMode::AfterMillis => {
            if visibility.millis.is_none() {
                return Err(ValidationError::MissingField(
                    "store.visibility.millis".to_string(),
                ));
            }
        }
        VisibilityMode::Immediate | VisibilityMode::Never => {}
    }

    if config.server.port == 0 {
        return Err(invalid("server.port", "must be non-zero"));
    }
    if config.server.bind.trim().is_empty() {
        return Err(invalid("server.bind", "must not be empty"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::VisibilityConfig;

    #[test]
    fn test_default_is_valid() {
        assert!(validate_config(&ProbeConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_trials_rejected() {
        let config = ProbeConfig {
            trial_count: 0,
            ..ProbeConfig::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert_eq!(err.code(), 65);
        assert!(err.to_string().contains("trial_count"));
    }

    #[test]
    fn test_zero_max_attempts_rejected() {
        let config = ProbeConfig {
            max_attempts: 0,
            ..ProbeConfig::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_attempt_ceiling_is_bounded() {
        for max_attempts in [MAX_ATTEMPTS_LIMIT + 1, u32::MAX] {
            let config = ProbeConfig {
                max_attempts,
                ..ProbeConfig::default()
            };
            let err = validate_config(&config).unwrap_err();
            assert!(err.to_string().contains("max_attempts"));
        }
        let at_limit = ProbeConfig {
            max_attempts: MAX_ATTEMPTS_LIMIT,
            ..ProbeConfig::default()
        };
        assert!(validate_config(&at_limit).is_ok());
    }

    #[test]
    fn test_excessive_delay_rejected() {
        let config = ProbeConfig {
            attempt_delay_ms: MAX_ATTEMPT_DELAY_MS + 1,
            ..ProbeConfig::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_after_reads_needs_reads() {
        let mut config = ProbeConfig::default();
        config.store.visibility = VisibilityConfig {
            mode: VisibilityMode::AfterReads,
            reads: None,
            millis: None,
        };
        assert_eq!(
            validate_config(&config),
            Err(ValidationError::MissingField(
                "store.visibility.reads".to_string()
            ))
        );

        config.store.visibility.reads = Some(0);
        assert!(validate_config(&config).is_err());

        config.store.visibility.reads = Some(3);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_version_mismatch() {
        let config = ProbeConfig {
            schema_version: "0.9.0".to_string(),
            ..ProbeConfig::default()
        };
        assert!(matches!(
            validate_config(&config),
            Err(ValidationError::VersionMismatch { .. })
        ));
    }
}
