//! Exit codes for the cp-core CLI.
//!
//! Exit code ranges:
//! - 0-2: run outcomes (parse outcome from code, not output)
//! - 10-19: user/environment errors (recoverable by user action)
//! - 20-29: run failures and internal errors

use crate::probe::ProbeResult;

/// Exit codes for cp-core operations.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Run Outcomes (0-2)
    // ========================================================================
    /// Every trial observed its write before the attempt ceiling.
    Clean = 0,

    /// At least one trial hit the attempt ceiling.
    TrialsExhausted = 1,

    /// At least one trial was skipped because its write failed.
    TrialsSkipped = 2,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments
    ArgsError = 10,

    /// Configuration could not be loaded or failed validation
    ConfigError = 11,

    // ========================================================================
    // Failures (20-29)
    // ========================================================================
    /// Run aborted by a fatal storage error
    StorageError = 20,

    /// I/O error
    IoError = 21,

    /// Internal error (bug - please report)
    InternalError = 22,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Exit code summarizing a completed run. Skipped trials outrank
    /// exhausted ones since they leave a hole in the samples.
    pub fn for_result(result: &ProbeResult) -> Self {
        if result.skipped > 0 {
            ExitCode::TrialsSkipped
        } else if result.exhausted > 0 {
            ExitCode::TrialsExhausted
        } else {
            ExitCode::Clean
        }
    }

    /// Map a unified error to its exit code.
    pub fn for_error(err: &cp_common::Error) -> Self {
        use cp_common::error::ErrorCategory;
        match err.category() {
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::Storage | ErrorCategory::Probe => ExitCode::StorageError,
            ErrorCategory::Io => ExitCode::IoError,
        }
    }

    /// Check if the run completed (codes 0-2). Exhausted or skipped trials
    /// are outcomes, not errors.
    pub fn is_success(self) -> bool {
        (self as i32) < 10
    }

    /// Check if this exit code is a user/environment error (codes 10-19).
    pub fn is_user_error(self) -> bool {
        let code = self as i32;
        (10..20).contains(&code)
    }

    /// Check if this exit code indicates any error requiring attention.
    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Get the code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::TrialsExhausted => "OK_EXHAUSTED",
            ExitCode::TrialsSkipped => "OK_SKIPPED",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::StorageError => "ERR_STORAGE",
            ExitCode::IoError => "ERR_IO",
            ExitCode::InternalError => "ERR_INTERNAL",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges() {
        assert!(ExitCode::Clean.is_success());
        assert!(ExitCode::TrialsExhausted.is_success());
        assert!(ExitCode::TrialsSkipped.is_success());
        assert!(ExitCode::ConfigError.is_user_error());
        assert!(ExitCode::StorageError.is_error());
        assert!(!ExitCode::StorageError.is_user_error());
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitCode::StorageError.to_string(), "ERR_STORAGE (20)");
        assert_eq!(i32::from(ExitCode::TrialsSkipped), 2);
    }

    #[test]
    fn test_for_error() {
        assert_eq!(
            ExitCode::for_error(&cp_common::Error::ProbeRead("down".into())),
            ExitCode::StorageError
        );
        assert_eq!(
            ExitCode::for_error(&cp_common::Error::InvalidConfig("bad".into())),
            ExitCode::ConfigError
        );
    }
}
