//! Structured event definitions for logging.
//!
//! Events follow a consistent schema for machine-parseable JSONL output.
//! All events include correlation IDs (run_id, host_id) and stage.

use serde::{Deserialize, Serialize};

/// Log levels for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Phases of a cp-core invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and configuration.
    Init,
    /// Ancestor creation before the first trial.
    Setup,
    /// Trial record upserts.
    Write,
    /// Read attempts until the write is observed.
    Poll,
    /// Rendering results.
    Report,
    /// Entity counts and kind statistics.
    Inspect,
    /// HTTP request handling.
    Serve,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Setup => "setup",
            Stage::Write => "write",
            Stage::Poll => "poll",
            Stage::Report => "report",
            Stage::Inspect => "inspect",
            Stage::Serve => "serve",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";
    pub const RUN_ABORTED: &str = "run.aborted";

    // Setup stage
    pub const ANCESTOR_CREATED: &str = "setup.ancestor_created";
    pub const ANCESTOR_FAILED: &str = "setup.ancestor_failed";

    // Write stage
    pub const WRITE_FAILED: &str = "write.failed";

    // Poll stage
    pub const POLL_UNEXPECTED: &str = "poll.unexpected_result";
    pub const TRIAL_RECORDED: &str = "poll.trial_recorded";
    pub const TRIAL_EXHAUSTED: &str = "poll.trial_exhausted";

    // Inspect stage
    pub const COUNT_PAGE: &str = "inspect.count_page";
    pub const COUNT_FINISHED: &str = "inspect.count_finished";
    pub const STAT_MISSING: &str = "inspect.stat_missing";

    // Serve stage
    pub const SERVER_STARTED: &str = "serve.started";
    pub const SERVER_REQUEST: &str = "serve.request";
    pub const SERVER_ERROR: &str = "serve.error";

    // Config/init events
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_ERROR: &str = "config.error";
}

/// Correlation IDs shared by every event of one invocation.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub run_id: String,
    pub host_id: String,
    /// Set once a probe run has picked its prefix.
    pub run_prefix: Option<String>,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            host_id: host_id.into(),
            run_prefix: None,
        }
    }

    pub fn with_run_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.run_prefix = Some(prefix.into());
        self
    }
}
