//! Where the log filter and format come from.
//!
//! Precedence, highest first:
//! 1. `-q` / `-v` on the command line
//! 2. `CP_LOG` (a single level: `trace` .. `error`, or `off`)
//! 3. `RUST_LOG` (full `EnvFilter` directives, passed through untouched)
//! 4. `info`
//!
//! The format is `--log-format`, else `CP_LOG_FORMAT`, else human.

use tracing_subscriber::filter::LevelFilter;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Human,
    /// One JSON object per line.
    Jsonl,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" => Ok(LogFormat::Human),
            "jsonl" | "json" => Ok(LogFormat::Jsonl),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Single global level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "off" => Ok(LogLevel::Off),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Off => LevelFilter::OFF,
        }
    }
}

/// What the subscriber filters on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFilter {
    Level(LogLevel),
    /// Raw `RUST_LOG` directives.
    Directives(String),
}

impl Default for LogFilter {
    fn default() -> Self {
        LogFilter::Level(LogLevel::default())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    pub filter: LogFilter,
}

impl LogConfig {
    /// Resolve from the process environment and CLI flags.
    pub fn from_env(cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self {
        Self::resolve(|name| std::env::var(name).ok(), cli_level, cli_format)
    }

    /// Resolve with an explicit variable lookup. Unparseable `CP_LOG` and
    /// `CP_LOG_FORMAT` values are ignored.
    pub fn resolve<F>(var: F, cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_level = var("CP_LOG").and_then(|v| v.parse::<LogLevel>().ok());
        let filter = match cli_level.or(env_level) {
            Some(level) => LogFilter::Level(level),
            None => var("RUST_LOG")
                .filter(|v| !v.trim().is_empty())
                .map(LogFilter::Directives)
                .unwrap_or_default(),
        };

        let format = cli_format
            .or_else(|| var("CP_LOG_FORMAT").and_then(|v| v.parse().ok()))
            .unwrap_or_default();

        LogConfig { format, filter }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.filter = LogFilter::Level(level);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = LogConfig::resolve(env(&[]), None, None);
        assert_eq!(config, LogConfig::default());
        assert_eq!(config.filter, LogFilter::Level(LogLevel::Info));
    }

    #[test]
    fn test_rust_log_directives_pass_through() {
        let config = LogConfig::resolve(env(&[("RUST_LOG", "cp_core=debug,warn")]), None, None);
        assert_eq!(
            config.filter,
            LogFilter::Directives("cp_core=debug,warn".to_string())
        );
    }

    #[test]
    fn test_cp_log_beats_rust_log() {
        let config = LogConfig::resolve(
            env(&[("CP_LOG", "error"), ("RUST_LOG", "trace")]),
            None,
            None,
        );
        assert_eq!(config.filter, LogFilter::Level(LogLevel::Error));
    }

    #[test]
    fn test_cli_level_beats_everything() {
        let config = LogConfig::resolve(
            env(&[("CP_LOG", "trace"), ("RUST_LOG", "trace")]),
            Some(LogLevel::Error),
            None,
        );
        assert_eq!(config.filter, LogFilter::Level(LogLevel::Error));
    }

    #[test]
    fn test_bad_cp_log_falls_through() {
        let config = LogConfig::resolve(
            env(&[("CP_LOG", "loud"), ("RUST_LOG", "debug")]),
            None,
            None,
        );
        assert_eq!(config.filter, LogFilter::Directives("debug".to_string()));
    }

    #[test]
    fn test_format_resolution() {
        let from_env = LogConfig::resolve(env(&[("CP_LOG_FORMAT", "json")]), None, None);
        assert_eq!(from_env.format, LogFormat::Jsonl);

        let from_cli = LogConfig::resolve(
            env(&[("CP_LOG_FORMAT", "jsonl")]),
            None,
            Some(LogFormat::Human),
        );
        assert_eq!(from_cli.format, LogFormat::Human);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
