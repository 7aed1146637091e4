//! Configuration path discovery.
//!
//! Resolution order: CLI file → CLI directory → environment → XDG → defaults.

use std::path::{Path, PathBuf};

use crate::ConfigOptions;

/// Where a configuration file was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicit `--config` file.
    CliArgument,
    /// `--config-dir` directory.
    CliDirectory,
    /// `CP_CONFIG_DIR` environment variable.
    Environment,
    /// `$XDG_CONFIG_HOME/consistency_probe/`.
    XdgConfig,
    /// Built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::CliDirectory => write!(f, "CLI directory"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Environment variable naming a config directory.
pub const ENV_CONFIG_DIR: &str = "CP_CONFIG_DIR";

/// Standard config file name.
pub const CONFIG_FILENAME: &str = "probe.json";

/// Application directory name under the XDG config home.
const APP_NAME: &str = "consistency_probe";

/// Find the config file to load.
///
/// An explicit file is returned even if it does not exist so that the
/// loader can report it; directories are only used when they contain
/// `probe.json`.
pub fn resolve_config_path(options: &ConfigOptions) -> (Option<PathBuf>, ConfigSource) {
    if let Some(path) = &options.config_path {
        return (Some(path.clone()), ConfigSource::CliArgument);
    }

    if let Some(dir) = &options.config_dir {
        return match existing(dir.join(CONFIG_FILENAME)) {
            Some(path) => (Some(path), ConfigSource::CliDirectory),
            None => (None, ConfigSource::BuiltinDefault),
        };
    }

    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        if let Some(path) = existing(Path::new(&dir).join(CONFIG_FILENAME)) {
            return (Some(path), ConfigSource::Environment);
        }
    }

    if let Some(path) = existing(xdg_config_dir().join(CONFIG_FILENAME)) {
        return (Some(path), ConfigSource::XdgConfig);
    }

    (None, ConfigSource::BuiltinDefault)
}

/// `$XDG_CONFIG_HOME/consistency_probe`, falling back to `~/.config`.
pub fn xdg_config_dir() -> PathBuf {
    let xdg_config = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
        });
    xdg_config.join(APP_NAME)
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    path.is_file().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_file_wins() {
        let options = ConfigOptions {
            config_dir: Some(PathBuf::from("/tmp")),
            config_path: Some(PathBuf::from("/etc/probe.json")),
        };
        let (path, source) = resolve_config_path(&options);
        assert_eq!(path, Some(PathBuf::from("/etc/probe.json")));
        assert_eq!(source, ConfigSource::CliArgument);
    }

    #[test]
    fn test_empty_directory_means_defaults() {
        let dir = std::env::temp_dir().join("cp-config-test-nonexistent-dir");
        let options = ConfigOptions {
            config_dir: Some(dir),
            config_path: None,
        };
        let (path, source) = resolve_config_path(&options);
        assert_eq!(path, None);
        assert_eq!(source, ConfigSource::BuiltinDefault);
    }

    #[test]
    fn test_source_display() {
        assert_eq!(ConfigSource::XdgConfig.to_string(), "XDG config");
        assert_eq!(ConfigSource::default().to_string(), "builtin default");
    }
}
