//! Configuration for consistency probe runs.
//!
//! - [`probe`]: the `probe.json` document and its defaults
//! - [`resolve`]: where the file comes from (CLI → env → XDG → defaults)
//! - [`validate`]: semantic checks beyond what serde enforces
//! - [`load_config`]: the three stitched together, with provenance

pub mod probe;
pub mod resolve;
pub mod validate;

pub use probe::{ProbeConfig, ServerConfig, StoreConfig, VisibilityConfig, VisibilityMode};
pub use resolve::{resolve_config_path, ConfigSource};
pub use validate::{validate_config, ValidationError};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Invalid JSON in config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Semantic validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("I/O error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

/// Configuration resolution options.
#[derive(Debug, Default, Clone)]
pub struct ConfigOptions {
    /// Explicit config directory (looked up for `probe.json`).
    pub config_dir: Option<PathBuf>,
    /// Explicit config file path (highest priority).
    pub config_path: Option<PathBuf>,
}

/// Resolved configuration with provenance information.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub probe: ProbeConfig,
    /// Path the configuration was read from (None if using defaults).
    pub path: Option<PathBuf>,
    /// SHA-256 of the file content (None if using defaults).
    pub hash: Option<String>,
    pub source: ConfigSource,
}

impl ResolvedConfig {
    /// Provenance summary for `config show` and JSON reports.
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            path: self.path.clone(),
            hash: self.hash.clone(),
            source: self.source.to_string(),
            schema_version: self.probe.schema_version.clone(),
        }
    }
}

/// Config provenance for reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub path: Option<PathBuf>,
    pub hash: Option<String>,
    pub source: String,
    pub schema_version: String,
}

/// Load configuration with the standard resolution order, then validate it.
pub fn load_config(options: &ConfigOptions) -> Result<ResolvedConfig, ConfigError> {
    let (path, source) = resolve_config_path(options);

    let resolved = match path {
        Some(path) => {
            let (probe, hash) = load_probe_config_from_file(&path)?;
            ResolvedConfig {
                probe,
                path: Some(path),
                hash: Some(hash),
                source,
            }
        }
        None => ResolvedConfig {
            probe: ProbeConfig::default(),
            path: None,
            hash: None,
            source,
        },
    };

    validate_config(&resolved.probe)?;
    Ok(resolved)
}

/// Load and parse a specific config file, returning it with its content hash.
///
/// Semantic validation is left to the caller.
pub fn load_probe_config_from_file(path: &Path) -> Result<(ProbeConfig, String), ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::IoError {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;

    let hash = compute_hash(&content);

    let probe: ProbeConfig =
        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

    if probe.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(ConfigError::VersionMismatch {
            expected: CONFIG_SCHEMA_VERSION.to_string(),
            actual: probe.schema_version.clone(),
        });
    }

    Ok((probe, hash))
}

/// SHA-256 of the config content, hex encoded.
fn compute_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
