//! Output format specifications.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Supported output formats for probe, count, and stat reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Summary blocks wrapped in a minimal `<html><pre>` envelope (default)
    #[default]
    Html,

    /// Human-readable Markdown
    Md,

    /// Structured JSON for machine consumption
    Json,

    /// One-line summary for quick status checks
    Summary,
}

impl OutputFormat {
    /// Content type used when the report is served over HTTP.
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Html => "text/html; charset=utf-8",
            OutputFormat::Md => "text/markdown; charset=utf-8",
            OutputFormat::Json => "application/json",
            OutputFormat::Summary => "text/plain; charset=utf-8",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Html => write!(f, "html"),
            OutputFormat::Md => write!(f, "md"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Summary => write!(f, "summary"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "html" => Ok(OutputFormat::Html),
            "md" | "markdown" => Ok(OutputFormat::Md),
            "json" => Ok(OutputFormat::Json),
            "summary" => Ok(OutputFormat::Summary),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_html() {
        assert_eq!(OutputFormat::default(), OutputFormat::Html);
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("markdown".parse::<OutputFormat>().unwrap(), OutputFormat::Md);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("toon".parse::<OutputFormat>().is_err());
    }
}
