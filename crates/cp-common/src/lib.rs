//! Consistency probe common types and errors.
//!
//! This crate provides foundational types shared across cp-core modules:
//! - Read strategies selectable for a probe run
//! - Run prefixes and the deterministic entity names derived from them
//! - The probe record shape written by every trial
//! - Common error types
//! - Output format specifications

pub mod error;
pub mod id;
pub mod output;
pub mod record;
pub mod strategy;

pub use error::{Error, Result};
pub use id::RunPrefix;
pub use output::OutputFormat;
pub use record::ProbeRecord;
pub use strategy::ReadStrategy;

/// Schema version stamped into JSON payloads.
pub const SCHEMA_VERSION: &str = "1.0.0";
