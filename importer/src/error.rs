//! Error types for the tabload import pipeline.
//!
//! - [`SourceError`] - Opening and parsing the tabular source
//! - [`MappingError`] - Field mapping definition and column checks
//! - [`StoreError`] - SQLite connection, schema and insert errors
//! - [`ConfigError`] - Loading import configuration
//! - [`PipelineError`] - Top-level run errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use std::path::PathBuf;

use thiserror::Error;

// =============================================================================
// Source Errors
// =============================================================================

/// Errors while opening or reading the tabular source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source path does not exist.
    #[error("Source file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The content cannot be read as tabular data.
    #[error("Invalid tabular source: {0}")]
    Format(String),

    /// The source exists but could not be read.
    #[error("Failed to read source: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Mapping Errors
// =============================================================================

/// Errors from the field mapping.
#[derive(Debug, Error)]
pub enum MappingError {
    /// The source lacks labels the mapping requires.
    #[error("Source is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// The mapping itself is malformed.
    #[error("Invalid field mapping: {0}")]
    Invalid(String),
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors from the SQLite target store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not open the database.
    #[error("Cannot open database '{}': {source}", .path.display())]
    Connection {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// The store rejected the table DDL.
    #[error("Cannot initialize table '{table}': {source}")]
    Schema {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    /// A UNIQUE or NOT NULL constraint rejected a row.
    #[error("Constraint violation while inserting into '{table}' (source line {line}): {message}")]
    ConstraintViolation {
        table: String,
        line: usize,
        message: String,
    },

    /// A table name that is not a plain SQL identifier.
    #[error("Invalid table name: '{0}'")]
    InvalidTableName(String),

    /// Any other statement failure.
    #[error("Database error: {0}")]
    Query(#[from] rusqlite::Error),
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors while loading an import configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error.
    #[error("Cannot read config: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// No preset with that name.
    #[error("Unknown mapping preset: {0}")]
    UnknownPreset(String),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level import errors.
///
/// This is the error type returned by [`crate::transform::pipeline::run_import`].
/// Per-row anomalies (duplicates, missing required values, null sentinels)
/// are counted in the report and never show up here.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Source error.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Mapping error.
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// Store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Config error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// Stable name of the failure class, as printed in CLI errors.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Source(SourceError::NotFound(_)) => "SourceNotFound",
            PipelineError::Source(SourceError::Format(_)) => "SourceFormatError",
            PipelineError::Source(SourceError::Io(_)) => "SourceReadError",
            PipelineError::Mapping(MappingError::MissingColumns(_)) => "MissingColumnsError",
            PipelineError::Mapping(MappingError::Invalid(_)) => "InvalidMapping",
            PipelineError::Store(StoreError::Connection { .. }) => "StoreConnectionError",
            PipelineError::Store(StoreError::Schema { .. }) => "SchemaError",
            PipelineError::Store(StoreError::ConstraintViolation { .. }) => {
                "PersistConstraintViolation"
            }
            PipelineError::Store(StoreError::InvalidTableName(_)) => "InvalidMapping",
            PipelineError::Store(StoreError::Query(_)) => "StoreError",
            PipelineError::Config(_) => "ConfigError",
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
