//! # tabload - Deterministic spreadsheet to SQLite import
//!
//! tabload reads a tabular file (Excel workbook or delimited text), keeps a
//! fixed set of renamed columns, drops duplicate keys and rows lacking the
//! required field, and bulk-loads the result into a uniqueness-constrained
//! SQLite table.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ XLSX / CSV  │────▶│   Source    │────▶│  Transform  │────▶│   SQLite    │
//! │             │     │ (calamine)  │     │ (map/dedup) │     │   table     │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tabload::{run_import, ImportConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ImportConfig::from_preset("historical-records", "2.xlsx", "historical_records_v2.db")?;
//!     let report = run_import(&config)?;
//!     println!("{} duplicates removed, {} rows persisted", report.duplicates_removed, report.rows_persisted);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Cells and records
//! - [`source`] - Workbook and delimited text loading
//! - [`mapping`] - Field mappings and presets
//! - [`transform`] - Pipeline stages and the run
//! - [`store`] - SQLite target table
//! - [`config`] - Import configuration
//! - [`logs`] - Run log

// Core modules
pub mod config;
pub mod error;
pub mod logs;
pub mod models;

// Input
pub mod mapping;
pub mod source;

// Transformation
pub mod transform;

// Output
pub mod store;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{ConfigError, MappingError, PipelineError, SourceError, StoreError};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{CanonicalRecord, CellValue, NullMarkers, PersistRecord, SourceRecord};

// =============================================================================
// Re-exports - Source & Mapping
// =============================================================================

pub use source::{load_source, SourceKind, SourceOptions, SourceTable};

pub use mapping::{preset, validate_columns, ColumnPlan, FieldMapping, FieldRule, PRESET_NAMES};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use config::{EmptyKeyPolicy, ImportConfig};

pub use transform::pipeline::{import_source, import_table, run_import, ImportReport};

pub use transform::stages::{
    deduplicate_by_key, filter_missing_required, normalize_nulls, project, StageOutput,
};

pub use store::{PersistOutcome, SqliteStore, TableSchema};
