//! Import configuration.
//!
//! Everything a run needs is passed in explicitly through [`ImportConfig`];
//! the library reads no environment variables. Configs can be built in code
//! or loaded from a JSON file:
//!
//! ```json
//! {
//!   "source": "records.xlsx",
//!   "database": "historical_records.db",
//!   "table": "historical_records",
//!   "mapping": { "fields": [ ... ], "keyField": "...", "requiredField": "..." },
//!   "resetOnRun": true,
//!   "emptyKeyPolicy": "deduplicate"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult, MappingError, MappingResult};
use crate::mapping::{is_sql_identifier, preset, FieldMapping};
use crate::models::{NullMarkers, DEFAULT_NULL_MARKERS};
use crate::source::SourceOptions;

/// What to do with rows whose key field is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyKeyPolicy {
    /// Missing keys form one duplicate group; the first such row is kept
    /// and stored with an empty-string key.
    #[default]
    Deduplicate,
    /// Rows with a missing key are dropped before deduplication.
    Reject,
}

/// Full configuration of one import run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportConfig {
    /// Tabular source file.
    pub source: PathBuf,

    /// SQLite database file.
    pub database: PathBuf,

    /// Target table name.
    pub table: String,

    pub mapping: FieldMapping,

    /// Drop and recreate the table before importing.
    #[serde(default = "default_reset_on_run")]
    pub reset_on_run: bool,

    #[serde(default)]
    pub empty_key_policy: EmptyKeyPolicy,

    /// Cell texts read as "no value".
    #[serde(default = "default_null_markers")]
    pub null_markers: Vec<String>,

    /// Worksheet to read (first sheet when absent).
    #[serde(default)]
    pub sheet: Option<String>,

    /// Delimiter for text sources (auto-detected when absent).
    #[serde(default)]
    pub delimiter: Option<char>,
}

fn default_reset_on_run() -> bool {
    true
}

fn default_null_markers() -> Vec<String> {
    DEFAULT_NULL_MARKERS.iter().map(|s| s.to_string()).collect()
}

impl ImportConfig {
    /// Config with default options.
    pub fn new(
        source: impl Into<PathBuf>,
        database: impl Into<PathBuf>,
        table: impl Into<String>,
        mapping: FieldMapping,
    ) -> Self {
        Self {
            source: source.into(),
            database: database.into(),
            table: table.into(),
            mapping,
            reset_on_run: default_reset_on_run(),
            empty_key_policy: EmptyKeyPolicy::default(),
            null_markers: default_null_markers(),
            sheet: None,
            delimiter: None,
        }
    }

    /// Config for a built-in mapping preset, targeting the preset's table.
    pub fn from_preset(
        name: &str,
        source: impl Into<PathBuf>,
        database: impl Into<PathBuf>,
    ) -> ConfigResult<Self> {
        let preset = preset(name).ok_or_else(|| ConfigError::UnknownPreset(name.to_string()))?;
        Ok(Self::new(source, database, preset.table, preset.mapping))
    }

    /// Load a config from a JSON file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn with_reset_on_run(mut self, reset: bool) -> Self {
        self.reset_on_run = reset;
        self
    }

    pub fn with_empty_key_policy(mut self, policy: EmptyKeyPolicy) -> Self {
        self.empty_key_policy = policy;
        self
    }

    pub fn null_markers(&self) -> NullMarkers {
        NullMarkers::new(self.null_markers.iter().map(String::as_str))
    }

    pub fn source_options(&self) -> SourceOptions {
        SourceOptions {
            sheet: self.sheet.clone(),
            delimiter: self.delimiter,
        }
    }

    /// Check table name and mapping before anything touches the store.
    pub fn validate(&self) -> MappingResult<()> {
        if !is_sql_identifier(&self.table) {
            return Err(MappingError::Invalid(format!(
                "table name '{}' is not a valid identifier",
                self.table
            )));
        }
        self.mapping.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = ImportConfig::from_preset("historical-records", "in.xlsx", "out.db").unwrap();
        assert!(config.reset_on_run);
        assert_eq!(config.empty_key_policy, EmptyKeyPolicy::Deduplicate);
        assert_eq!(config.table, "historical_records");
        assert!(config.null_markers().contains("NaN"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_preset() {
        let result = ImportConfig::from_preset("nope", "in.xlsx", "out.db");
        assert!(matches!(result, Err(ConfigError::UnknownPreset(_))));
    }

    #[test]
    fn test_load_json_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("import.json");
        std::fs::write(
            &path,
            r#"{
                "source": "records.csv",
                "database": "records.db",
                "table": "records",
                "mapping": {
                    "fields": [
                        { "source": "Key", "target": "code" },
                        { "source": "Date", "target": "date_text" }
                    ],
                    "keyField": "code",
                    "requiredField": "date_text"
                },
                "emptyKeyPolicy": "reject",
                "delimiter": ";"
            }"#,
        )
        .unwrap();

        let config = ImportConfig::load(&path).unwrap();
        assert!(config.reset_on_run);
        assert_eq!(config.empty_key_policy, EmptyKeyPolicy::Reject);
        assert_eq!(config.delimiter, Some(';'));
        assert_eq!(config.source_options().delimiter, Some(';'));
        assert_eq!(config.null_markers.len(), DEFAULT_NULL_MARKERS.len());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_table_name() {
        let config = ImportConfig::from_preset("historical-records", "in.xlsx", "out.db")
            .unwrap();
        let config = ImportConfig {
            table: "records; DROP TABLE x".into(),
            ..config
        };
        assert!(matches!(config.validate(), Err(MappingError::Invalid(_))));
    }
}
