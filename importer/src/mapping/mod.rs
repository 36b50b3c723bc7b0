//! Field mapping definition.
//!
//! A [`FieldMapping`] is an ordered list of `source label → canonical name`
//! rules plus the designation of the key field and the required field. It is
//! plain configuration: the pipeline receives it as a value, so several
//! mappings can coexist (see [`preset`]).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{MappingError, MappingResult};

/// Name of the identity column every target table carries.
pub const IDENTITY_COLUMN: &str = "id";

static SQL_IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// Whether `name` can be used unquoted as a table or column name.
pub fn is_sql_identifier(name: &str) -> bool {
    SQL_IDENTIFIER.is_match(name)
}

/// One `source label → canonical name` rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    /// Column label as it appears in the source header.
    pub source: String,
    /// Canonical field name used in the target table.
    pub target: String,
}

/// Ordered field mapping with key and required field designations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Rules in output column order.
    pub fields: Vec<FieldRule>,

    /// Canonical name whose values must be unique.
    pub key_field: String,

    /// Canonical name whose values must be present.
    pub required_field: String,
}

impl FieldMapping {
    /// Create an empty mapping with the given key and required fields.
    pub fn new(key_field: impl Into<String>, required_field: impl Into<String>) -> Self {
        Self {
            description: String::new(),
            fields: Vec::new(),
            key_field: key_field.into(),
            required_field: required_field.into(),
        }
    }

    /// Append a rule.
    pub fn field(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.fields.push(FieldRule {
            source: source.into(),
            target: target.into(),
        });
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Parse a mapping from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Source labels in mapping order.
    pub fn source_labels(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.source.as_str()).collect()
    }

    /// Canonical names in mapping order.
    pub fn target_fields(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.target.as_str()).collect()
    }

    /// Canonical names that are neither the key nor the required field.
    pub fn optional_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .map(|f| f.target.as_str())
            .filter(|t| *t != self.key_field && *t != self.required_field)
            .collect()
    }

    /// Check the mapping is internally consistent and SQL-safe.
    pub fn validate(&self) -> MappingResult<()> {
        if self.fields.is_empty() {
            return Err(MappingError::Invalid("mapping has no fields".into()));
        }

        let mut sources = HashSet::new();
        let mut targets = HashSet::new();
        for rule in &self.fields {
            if rule.source.trim().is_empty() {
                return Err(MappingError::Invalid(format!(
                    "empty source label for '{}'",
                    rule.target
                )));
            }
            if !sources.insert(rule.source.as_str()) {
                return Err(MappingError::Invalid(format!(
                    "source label '{}' is mapped twice",
                    rule.source
                )));
            }
            if !is_sql_identifier(&rule.target) {
                return Err(MappingError::Invalid(format!(
                    "canonical name '{}' is not a valid column name",
                    rule.target
                )));
            }
            if rule.target.eq_ignore_ascii_case(IDENTITY_COLUMN) {
                return Err(MappingError::Invalid(format!(
                    "canonical name '{}' is reserved for the identity column",
                    rule.target
                )));
            }
            // SQLite column names are case-insensitive.
            if !targets.insert(rule.target.to_ascii_lowercase()) {
                return Err(MappingError::Invalid(format!(
                    "canonical name '{}' is used twice",
                    rule.target
                )));
            }
        }

        if !self.fields.iter().any(|f| f.target == self.key_field) {
            return Err(MappingError::Invalid(format!(
                "key field '{}' is not a canonical name of the mapping",
                self.key_field
            )));
        }
        if !self.fields.iter().any(|f| f.target == self.required_field) {
            return Err(MappingError::Invalid(format!(
                "required field '{}' is not a canonical name of the mapping",
                self.required_field
            )));
        }
        if self.key_field == self.required_field {
            return Err(MappingError::Invalid(
                "key field and required field must differ".into(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Column plan
// =============================================================================

/// Resolved source column for each mapping rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPlan {
    /// `(canonical name, source column index)` in mapping order.
    pub columns: Vec<(String, usize)>,
}

/// Resolve the mapping against observed header labels.
///
/// # Errors
/// [`MappingError::MissingColumns`] listing, in mapping order, every source
/// label the header lacks.
pub fn validate_columns(observed: &[String], mapping: &FieldMapping) -> MappingResult<ColumnPlan> {
    let mut columns = Vec::with_capacity(mapping.fields.len());
    let mut missing = Vec::new();

    for rule in &mapping.fields {
        match observed.iter().position(|label| *label == rule.source) {
            Some(index) => columns.push((rule.target.clone(), index)),
            None => missing.push(rule.source.clone()),
        }
    }

    if missing.is_empty() {
        Ok(ColumnPlan { columns })
    } else {
        Err(MappingError::MissingColumns(missing))
    }
}

// =============================================================================
// Presets
// =============================================================================

/// A named mapping with its default target table.
#[derive(Debug, Clone)]
pub struct MappingPreset {
    pub name: &'static str,
    pub table: &'static str,
    pub mapping: FieldMapping,
}

/// Names accepted by [`preset`].
pub const PRESET_NAMES: &[&str] = &["historical-records", "atmospheric-records"];

/// Look up a built-in mapping by name.
pub fn preset(name: &str) -> Option<MappingPreset> {
    match name {
        "historical-records" => Some(MappingPreset {
            name: "historical-records",
            table: "historical_records",
            mapping: historical_records(),
        }),
        "atmospheric-records" => Some(MappingPreset {
            name: "atmospheric-records",
            table: "historical_records",
            mapping: atmospheric_records(),
        }),
        _ => None,
    }
}

/// Astronomical phenomena sheet with two source citation columns.
pub fn historical_records() -> FieldMapping {
    FieldMapping::new("reign_year_ganzhi", "gregorian_date_text")
        .with_description("Astronomical phenomena records")
        .field("年号干支纪年", "reign_year_ganzhi")
        .field("公元纪年", "gregorian_date_text")
        .field("天文现象记录", "phenomenon_description")
        .field("史料来源", "source_1")
        .field("备注", "remarks")
        .field("史料来源2", "source_2")
}

/// Atmospheric phenomena sheet with a single source citation column.
pub fn atmospheric_records() -> FieldMapping {
    FieldMapping::new("reign_year_ganzhi", "gregorian_date_text")
        .with_description("Atmospheric phenomena records")
        .field("年号干支纪年", "reign_year_ganzhi")
        .field("公元纪年", "gregorian_date_text")
        .field("大气现象记录", "phenomenon_description")
        .field("史料来源", "source")
        .field("备注", "remarks")
}
