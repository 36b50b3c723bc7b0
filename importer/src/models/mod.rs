//! Domain models for the import pipeline.
//!
//! - [`CellValue`] - One loosely-typed cell as read from the source
//! - [`NullMarkers`] - Cell texts that mean "no value"
//! - [`SourceRecord`] - One source row, positional cells
//! - [`CanonicalRecord`] - Mapped fields under canonical names
//! - [`PersistRecord`] - Text values ready for insertion

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Cell Values
// =============================================================================

/// A single cell as delivered by the source reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CellValue {
    /// Blank cell.
    Empty,
    /// Text (also used for dates rendered by the reader).
    Text(String),
    /// Integer.
    Int(i64),
    /// Floating point. NaN is a sentinel for a blank cell.
    Float(f64),
    /// Boolean.
    Bool(bool),
}

impl CellValue {
    /// Build a cell from raw text; an empty string is a blank cell.
    pub fn from_text(raw: &str) -> Self {
        if raw.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(raw.to_string())
        }
    }

    /// Whether this cell denotes "no value".
    pub fn is_missing(&self, markers: &NullMarkers) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Float(f) => f.is_nan(),
            CellValue::Text(s) => s.trim().is_empty() || markers.contains(s.trim()),
            CellValue::Int(_) | CellValue::Bool(_) => false,
        }
    }

    /// Text rendering used for comparison and storage.
    ///
    /// Whole floats render without a fractional part, so `1990.0` from a
    /// numeric cell compares equal to the text `1990`.
    pub fn render(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Int(i) => i.to_string(),
            CellValue::Float(f) => {
                if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            CellValue::Bool(b) => b.to_string(),
        }
    }

    /// Rendered text, or `None` when the cell is missing.
    pub fn to_option(&self, markers: &NullMarkers) -> Option<String> {
        if self.is_missing(markers) {
            None
        } else {
            Some(self.render())
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

// =============================================================================
// Null Markers
// =============================================================================

/// Cell texts that spreadsheet tooling writes for blank values.
pub const DEFAULT_NULL_MARKERS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Set of texts treated as missing values (compared after trimming).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NullMarkers {
    markers: HashSet<String>,
}

impl NullMarkers {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers.into_iter().map(Into::into).collect(),
        }
    }

    /// No markers: only blank cells and NaN are missing.
    pub fn none() -> Self {
        Self {
            markers: HashSet::new(),
        }
    }

    pub fn contains(&self, text: &str) -> bool {
        self.markers.contains(text)
    }
}

impl Default for NullMarkers {
    fn default() -> Self {
        Self::new(DEFAULT_NULL_MARKERS.iter().copied())
    }
}

// =============================================================================
// Records
// =============================================================================

/// One data row of the source, cells positional to the header labels.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    /// 1-based line in the source (the header is line 1).
    pub line: usize,
    pub cells: Vec<CellValue>,
}

impl SourceRecord {
    pub fn new(line: usize, cells: Vec<CellValue>) -> Self {
        Self { line, cells }
    }

    /// Cell at a column index; out-of-range columns read as blank.
    pub fn cell(&self, index: usize) -> &CellValue {
        const EMPTY: &CellValue = &CellValue::Empty;
        self.cells.get(index).unwrap_or(EMPTY)
    }
}

/// A record restricted to the mapped fields, renamed to canonical names.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub line: usize,
    /// `(canonical name, value)` in mapping order.
    pub fields: Vec<(String, CellValue)>,
}

impl CanonicalRecord {
    pub fn get(&self, name: &str) -> Option<&CellValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}

/// A normalized record: `None` is written as SQL NULL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistRecord {
    pub line: usize,
    pub fields: Vec<(String, Option<String>)>,
}

impl PersistRecord {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .and_then(|(_, value)| value.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_values() {
        let markers = NullMarkers::default();
        assert!(CellValue::Empty.is_missing(&markers));
        assert!(CellValue::Float(f64::NAN).is_missing(&markers));
        assert!(CellValue::Text("   ".into()).is_missing(&markers));
        assert!(CellValue::Text(" NaN ".into()).is_missing(&markers));
        assert!(CellValue::Text("#N/A".into()).is_missing(&markers));
        assert!(!CellValue::Text("A1".into()).is_missing(&markers));
        assert!(!CellValue::Int(0).is_missing(&markers));
        assert!(!CellValue::Bool(false).is_missing(&markers));
    }

    #[test]
    fn test_markers_can_be_disabled() {
        let markers = NullMarkers::none();
        assert!(!CellValue::Text("NA".into()).is_missing(&markers));
        assert!(CellValue::Text("".into()).is_missing(&markers));
    }

    #[test]
    fn test_render_whole_floats_as_integers() {
        assert_eq!(CellValue::Float(1990.0).render(), "1990");
        assert_eq!(CellValue::Float(-104.0).render(), "-104");
        assert_eq!(CellValue::Float(2.5).render(), "2.5");
        assert_eq!(CellValue::Int(42).render(), "42");
        assert_eq!(CellValue::Bool(true).render(), "true");
    }

    #[test]
    fn test_to_option() {
        let markers = NullMarkers::default();
        assert_eq!(CellValue::Text("null".into()).to_option(&markers), None);
        assert_eq!(
            CellValue::Text("Hanshu".into()).to_option(&markers),
            Some("Hanshu".to_string())
        );
    }

    #[test]
    fn test_source_record_pads_short_rows() {
        let record = SourceRecord::new(2, vec![CellValue::Text("a".into())]);
        assert_eq!(record.cell(0), &CellValue::Text("a".into()));
        assert_eq!(record.cell(5), &CellValue::Empty);
    }
}
