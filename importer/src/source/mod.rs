//! Tabular source loading.
//!
//! Reads an Excel-family workbook (via calamine) or a delimited text file
//! (encoding and delimiter auto-detected) into a [`SourceTable`]: the
//! observed column labels plus one [`SourceRecord`] per non-blank data row.
//! The whole source is materialized before any transformation runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, ExcelDateTime, Range, Reader};
use chrono::Timelike;
use serde::Serialize;

use crate::error::{SourceError, SourceResult};
use crate::models::{CellValue, SourceRecord};

/// Options for reading a source.
#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    /// Worksheet to read; the first sheet when unset.
    pub sheet: Option<String>,
    /// Field delimiter for text sources; auto-detected when unset.
    pub delimiter: Option<char>,
}

/// Physical format of a source, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Workbook,
    Delimited,
}

impl SourceKind {
    pub fn from_path(path: &Path) -> SourceResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(SourceKind::Workbook),
            "csv" | "tsv" | "txt" => Ok(SourceKind::Delimited),
            "" => Err(SourceError::Format(format!(
                "cannot tell the format of '{}' without a file extension",
                path.display()
            ))),
            other => Err(SourceError::Format(format!(
                "unsupported file extension '.{}'",
                other
            ))),
        }
    }
}

/// A fully loaded source.
#[derive(Debug, Clone)]
pub struct SourceTable {
    /// Column labels, trimmed and disambiguated.
    pub headers: Vec<String>,
    /// Data rows in source order.
    pub records: Vec<SourceRecord>,
    pub kind: SourceKind,
    /// Worksheet that was read (workbooks only).
    pub sheet: Option<String>,
    /// Detected text encoding (delimited only).
    pub encoding: Option<String>,
    /// Field delimiter (delimited only).
    pub delimiter: Option<char>,
}

impl SourceTable {
    /// Table built from in-memory rows, for callers that already hold data.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let records = rows
            .into_iter()
            .enumerate()
            .map(|(i, cells)| SourceRecord::new(i + 2, cells))
            .collect();

        Self {
            headers: normalize_headers(headers),
            records,
            kind: SourceKind::Delimited,
            sheet: None,
            encoding: None,
            delimiter: None,
        }
    }
}

/// Load the tabular source at `path`.
///
/// # Errors
/// * [`SourceError::NotFound`] if `path` does not exist
/// * [`SourceError::Format`] if the content is not readable as a table
pub fn load_source<P: AsRef<Path>>(path: P, options: &SourceOptions) -> SourceResult<SourceTable> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(SourceError::NotFound(PathBuf::from(path)));
    }

    match SourceKind::from_path(path)? {
        SourceKind::Workbook => read_workbook(path, options.sheet.as_deref()),
        SourceKind::Delimited => {
            let bytes = std::fs::read(path)?;
            parse_delimited_bytes(&bytes, options.delimiter)
        }
    }
}

// =============================================================================
// Workbooks
// =============================================================================

fn read_workbook(path: &Path, sheet: Option<&str>) -> SourceResult<SourceTable> {
    let mut workbook = open_workbook_auto(path).map_err(|e| {
        SourceError::Format(format!("cannot open workbook '{}': {}", path.display(), e))
    })?;

    let sheet_name = match sheet {
        Some(name) => {
            if !workbook.sheet_names().iter().any(|s| s == name) {
                return Err(SourceError::Format(format!(
                    "worksheet '{}' not found (available: {})",
                    name,
                    workbook.sheet_names().join(", ")
                )));
            }
            name.to_string()
        }
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| SourceError::Format("workbook has no sheets".to_string()))?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| SourceError::Format(format!("cannot read sheet '{}': {}", sheet_name, e)))?;

    let (headers, records) = table_from_range(&range);

    Ok(SourceTable {
        headers,
        records,
        kind: SourceKind::Workbook,
        sheet: Some(sheet_name),
        encoding: None,
        delimiter: None,
    })
}

/// Split a worksheet range into header labels and data records.
fn table_from_range(range: &Range<Data>) -> (Vec<String>, Vec<SourceRecord>) {
    let first_line = range.start().map(|(row, _)| row as usize + 1).unwrap_or(1);
    let mut rows = range.rows();

    let headers = match rows.next() {
        Some(row) => normalize_headers(row.iter().map(|c| cell_from_data(c).render()).collect()),
        None => return (Vec::new(), Vec::new()),
    };

    let records = rows
        .enumerate()
        .filter_map(|(i, row)| {
            let cells: Vec<CellValue> = row.iter().map(cell_from_data).collect();
            if is_blank_row(&cells) {
                None
            } else {
                Some(SourceRecord::new(first_line + i + 1, cells))
            }
        })
        .collect();

    (headers, records)
}

/// Convert a calamine cell. Error cells (`#N/A`, `#DIV/0!`) read as blank.
pub fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::String(s) => CellValue::from_text(s),
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::Text(format_excel_datetime(dt)),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::from_text(s),
    }
}

fn format_excel_datetime(dt: &ExcelDateTime) -> String {
    match dt.as_datetime() {
        Some(value) if value.hour() == 0 && value.minute() == 0 && value.second() == 0 => {
            value.format("%Y-%m-%d").to_string()
        }
        Some(value) => value.format("%Y-%m-%dT%H:%M:%S").to_string(),
        None => dt.as_f64().to_string(),
    }
}

// =============================================================================
// Delimited text
// =============================================================================

/// Detect the encoding of raw bytes using chardet
///
/// Valid UTF-8 always wins; chardet only guesses for legacy encodings.
pub fn detect_encoding(bytes: &[u8]) -> String {
    if std::str::from_utf8(bytes).is_ok() {
        return "utf-8".to_string();
    }

    let charset = chardet::detect(bytes).0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "utf-8-sig" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        "gb2312" | "gbk" | "gb18030" => "gb18030".to_string(),
        "big5" => "big5".to_string(),
        _ => charset,
    }
}

/// Decode bytes to a string using the given encoding label.
///
/// Unknown labels fall back to lossy UTF-8. A leading byte-order mark is dropped.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let decoded = match encoding_rs::Encoding::for_label(encoding.as_bytes()) {
        Some(enc) if enc != encoding_rs::UTF_8 => enc.decode(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };

    match decoded.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => decoded,
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let mut best_sep = ',';
    let mut best_count = 0;

    for sep in [',', ';', '\t', '|'] {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse delimited bytes with encoding detection and optional explicit delimiter.
pub fn parse_delimited_bytes(bytes: &[u8], delimiter: Option<char>) -> SourceResult<SourceTable> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(&content));

    let (headers, records) = parse_delimited_str(&content, delimiter)?;

    Ok(SourceTable {
        headers,
        records,
        kind: SourceKind::Delimited,
        sheet: None,
        encoding: Some(encoding),
        delimiter: Some(delimiter),
    })
}

/// Parse already-decoded delimited text into headers and records.
pub fn parse_delimited_str(
    content: &str,
    delimiter: char,
) -> SourceResult<(Vec<String>, Vec<SourceRecord>)> {
    if !delimiter.is_ascii() {
        return Err(SourceError::Format(format!(
            "delimiter '{}' is not a single-byte character",
            delimiter
        )));
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = reader.records();

    let headers = match rows.next() {
        Some(row) => {
            let row = row.map_err(csv_format_error)?;
            normalize_headers(row.iter().map(str::to_string).collect())
        }
        None => return Ok((Vec::new(), Vec::new())),
    };

    let mut records = Vec::new();
    for row in rows {
        let row = row.map_err(csv_format_error)?;
        let cells: Vec<CellValue> = row.iter().map(CellValue::from_text).collect();
        if is_blank_row(&cells) {
            continue;
        }
        let line = row
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(records.len() + 2);
        records.push(SourceRecord::new(line, cells));
    }

    Ok((headers, records))
}

fn csv_format_error(err: csv::Error) -> SourceError {
    match err.position() {
        Some(pos) => SourceError::Format(format!("line {}: {}", pos.line(), err)),
        None => SourceError::Format(err.to_string()),
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn is_blank_row(cells: &[CellValue]) -> bool {
    cells.iter().all(|c| match c {
        CellValue::Empty => true,
        CellValue::Text(s) => s.trim().is_empty(),
        _ => false,
    })
}

/// Trim labels, name blank ones `Unnamed: <i>` and suffix repeats `.1`, `.2`, ...
pub fn normalize_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut headers = Vec::with_capacity(raw.len());

    for (i, label) in raw.into_iter().enumerate() {
        let label = label.trim();
        let base = if label.is_empty() {
            format!("Unnamed: {}", i)
        } else {
            label.to_string()
        };

        let count = seen.entry(base.clone()).or_insert(0);
        let header = if *count == 0 {
            base
        } else {
            format!("{}.{}", base, count)
        };
        *count += 1;
        headers.push(header);
    }

    headers
}
