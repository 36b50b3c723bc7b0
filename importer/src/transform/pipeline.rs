//! High-level import pipeline.
//!
//! A run executes, strictly in this order and stopping at the first error:
//!
//! ```text
//! initialize table → load source → validate columns → project
//!     → [reject missing keys] → deduplicate by key → filter missing required
//!     → normalize nulls → persist
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use tabload::{run_import, ImportConfig};
//!
//! let config = ImportConfig::from_preset("historical-records", "2.xlsx", "historical_records_v2.db")?;
//! let report = run_import(&config)?;
//! println!("Persisted {} rows", report.rows_persisted);
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::{EmptyKeyPolicy, ImportConfig};
use crate::error::PipelineResult;
use crate::logs::{log_error, log_info, log_info_indent, log_success, log_warning};
use crate::mapping::validate_columns;
use crate::source::{load_source, SourceKind, SourceTable};
use crate::store::{PersistOutcome, SqliteStore, TableSchema};

use super::stages::{
    deduplicate_by_key, filter_missing_required, normalize_nulls, project, reject_missing_keys,
};

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Source path, when the run read a file.
    pub source: Option<String>,
    pub table: String,
    pub rows_read: usize,
    pub rows_after_projection: usize,
    /// Rows dropped for a missing key ([`EmptyKeyPolicy::Reject`] only).
    pub missing_key_removed: usize,
    pub duplicates_removed: usize,
    pub missing_required_removed: usize,
    /// Optional cells stored as NULL.
    pub nulls_normalized: usize,
    pub rows_persisted: usize,
    pub persist: PersistOutcome,
}

/// Open the configured database and import the configured source into it.
pub fn run_import(config: &ImportConfig) -> PipelineResult<ImportReport> {
    config.validate()?;
    log_info(format!("🗄️  Opening database {}", config.database.display()));
    let mut store = SqliteStore::open(&config.database)?;
    import_source(&mut store, config)
}

/// Import the configured source into an already open store.
pub fn import_source(store: &mut SqliteStore, config: &ImportConfig) -> PipelineResult<ImportReport> {
    config.validate()?;
    let started_at = Utc::now();
    let schema = initialize(store, config)?;

    log_info(format!("📖 Reading {}", config.source.display()));
    let table = load_source(&config.source, &config.source_options())?;
    describe_source(&table);

    let source = Some(config.source.display().to_string());
    process(store, &schema, table, config, started_at, source)
}

/// Import rows that were loaded elsewhere.
pub fn import_table(
    store: &mut SqliteStore,
    table: SourceTable,
    config: &ImportConfig,
) -> PipelineResult<ImportReport> {
    config.validate()?;
    let started_at = Utc::now();
    let schema = initialize(store, config)?;
    process(store, &schema, table, config, started_at, None)
}

fn initialize(store: &mut SqliteStore, config: &ImportConfig) -> PipelineResult<TableSchema> {
    let schema = TableSchema::from_mapping(config.table.clone(), &config.mapping);
    if let Err(e) = store.initialize_table(&schema, config.reset_on_run) {
        log_error(e.to_string());
        return Err(e.into());
    }
    if config.reset_on_run {
        log_success(format!("Table '{}' recreated", schema.name));
    } else {
        log_success(format!("Table '{}' ready (existing rows kept)", schema.name));
    }
    let optional = config.mapping.optional_fields();
    if !optional.is_empty() {
        log_info_indent(format!("Nullable columns: {}", optional.join(", ")), 1);
    }
    Ok(schema)
}

fn describe_source(table: &SourceTable) {
    match table.kind {
        SourceKind::Workbook => {
            if let Some(ref sheet) = table.sheet {
                log_success(format!("Sheet: {}", sheet));
            }
        }
        SourceKind::Delimited => {
            if let Some(ref encoding) = table.encoding {
                log_success(format!("Detected encoding: {}", encoding));
            }
            if let Some(delimiter) = table.delimiter {
                log_success(format!("Separator: {:?}", delimiter));
            }
        }
    }
}

fn process(
    store: &mut SqliteStore,
    schema: &TableSchema,
    table: SourceTable,
    config: &ImportConfig,
    started_at: DateTime<Utc>,
    source: Option<String>,
) -> PipelineResult<ImportReport> {
    let markers = config.null_markers();
    let mapping = &config.mapping;
    let rows_read = table.records.len();
    log_success(format!("Read {} rows", rows_read));

    let plan = match validate_columns(&table.headers, mapping) {
        Ok(plan) => plan,
        Err(e) => {
            log_error(e.to_string());
            log_info(format!("Expected columns: {}", mapping.source_labels().join(", ")));
            log_info(format!("Found columns: {}", table.headers.join(", ")));
            return Err(e.into());
        }
    };

    log_info("🗺️  Column mapping:");
    for rule in &mapping.fields {
        log_info_indent(format!("{} → {}", rule.source, rule.target), 1);
    }
    let projected = project(&table.records, &plan);
    let rows_after_projection = projected.len();
    log_success(format!("{} rows after projection", rows_after_projection));

    let (keyed, missing_key_removed) = match config.empty_key_policy {
        EmptyKeyPolicy::Reject => {
            let out = reject_missing_keys(projected, &mapping.key_field, &markers);
            if out.removed > 0 {
                log_warning(format!(
                    "Removed {} rows without '{}'",
                    out.removed, mapping.key_field
                ));
            }
            (out.records, out.removed)
        }
        EmptyKeyPolicy::Deduplicate => (projected, 0),
    };

    log_info(format!("Removing duplicates on '{}'...", mapping.key_field));
    let deduped = deduplicate_by_key(keyed, &mapping.key_field, &markers);
    if deduped.removed > 0 {
        log_warning(format!("Removed {} duplicate rows", deduped.removed));
    } else {
        log_success("No duplicates found");
    }
    if let Some(keyless) = deduped.records.iter().find(|r| {
        r.get(&mapping.key_field)
            .map_or(true, |v| v.is_missing(&markers))
    }) {
        log_warning(format!(
            "Row at line {} has no '{}' and is kept with an empty key",
            keyless.line, mapping.key_field
        ));
    }

    log_info(format!("Removing rows without '{}'...", mapping.required_field));
    let filtered = filter_missing_required(deduped.records, &mapping.required_field, &markers);
    if filtered.removed > 0 {
        log_warning(format!(
            "Removed {} rows with empty '{}'",
            filtered.removed, mapping.required_field
        ));
    } else {
        log_success(format!("No empty '{}' values", mapping.required_field));
    }

    let normalized = normalize_nulls(filtered.records, mapping, &markers);
    if normalized.nulls_normalized > 0 {
        log_info(format!("{} empty optional cells stored as NULL", normalized.nulls_normalized));
    }

    let persist = match store.persist(schema, &normalized.records) {
        Ok(outcome) => outcome,
        Err(e) => {
            log_error(format!("Nothing persisted: {}", e));
            return Err(e.into());
        }
    };
    match persist {
        PersistOutcome::Inserted(n) => {
            log_success(format!("Imported {} rows into '{}'", n, schema.name))
        }
        PersistOutcome::Skipped => log_warning("No valid rows left to import"),
    }

    Ok(ImportReport {
        run_id: Uuid::new_v4(),
        started_at,
        finished_at: Utc::now(),
        source,
        table: schema.name.clone(),
        rows_read,
        rows_after_projection,
        missing_key_removed,
        duplicates_removed: deduped.removed,
        missing_required_removed: filtered.removed,
        nulls_normalized: normalized.nulls_normalized,
        rows_persisted: persist.rows(),
        persist,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MappingError, PipelineError, SourceError, StoreError};
    use crate::mapping::historical_records;
    use crate::models::CellValue;
    use rust_xlsxwriter::Workbook;
    use serde_json::Value;
    use std::path::Path;
    use tempfile::tempdir;

    const HEADERS: [&str; 6] = ["年号干支纪年", "公元纪年", "天文现象记录", "史料来源", "备注", "史料来源2"];

    fn headers() -> Vec<String> {
        HEADERS.iter().map(|s| s.to_string()).collect()
    }

    fn row(cells: [&str; 6]) -> Vec<CellValue> {
        cells.iter().map(|s| CellValue::from_text(s)).collect()
    }

    fn config() -> ImportConfig {
        ImportConfig::new("unused.xlsx", ":memory:", "historical_records", historical_records())
    }

    fn assert_table_invariants(rows: &[serde_json::Map<String, Value>]) {
        let mut keys = std::collections::HashSet::new();
        for r in rows {
            assert!(keys.insert(r["reign_year_ganzhi"].to_string()), "duplicate key {:?}", r);
            let date = r["gregorian_date_text"].as_str().unwrap_or("");
            assert!(!date.trim().is_empty(), "empty required field {:?}", r);
        }
    }

    #[test]
    fn test_five_row_scenario() {
        let table = SourceTable::from_rows(
            headers(),
            vec![
                row(["K0", "前104年", "日食", "汉书", "", ""]),
                row(["A1", "前103年", "彗星", "汉书", "first", ""]),
                row(["K3", "", "流星", "汉书", "", ""]),
                row(["A1", "前101年", "彗星", "史记", "second", ""]),
                row(["K5", "前100年", "日食", "汉书", "NaN", "史记"]),
            ],
        );
        let mut store = SqliteStore::open_in_memory().unwrap();

        let report = import_table(&mut store, table, &config()).unwrap();

        assert_eq!(report.rows_read, 5);
        assert_eq!(report.rows_after_projection, 5);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.missing_required_removed, 1);
        assert_eq!(report.rows_persisted, 3);
        assert_eq!(report.persist, PersistOutcome::Inserted(3));

        let rows = store.fetch_all("historical_records").unwrap();
        assert_table_invariants(&rows);
        let keys: Vec<&str> = rows.iter().map(|r| r["reign_year_ganzhi"].as_str().unwrap()).collect();
        assert_eq!(keys, vec!["K0", "A1", "K5"]);
        assert_eq!(rows[1]["remarks"], "first");
        assert_eq!(rows[1]["gregorian_date_text"], "前103年");
        assert_eq!(rows[2]["remarks"], Value::Null);
        assert_eq!(rows[2]["source_2"], "史记");
        assert_eq!(rows[0]["source_2"], Value::Null);
    }

    #[test]
    fn test_empty_source_is_a_successful_noop() {
        let table = SourceTable::from_rows(headers(), Vec::new());
        let mut store = SqliteStore::open_in_memory().unwrap();

        let report = import_table(&mut store, table, &config()).unwrap();

        assert_eq!(report.rows_read, 0);
        assert_eq!(report.duplicates_removed, 0);
        assert_eq!(report.missing_required_removed, 0);
        assert_eq!(report.rows_persisted, 0);
        assert_eq!(report.persist, PersistOutcome::Skipped);
        assert_eq!(store.count_rows("historical_records").unwrap(), 0);
    }

    #[test]
    fn test_empty_required_column_persists_nothing() {
        let table = SourceTable::from_rows(
            headers(),
            vec![
                row(["A", "", "x", "", "", ""]),
                row(["B", " ", "y", "", "", ""]),
                row(["C", "#N/A", "z", "", "", ""]),
            ],
        );
        let mut store = SqliteStore::open_in_memory().unwrap();

        let report = import_table(&mut store, table, &config()).unwrap();

        assert_eq!(report.missing_required_removed, 3);
        assert_eq!(report.rows_persisted, 0);
        assert_eq!(report.persist, PersistOutcome::Skipped);
    }

    #[test]
    fn test_missing_columns_leave_fresh_empty_table() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let full = SourceTable::from_rows(headers(), vec![row(["A", "1", "", "", "", ""])]);
        import_table(&mut store, full, &config()).unwrap();
        assert_eq!(store.count_rows("historical_records").unwrap(), 1);

        let partial_headers: Vec<String> = headers().into_iter().take(4).collect();
        let partial = SourceTable::from_rows(
            partial_headers,
            vec![vec![CellValue::from_text("B"), CellValue::from_text("2")]],
        );

        match import_table(&mut store, partial, &config()) {
            Err(PipelineError::Mapping(MappingError::MissingColumns(missing))) => {
                assert_eq!(missing, vec!["备注", "史料来源2"]);
            }
            other => panic!("expected missing columns, got {:?}", other.map(|r| r.rows_persisted)),
        }
        assert_eq!(store.count_rows("historical_records").unwrap(), 0);
    }

    #[test]
    fn test_missing_keys_are_deduplicated_by_default() {
        let table = SourceTable::from_rows(
            headers(),
            vec![
                row(["", "1", "first", "", "", ""]),
                row(["A", "2", "", "", "", ""]),
                row(["", "3", "second", "", "", ""]),
            ],
        );
        let mut store = SqliteStore::open_in_memory().unwrap();

        let report = import_table(&mut store, table, &config()).unwrap();

        assert_eq!(report.missing_key_removed, 0);
        assert_eq!(report.duplicates_removed, 1);
        let rows = store.fetch_all("historical_records").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["reign_year_ganzhi"], "");
        assert_eq!(rows[0]["phenomenon_description"], "first");
    }

    #[test]
    fn test_reject_policy_drops_missing_keys() {
        let table = SourceTable::from_rows(
            headers(),
            vec![
                row(["", "1", "", "", "", ""]),
                row(["A", "2", "", "", "", ""]),
                row(["NULL", "3", "", "", "", ""]),
                row(["A", "4", "", "", "", ""]),
            ],
        );
        let config = config().with_empty_key_policy(EmptyKeyPolicy::Reject);
        let mut store = SqliteStore::open_in_memory().unwrap();

        let report = import_table(&mut store, table, &config).unwrap();

        assert_eq!(report.missing_key_removed, 2);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.rows_persisted, 1);
    }

    #[test]
    fn test_append_without_reset_surfaces_constraint_violation() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let first = SourceTable::from_rows(headers(), vec![row(["A", "1", "", "", "", ""])]);
        import_table(&mut store, first, &config()).unwrap();

        let second = SourceTable::from_rows(
            headers(),
            vec![row(["B", "2", "", "", "", ""]), row(["A", "3", "", "", "", ""])],
        );
        let append = config().with_reset_on_run(false);

        match import_table(&mut store, second, &append) {
            Err(PipelineError::Store(StoreError::ConstraintViolation { line, .. })) => {
                assert_eq!(line, 3);
            }
            other => panic!("expected constraint violation, got {:?}", other.map(|r| r.rows_persisted)),
        }
        assert_eq!(store.count_rows("historical_records").unwrap(), 1);
    }

    #[test]
    fn test_invalid_mapping_rejected_before_store() {
        let mut config = config();
        config.mapping.key_field = "nope".into();
        let mut store = SqliteStore::open_in_memory().unwrap();
        let table = SourceTable::from_rows(headers(), Vec::new());

        let result = import_table(&mut store, table, &config);
        assert!(matches!(result, Err(PipelineError::Mapping(MappingError::Invalid(_)))));
        assert!(store.count_rows("historical_records").is_err());
    }

    #[test]
    fn test_rejected_table_ddl_is_a_schema_error() {
        let db = tempdir().unwrap();
        let path = db.path().join("records.db");
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE VIEW historical_records AS SELECT 1;")
            .unwrap();
        let mut store = SqliteStore::open(&path).unwrap();
        let table = SourceTable::from_rows(headers(), vec![row(["A1", "前103年", "", "", "", ""])]);

        let err = import_table(&mut store, table, &config()).unwrap_err();
        assert!(matches!(err, PipelineError::Store(StoreError::Schema { .. })));
        assert_eq!(err.kind(), "SchemaError");
    }

    fn write_csv(path: &Path, body: &str) {
        std::fs::write(path, format!("{}\n{}", HEADERS.join(","), body)).unwrap();
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("records.csv");
        let db = dir.path().join("records.db");
        write_csv(
            &source,
            "A1,前103年,彗星,汉书,,\nA2,前102年,,,备注,\nA1,前101年,日食,史记,,\n",
        );
        let config = ImportConfig::new(&source, &db, "historical_records", historical_records());

        let first = run_import(&config).unwrap();
        let rows_first = SqliteStore::open(&db).unwrap().fetch_all("historical_records").unwrap();
        let second = run_import(&config).unwrap();
        let rows_second = SqliteStore::open(&db).unwrap().fetch_all("historical_records").unwrap();

        assert_eq!(first.rows_persisted, 2);
        assert_eq!(second.rows_persisted, 2);
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(rows_first, rows_second);
        assert_eq!(first.source.as_deref(), Some(source.display().to_string().as_str()));
    }

    #[test]
    fn test_missing_source_fails_after_table_reset() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("records.db");
        let config = ImportConfig::new(
            dir.path().join("absent.xlsx"),
            &db,
            "historical_records",
            historical_records(),
        );

        let err = run_import(&config).unwrap_err();
        assert!(matches!(err, PipelineError::Source(SourceError::NotFound(_))));
        assert_eq!(err.kind(), "SourceNotFound");
        assert_eq!(SqliteStore::open(&db).unwrap().count_rows("historical_records").unwrap(), 0);
    }

    #[test]
    fn test_xlsx_end_to_end() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("2.xlsx");
        let db = dir.path().join("historical_records_v2.db");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, label) in HEADERS.iter().enumerate() {
            sheet.write_string(0, col as u16, *label).unwrap();
        }
        sheet.write_string(1, 0, "建武元年").unwrap();
        sheet.write_number(1, 1, 25.0).unwrap();
        sheet.write_string(1, 2, "日食").unwrap();
        sheet.write_string(2, 0, "建武元年").unwrap();
        sheet.write_number(2, 1, 25.0).unwrap();
        sheet.write_string(3, 0, "建武二年").unwrap();
        sheet.write_string(3, 2, "彗星").unwrap();
        sheet.write_string(4, 0, "建武三年").unwrap();
        sheet.write_string(4, 1, "27").unwrap();
        sheet.write_string(4, 4, "#N/A").unwrap();
        workbook.save(&source).unwrap();

        let config = ImportConfig::new(&source, &db, "historical_records", historical_records());
        let report = run_import(&config).unwrap();

        assert_eq!(report.rows_read, 4);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.missing_required_removed, 1);
        assert_eq!(report.rows_persisted, 2);

        let rows = SqliteStore::open(&db).unwrap().fetch_all("historical_records").unwrap();
        assert_table_invariants(&rows);
        assert_eq!(rows[0]["gregorian_date_text"], "25");
        assert_eq!(rows[1]["reign_year_ganzhi"], "建武三年");
        assert_eq!(rows[1]["remarks"], Value::Null);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let table = SourceTable::from_rows(headers(), Vec::new());
        let mut store = SqliteStore::open_in_memory().unwrap();
        let report = import_table(&mut store, table, &config()).unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["rowsPersisted"], 0);
        assert_eq!(json["persist"]["status"], "skipped");
        assert!(json["runId"].is_string());
        assert_eq!(json["source"], Value::Null);
    }
}
