//! SQLite target store.
//!
//! The target table has an auto-incrementing `id`, the key field
//! (`TEXT UNIQUE NOT NULL`), the required field (`TEXT NOT NULL`) and every
//! optional field as nullable `TEXT`, in mapping order.

use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, ErrorCode};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{StoreError, StoreResult};
use crate::mapping::{is_sql_identifier, FieldMapping, IDENTITY_COLUMN};
use crate::models::PersistRecord;

/// Table definition derived from a mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub key_field: String,
    pub required_field: String,
    /// All canonical columns in mapping order (identity excluded).
    pub columns: Vec<String>,
}

impl TableSchema {
    pub fn from_mapping(table: impl Into<String>, mapping: &FieldMapping) -> Self {
        Self {
            name: table.into(),
            key_field: mapping.key_field.clone(),
            required_field: mapping.required_field.clone(),
            columns: mapping.target_fields().iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn drop_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS \"{}\";", self.name)
    }

    pub fn create_sql(&self) -> String {
        let mut defs = vec![format!("\"{}\" INTEGER PRIMARY KEY AUTOINCREMENT", IDENTITY_COLUMN)];
        for column in &self.columns {
            let constraint = if *column == self.key_field {
                " NOT NULL UNIQUE"
            } else if *column == self.required_field {
                " NOT NULL"
            } else {
                ""
            };
            defs.push(format!("\"{}\" TEXT{}", column, constraint));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\n    {}\n);",
            self.name,
            defs.join(",\n    ")
        )
    }

    pub fn insert_sql(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(|c| format!("\"{}\"", c)).collect();
        let placeholders: Vec<String> = (1..=self.columns.len()).map(|i| format!("?{}", i)).collect();
        format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            self.name,
            columns.join(", "),
            placeholders.join(", ")
        )
    }
}

/// Result of the persist step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "rows", rename_all = "lowercase")]
pub enum PersistOutcome {
    /// Rows appended in one transaction.
    Inserted(usize),
    /// Nothing to insert.
    Skipped,
}

impl PersistOutcome {
    pub fn rows(&self) -> usize {
        match self {
            PersistOutcome::Inserted(n) => *n,
            PersistOutcome::Skipped => 0,
        }
    }
}

/// Connection to the target SQLite database.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if needed) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StoreError::Connection {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::Connection {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Ok(Self { conn })
    }

    /// Create the target table, dropping any existing one first when `reset`.
    pub fn initialize_table(&mut self, schema: &TableSchema, reset: bool) -> StoreResult<()> {
        let schema_error = |source| StoreError::Schema {
            table: schema.name.clone(),
            source,
        };

        let mut sql = String::new();
        if reset {
            sql.push_str(&schema.drop_sql());
            sql.push('\n');
        }
        sql.push_str(&schema.create_sql());

        let tx = self.conn.transaction().map_err(schema_error)?;
        tx.execute_batch(&sql).map_err(schema_error)?;
        tx.commit().map_err(schema_error)
    }

    /// Append all records in a single transaction.
    ///
    /// Any failing row rolls back the whole batch. UNIQUE and NOT NULL
    /// failures surface as [`StoreError::ConstraintViolation`].
    pub fn persist(
        &mut self,
        schema: &TableSchema,
        records: &[PersistRecord],
    ) -> StoreResult<PersistOutcome> {
        if records.is_empty() {
            return Ok(PersistOutcome::Skipped);
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&schema.insert_sql())?;
            for record in records {
                let values: Vec<Option<&str>> =
                    schema.columns.iter().map(|c| record.get(c)).collect();
                stmt.execute(params_from_iter(values.iter()))
                    .map_err(|e| insert_error(e, &schema.name, record.line))?;
            }
        }
        tx.commit()?;

        Ok(PersistOutcome::Inserted(records.len()))
    }

    pub fn count_rows(&self, table: &str) -> StoreResult<usize> {
        check_table_name(table)?;
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM \"{}\"", table),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// All rows ordered by identity, as JSON objects keyed by column name.
    pub fn fetch_all(&self, table: &str) -> StoreResult<Vec<Map<String, Value>>> {
        check_table_name(table)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT * FROM \"{}\" ORDER BY \"{}\"",
            table, IDENTITY_COLUMN
        ))?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let rows = stmt.query_map([], |row| {
            let mut obj = Map::new();
            for (i, name) in names.iter().enumerate() {
                let value = match row.get_ref(i)? {
                    ValueRef::Null => Value::Null,
                    ValueRef::Integer(n) => Value::from(n),
                    ValueRef::Real(f) => Value::from(f),
                    ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                        Value::String(String::from_utf8_lossy(bytes).into_owned())
                    }
                };
                obj.insert(name.clone(), value);
            }
            Ok(obj)
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn check_table_name(table: &str) -> StoreResult<()> {
    if is_sql_identifier(table) {
        Ok(())
    } else {
        Err(StoreError::InvalidTableName(table.to_string()))
    }
}

fn insert_error(err: rusqlite::Error, table: &str, line: usize) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, message)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            StoreError::ConstraintViolation {
                table: table.to_string(),
                line,
                message: message.clone().unwrap_or_else(|| failure.to_string()),
            }
        }
        _ => StoreError::Query(err),
    }
}
