//! DuckDB adapter for the SQL backend
//!
//! Answers the translator's probe requests against a live connection,
//! discovers table schemas and executes generated statements.

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use duckdb::types::{TimeUnit, ValueRef};
use duckdb::Connection;
use pipeql_ir::{ColumnInfo, Value};
use pipeql_sql::DataProbe;
use thiserror::Error;
use tracing::debug;

mod catalog;

pub use catalog::discover_catalog;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("Max rows ({0}) exceeded")]
    RowLimitExceeded(usize),
}

pub struct DuckExecutor {
    conn: Connection,
}

impl DuckExecutor {
    pub fn open_in_memory() -> Result<Self, ExecutionError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, ExecutionError> {
        Ok(Self {
            conn: Connection::open(path)?,
        })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Output columns of `sql` without running it
    pub fn describe_statement(&self, sql: &str) -> Result<Vec<ColumnInfo>, ExecutionError> {
        let describe = format!("DESCRIBE SELECT * FROM ({}) AS described", sql);
        let mut stmt = self.conn.prepare(&describe)?;
        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                    nullable: row.get::<_, String>(2)? == "YES",
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    /// Run `sql`, failing once more than `max_rows` rows come back
    pub fn execute(&self, sql: &str, max_rows: Option<usize>) -> Result<QueryResult, ExecutionError> {
        let columns: Vec<String> = self.describe_statement(sql)?.into_iter().map(|c| c.name).collect();
        debug!(columns = columns.len(), "executing statement");

        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        let mut result_rows = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(cell_value(row.get_ref(i)?));
            }
            result_rows.push(values);

            if let Some(max_rows) = max_rows {
                if result_rows.len() > max_rows {
                    return Err(ExecutionError::RowLimitExceeded(max_rows));
                }
            }
        }

        Ok(QueryResult {
            columns,
            rows: result_rows,
        })
    }
}

impl DataProbe for DuckExecutor {
    fn distinct_values(&self, sql: &str) -> Result<Vec<Value>, String> {
        let result = self.execute(sql, None).map_err(|e| e.to_string())?;
        Ok(result
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect())
    }

    fn describe(&self, sql: &str) -> Result<Vec<ColumnInfo>, String> {
        self.describe_statement(sql).map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// Rows as JSON objects keyed by column name
    pub fn to_json(&self) -> serde_json::Value {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let object: serde_json::Map<String, serde_json::Value> = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().map(Value::to_json))
                    .collect();
                serde_json::Value::Object(object)
            })
            .collect();
        serde_json::Value::Array(rows)
    }

    pub fn column(&self, name: &str) -> Option<Vec<Value>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[index].clone()).collect())
    }
}

/// Days between 0001-01-01 and 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

/// Dates and timestamps come back as ISO text
fn cell_value(cell: ValueRef<'_>) -> Value {
    match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(i) => Value::Int(i.into()),
        ValueRef::SmallInt(i) => Value::Int(i.into()),
        ValueRef::Int(i) => Value::Int(i.into()),
        ValueRef::BigInt(i) => Value::Int(i),
        ValueRef::HugeInt(i) => i64::try_from(i).map(Value::Int).unwrap_or(Value::Float(i as f64)),
        ValueRef::UTinyInt(i) => Value::Int(i.into()),
        ValueRef::USmallInt(i) => Value::Int(i.into()),
        ValueRef::UInt(i) => Value::Int(i.into()),
        ValueRef::UBigInt(i) => i64::try_from(i).map(Value::Int).unwrap_or(Value::Float(i as f64)),
        ValueRef::Float(f) => Value::Float(f.into()),
        ValueRef::Double(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Date32(days) => NaiveDate::from_num_days_from_ce_opt(UNIX_EPOCH_DAYS_FROM_CE + days)
            .map(|date| Value::String(date.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),
        ValueRef::Timestamp(unit, value) => DateTime::<Utc>::from_timestamp_micros(micros(unit, value))
            .map(|ts| Value::String(ts.naive_utc().format("%Y-%m-%d %H:%M:%S").to_string()))
            .unwrap_or(Value::Null),
        other => {
            debug!(data_type = ?other.data_type(), "unsupported DuckDB value read as null");
            Value::Null
        }
    }
}
