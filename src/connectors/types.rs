//! Value objects shared by every connector implementation
//!
//! All sources, whatever their wire protocol, normalize into these types:
//! canonical column types, a table/column schema tree, and a tabular
//! [`QueryResult`] whose rows are JSON objects.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};

/// One row of source data, column name to value
pub type Record = JsonMap<String, Value>;

/// Canonical column types every origin-native type coerces into
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Integer,
    Real,
    Boolean,
    Text,
    Timestamp,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Text => "TEXT",
            ColumnType::Timestamp => "TIMESTAMP",
        }
    }

    /// Map an origin-native type name (SQL or GraphQL scalar) onto a
    /// canonical type. Unknown names fall back to TEXT.
    pub fn from_native(name: &str) -> Self {
        let lowered = name.to_ascii_lowercase();
        match lowered.as_str() {
            "int" | "int2" | "int4" | "int8" | "integer" | "bigint" | "smallint" | "serial"
            | "bigserial" | "tinyint" | "mediumint" => ColumnType::Integer,
            "real" | "float" | "float4" | "float8" | "double" | "double precision" | "numeric"
            | "decimal" => ColumnType::Real,
            "bool" | "boolean" => ColumnType::Boolean,
            "timestamp" | "timestamptz" | "datetime" | "date" | "time" => ColumnType::Timestamp,
            _ => ColumnType::Text,
        }
    }

    /// Infer a canonical type from a JSON sample value
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Bool(_) => ColumnType::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => ColumnType::Integer,
            Value::Number(_) => ColumnType::Real,
            Value::String(s) if parse_timestamp(s).is_some() => ColumnType::Timestamp,
            _ => ColumnType::Text,
        }
    }
}

/// Column descriptor within a table
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub nullable: bool,
    pub is_primary: bool,
    pub is_foreign: bool,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            is_primary: false,
            is_foreign: false,
        }
    }
}

/// One table (or collection) exposed by a source
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

/// Full schema of a source
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceSchema {
    pub tables: Vec<TableSchema>,
}

/// Tabular result of a query, column order preserved
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
    pub row_count: usize,
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Record>, execution_time_ms: u64) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
            execution_time_ms,
        }
    }

}

/// Coerce an origin value into a canonical column type.
///
/// Non-coercible values become `Null` instead of failing the batch; sources
/// routinely hand back dirty data and a single bad cell must not abort an
/// extract.
pub fn coerce_value(value: &Value, target: ColumnType) -> Value {
    if value.is_null() {
        return Value::Null;
    }

    match target {
        ColumnType::Integer => match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map(Value::from)
                .unwrap_or(Value::Null),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .ok()
                .map(Value::from)
                .unwrap_or(Value::Null),
            Value::Bool(b) => Value::from(if *b { 1 } else { 0 }),
            _ => Value::Null,
        },
        ColumnType::Real => match value {
            Value::Number(n) => n.as_f64().map(Value::from).unwrap_or(Value::Null),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .map(Value::from)
                .unwrap_or(Value::Null),
            _ => Value::Null,
        },
        ColumnType::Boolean => match value {
            Value::Bool(b) => Value::Bool(*b),
            Value::Number(n) => Value::Bool(n.as_i64() == Some(1)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "1" => Value::Bool(true),
                "false" | "f" | "no" | "0" => Value::Bool(false),
                _ => Value::Null,
            },
            _ => Value::Null,
        },
        ColumnType::Text => match value {
            Value::String(s) => Value::String(s.clone()),
            Value::Number(n) => Value::String(n.to_string()),
            Value::Bool(b) => Value::String(b.to_string()),
            other => Value::String(other.to_string()),
        },
        ColumnType::Timestamp => match value {
            Value::String(s) => parse_timestamp(s)
                .map(|dt| Value::String(dt.to_rfc3339()))
                .unwrap_or(Value::Null),
            // Unix epoch seconds
            Value::Number(n) => n
                .as_i64()
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
                .map(|dt| Value::String(dt.to_rfc3339()))
                .unwrap_or(Value::Null),
            _ => Value::Null,
        },
    }
}

/// Coerce every column of a fetched record set into the canonical type
/// inferred from its first non-null sample; nested objects and arrays
/// flatten to their JSON text. Both API connectors run their raw pages
/// through this before handing rows to the projection evaluator.
pub fn normalize_records(records: Vec<Record>) -> Vec<Record> {
    let mut column_types: std::collections::HashMap<String, ColumnType> =
        std::collections::HashMap::new();
    for record in &records {
        for (key, value) in record {
            if !value.is_null() && !column_types.contains_key(key) {
                column_types.insert(key.clone(), ColumnType::infer(value));
            }
        }
    }

    records
        .into_iter()
        .map(|record| {
            record
                .into_iter()
                .map(|(key, value)| {
                    let coerced = match &value {
                        Value::Object(_) | Value::Array(_) => Value::String(value.to_string()),
                        _ => match column_types.get(&key) {
                            Some(ty) => coerce_value(&value, *ty),
                            None => value,
                        },
                    };
                    (key, coerced)
                })
                .collect()
        })
        .collect()
}

/// Parse the timestamp formats sources commonly emit
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}
