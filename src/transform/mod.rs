//! Transformation engine
//!
//! A pure, deterministic function from (rows, steps) to rows. Steps apply
//! strictly in list order: step i's output is step i+1's input. The engine
//! never touches the database or the network; the worker owns persistence
//! and logging around it.

mod engine;

pub use engine::{apply, StepSummary, TransformOutcome};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Target primitive for the cast step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastType {
    Integer,
    Real,
    Boolean,
    Text,
    Timestamp,
}

impl CastType {
    pub fn as_column_type(&self) -> crate::connectors::ColumnType {
        match self {
            CastType::Integer => crate::connectors::ColumnType::Integer,
            CastType::Real => crate::connectors::ColumnType::Real,
            CastType::Boolean => crate::connectors::ColumnType::Boolean,
            CastType::Text => crate::connectors::ColumnType::Text,
            CastType::Timestamp => crate::connectors::ColumnType::Timestamp,
        }
    }
}

/// Comparison operator for the filter step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    GtEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    LtEq,
}

/// One column-level operation, as stored on the pipeline record.
///
/// The JSON wire form is `{"type": "trim", "column": "name"}` and so on;
/// list position carries the application order.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformStep {
    /// Strip surrounding whitespace from a string column
    Trim { column: String },
    /// Remap a column key across all rows
    Rename { from: String, to: String },
    /// Coerce a column to a target primitive; non-coercible values become
    /// null unless fail_fast is set
    Cast {
        column: String,
        to: CastType,
        #[serde(default)]
        fail_fast: bool,
    },
    /// Retain rows matching (column op value)
    Filter {
        column: String,
        op: FilterOp,
        value: Value,
    },
    /// Remove exact duplicates on a key set, keeping first occurrence
    Dedupe { columns: Vec<String> },
    /// Compute a new column from a scalar expression over existing columns
    Derive { column: String, expression: String },
}

impl TransformStep {
    /// Short tag for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            TransformStep::Trim { .. } => "trim",
            TransformStep::Rename { .. } => "rename",
            TransformStep::Cast { .. } => "cast",
            TransformStep::Filter { .. } => "filter",
            TransformStep::Dedupe { .. } => "dedupe",
            TransformStep::Derive { .. } => "derive",
        }
    }
}

/// Parse the steps column of a pipeline record
pub fn parse_steps(json: &str) -> Result<Vec<TransformStep>, serde_json::Error> {
    serde_json::from_str(json)
}
