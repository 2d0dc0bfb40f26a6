//! Alert evaluation error types
//!
//! An alert failure is always recorded in alert_history and never propagates
//! past the evaluator loop; these variants exist so the history row and the
//! alert's last_status carry a precise reason.

use thiserror::Error;

use super::ConnectorError;

/// Errors raised while evaluating a single alert
#[derive(Error, Debug)]
pub enum AlertError {
    /// Alert not found by ID
    #[error("Alert {0} not found")]
    NotFound(i32),

    /// Saved query referenced by the alert is missing
    #[error("Saved query {0} not found")]
    QueryNotFound(i32),

    /// Connection referenced by the saved query is missing
    #[error("Connection {0} not found")]
    ConnectionNotFound(i32),

    /// Query executed but returned no rows
    #[error("Query returned no rows")]
    EmptyResult,

    /// Configured column is absent from the result
    #[error("Column '{0}' not present in query result")]
    MissingColumn(String),

    /// Value in the configured column is not coercible to a number
    #[error("Value in column '{column}' is not numeric: {value}")]
    NonNumericValue { column: String, value: String },

    /// Operator string on the alert record is unknown
    #[error("Unknown comparison operator: {0}")]
    UnknownOperator(String),

    /// Underlying connector failure
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}
