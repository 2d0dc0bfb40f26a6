//! Pipeline job error types
//!
//! The queue's retry policy keys off [`PipelineError::is_terminal`]:
//! configuration problems and quality-gate aborts will not improve with a
//! retry, while everything classified transient is handed back to the queue
//! for another attempt.

use thiserror::Error;

use super::{ConnectorError, TransformError};

/// Errors raised while executing a pipeline job
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Pipeline not found by ID
    #[error("Pipeline {0} not found")]
    NotFound(i32),

    /// Job execution not found by ID
    #[error("Execution {0} not found")]
    ExecutionNotFound(i32),

    /// A non-terminal execution already exists for this pipeline
    #[error("Pipeline {0} already has a run in progress")]
    AlreadyRunning(i32),

    /// Pipeline record is malformed (invalid steps, rules, or mode)
    #[error("Invalid pipeline configuration: {0}")]
    Configuration(String),

    /// A FAIL-severity quality rule was violated; the run is aborted by design
    #[error("Quality gate failed: {violations} violation(s) on column(s) {columns}")]
    QualityGate {
        /// Number of FAIL-severity violations
        violations: usize,
        /// Comma-joined list of offending columns
        columns: String,
    },

    /// Source connector failure during extract
    #[error("Extract failed: {0}")]
    Extract(#[from] ConnectorError),

    /// Transformation stage failure
    #[error("Transform failed: {0}")]
    Transform(#[from] TransformError),

    /// Load stage failure
    #[error("Load failed: {0}")]
    Load(String),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl PipelineError {
    /// Terminal errors are never retried by the queue.
    pub fn is_terminal(&self) -> bool {
        match self {
            PipelineError::Configuration(_)
            | PipelineError::QualityGate { .. }
            | PipelineError::NotFound(_)
            | PipelineError::ExecutionNotFound(_)
            | PipelineError::AlreadyRunning(_) => true,
            PipelineError::Extract(e) => !e.is_transient(),
            PipelineError::Transform(_) => true,
            PipelineError::Load(_) | PipelineError::Database(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_gate_is_terminal() {
        let err = PipelineError::QualityGate {
            violations: 3,
            columns: "email".to_string(),
        };
        assert!(err.is_terminal());
    }

    #[test]
    fn test_transient_extract_is_retryable() {
        let err = PipelineError::Extract(ConnectorError::Timeout(30_000));
        assert!(!err.is_terminal());
    }

    #[test]
    fn test_config_extract_is_terminal() {
        let err = PipelineError::Extract(ConnectorError::InvalidConfig("no host".to_string()));
        assert!(err.is_terminal());
    }
}
