//! Domain-specific error types for meridian
//!
//! One module per domain, mirroring the subsystem boundaries:
//!
//! - **ConnectorError**: source connectivity, auth, and query execution
//! - **PipelineError**: job orchestration, including the quality gate
//! - **TransformError**: transformation step failures
//! - **AlertError**: alert evaluation failures (always isolated per alert)

pub mod alert;
pub mod connector;
pub mod pipeline;
pub mod transform;

pub use alert::AlertError;
pub use connector::ConnectorError;
pub use pipeline::PipelineError;
pub use transform::TransformError;

/// Result type alias for connector operations
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Result type alias for pipeline job operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type alias for transform operations
pub type TransformResult<T> = Result<T, TransformError>;

/// Result type alias for alert evaluation
pub type AlertResult<T> = Result<T, AlertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_result_alias() {
        let result: PipelineResult<()> = Err(PipelineError::NotFound(42));
        assert!(result.is_err());
    }

    #[test]
    fn test_connector_result_alias() {
        let result: ConnectorResult<()> =
            Err(ConnectorError::UnknownType("mongodb".to_string()));
        assert!(result.is_err());
    }
}
