//! Transformation engine error types

use thiserror::Error;

/// Errors raised by the transformation engine
#[derive(Error, Debug)]
pub enum TransformError {
    /// Cast configured fail-fast hit a non-coercible value
    #[error("Step {step}: value at row {row} cannot be cast to {target}")]
    CastFailed {
        step: usize,
        row: usize,
        target: String,
    },

    /// Derive expression could not be parsed or evaluated
    #[error("Step {step}: invalid derive expression: {reason}")]
    InvalidExpression { step: usize, reason: String },

    /// Step parameters are malformed
    #[error("Step {step}: {reason}")]
    InvalidStep { step: usize, reason: String },
}
