//! Alert evaluation and notification dispatch
//!
//! The evaluator is driven by an external periodic trigger (the evaluate
//! endpoint); it never schedules itself. Each cycle re-runs every active
//! alert's saved query through a connector, compares the result against the
//! alert's threshold, dispatches notifications on trigger, and writes
//! exactly one history row per evaluation — success, trigger, or error.

mod evaluator;
mod notify;

pub use evaluator::{AlertEvaluator, CycleSummary};
pub use notify::{AlertNotification, AlertNotifier, DefaultNotifier, SmtpSettings};

/// Outcome of one alert evaluation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertStatus {
    /// Threshold condition held
    Triggered,
    /// Query ran, condition did not hold
    Ok,
    /// Evaluation itself failed (query error, missing column, non-numeric value)
    Error,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Triggered => "triggered",
            AlertStatus::Ok => "ok",
            AlertStatus::Error => "error",
        }
    }
}
