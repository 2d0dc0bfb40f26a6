use serde::{Deserialize, Serialize};

/// Execution status for pipeline jobs
///
/// A job is created `Pending` at enqueue time, moves to `Processing` when a
/// worker claims it, and ends `Completed` or `Failed`. The queue may re-open
/// a `Failed` job while retry attempts remain; once the attempt budget is
/// exhausted the terminal state is never touched again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is queued and waiting for a worker
    Pending,
    /// A worker holds the exclusive claim and is running the stages
    Processing,
    /// All stages finished and the batch was loaded
    Completed,
    /// A stage failed; may be re-opened by the retry policy
    Failed,
}

impl JobStatus {
    /// Convert to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Parse from database string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Whether the job still occupies its pipeline's run slot
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }
}

/// Pipeline-level outcome recorded after each run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        let states = vec![
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ];

        for state in states {
            assert_eq!(JobStatus::from_str(state.as_str()), Some(state));
        }
        assert_eq!(JobStatus::from_str("cancelled"), None);
    }

    #[test]
    fn test_active_states() {
        assert!(JobStatus::Pending.is_active());
        assert!(JobStatus::Processing.is_active());
        assert!(!JobStatus::Completed.is_active());
        assert!(!JobStatus::Failed.is_active());
    }
}
