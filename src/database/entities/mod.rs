pub mod alert_history;
pub mod alerts;
pub mod connections;
pub mod job_executions;
pub mod job_status;
pub mod pipeline_rows;
pub mod pipelines;
pub mod saved_queries;

pub use job_status::{JobStatus, RunStatus};
