use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

use super::job_status::JobStatus;

/// JobExecution entity: one timestamped attempt to run a pipeline
///
/// Created `pending` at enqueue time and mutated exclusively by the worker
/// and the queue's retry policy. `log` holds newline-joined stage-tagged
/// lines; `batch_id` is the idempotency key the load stage upserts under, so
/// a redelivered job never duplicates rows.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "job_executions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub pipeline_id: i32,
    pub status: String, // 'pending', 'processing', 'completed', 'failed'
    pub attempts: i32,
    pub batch_id: String,

    pub started_at: Option<ChronoDateTimeUtc>,
    pub completed_at: Option<ChronoDateTimeUtc>,
    pub duration_ms: Option<i64>,
    pub rows_processed: Option<i64>,
    #[sea_orm(column_type = "Text")]
    pub log: String,
    pub error: Option<String>,
    pub batch_fingerprint: Option<String>,

    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::pipelines::Entity",
        from = "Column::PipelineId",
        to = "super::pipelines::Column::Id"
    )]
    Pipelines,
}

impl Related<super::pipelines::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Pipelines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub fn new() -> Self {
        Self {
            id: ActiveValue::NotSet,
            pipeline_id: ActiveValue::NotSet,
            status: Set(JobStatus::Pending.as_str().to_string()),
            attempts: Set(0),
            batch_id: ActiveValue::NotSet,
            started_at: ActiveValue::NotSet,
            completed_at: ActiveValue::NotSet,
            duration_ms: ActiveValue::NotSet,
            rows_processed: ActiveValue::NotSet,
            log: Set(String::new()),
            error: ActiveValue::NotSet,
            batch_fingerprint: ActiveValue::NotSet,
            created_at: Set(chrono::Utc::now()),
            updated_at: Set(chrono::Utc::now()),
        }
    }

    pub fn set_updated_at(mut self) -> Self {
        self.updated_at = Set(chrono::Utc::now());
        self
    }
}

impl Model {
    /// Typed view of the status column
    pub fn job_status(&self) -> Option<JobStatus> {
        JobStatus::from_str(&self.status)
    }

    /// Whether this execution still occupies its pipeline's run slot
    pub fn is_active(&self) -> bool {
        self.job_status().map(|s| s.is_active()).unwrap_or(false)
    }

    /// Execution log as individual lines
    pub fn log_lines(&self) -> Vec<&str> {
        if self.log.is_empty() {
            Vec::new()
        } else {
            self.log.lines().collect()
        }
    }
}
