use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};

use crate::connectors;
use crate::database::entities::{job_executions, pipelines};
use crate::errors::{PipelineError, PipelineResult};
use crate::queue::JobQueue;
use crate::{quality, transform};

/// Incoming pipeline definition, shared by create and update
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineDraft {
    pub workspace_id: i32,
    pub name: String,
    pub description: Option<String>,
    pub source_type: String,
    pub source_config: serde_json::Value,
    pub destination_type: String,
    #[serde(default)]
    pub destination_config: serde_json::Value,
    pub mode: String,
    #[serde(default)]
    pub transformation_steps: serde_json::Value,
    #[serde(default)]
    pub quality_rules: serde_json::Value,
    pub schedule_cron: Option<String>,
}

/// CRUD and run-now entry points for pipelines
#[derive(Clone)]
pub struct PipelineService {
    db: DatabaseConnection,
    queue: Arc<JobQueue>,
}

impl PipelineService {
    pub fn new(db: DatabaseConnection, queue: Arc<JobQueue>) -> Self {
        Self { db, queue }
    }

    /// Validate a draft before it reaches storage: a bad step list or rule
    /// set should be a 4xx at write time, not a failed run later.
    fn validate(draft: &PipelineDraft) -> PipelineResult<()> {
        if draft.name.trim().is_empty() {
            return Err(PipelineError::Configuration("name must not be empty".into()));
        }
        if !matches!(draft.mode.as_str(), "etl" | "elt") {
            return Err(PipelineError::Configuration(format!(
                "mode must be 'etl' or 'elt', got '{}'",
                draft.mode
            )));
        }
        if !connectors::registered_types().contains(&draft.source_type) {
            return Err(PipelineError::Configuration(format!(
                "unknown source type '{}'",
                draft.source_type
            )));
        }

        let steps_json = draft.transformation_steps.to_string();
        if !draft.transformation_steps.is_null() {
            transform::parse_steps(&steps_json).map_err(|e| {
                PipelineError::Configuration(format!("transformation steps: {e}"))
            })?;
        }
        let rules_json = draft.quality_rules.to_string();
        if !draft.quality_rules.is_null() {
            quality::parse_rules(&rules_json)
                .map_err(|e| PipelineError::Configuration(format!("quality rules: {e}")))?;
        }
        Ok(())
    }

    pub async fn create(&self, draft: PipelineDraft) -> PipelineResult<pipelines::Model> {
        Self::validate(&draft)?;

        let pipeline = pipelines::ActiveModel {
            workspace_id: Set(draft.workspace_id),
            name: Set(draft.name),
            description: Set(draft.description),
            source_type: Set(draft.source_type),
            source_config: Set(normalize_object(&draft.source_config)),
            destination_type: Set(draft.destination_type),
            destination_config: Set(normalize_object(&draft.destination_config)),
            mode: Set(draft.mode),
            transformation_steps: Set(normalize_array(&draft.transformation_steps)),
            quality_rules: Set(normalize_array(&draft.quality_rules)),
            schedule_cron: Set(draft.schedule_cron),
            ..pipelines::ActiveModel::new()
        }
        .insert(&self.db)
        .await?;

        tracing::info!("Created pipeline {} ({})", pipeline.id, pipeline.name);
        Ok(pipeline)
    }

    pub async fn update(&self, id: i32, draft: PipelineDraft) -> PipelineResult<pipelines::Model> {
        Self::validate(&draft)?;

        let existing = self.get(id).await?;
        let mut active: pipelines::ActiveModel = existing.into();
        active.workspace_id = Set(draft.workspace_id);
        active.name = Set(draft.name);
        active.description = Set(draft.description);
        active.source_type = Set(draft.source_type);
        active.source_config = Set(normalize_object(&draft.source_config));
        active.destination_type = Set(draft.destination_type);
        active.destination_config = Set(normalize_object(&draft.destination_config));
        active.mode = Set(draft.mode);
        active.transformation_steps = Set(normalize_array(&draft.transformation_steps));
        active.quality_rules = Set(normalize_array(&draft.quality_rules));
        active.schedule_cron = Set(draft.schedule_cron);

        Ok(active.set_updated_at().update(&self.db).await?)
    }

    pub async fn get(&self, id: i32) -> PipelineResult<pipelines::Model> {
        pipelines::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(PipelineError::NotFound(id))
    }

    pub async fn list(&self, workspace_id: Option<i32>) -> PipelineResult<Vec<pipelines::Model>> {
        let mut query = pipelines::Entity::find().order_by_asc(pipelines::Column::Id);
        if let Some(workspace_id) = workspace_id {
            query = query.filter(pipelines::Column::WorkspaceId.eq(workspace_id));
        }
        Ok(query.all(&self.db).await?)
    }

    pub async fn delete(&self, id: i32) -> PipelineResult<()> {
        let pipeline = self.get(id).await?;
        pipelines::Entity::delete_by_id(pipeline.id)
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Manual trigger: create a PENDING execution and enqueue it.
    pub async fn run_now(&self, id: i32) -> PipelineResult<job_executions::Model> {
        self.queue.enqueue(id).await
    }

    pub async fn list_executions(
        &self,
        pipeline_id: i32,
    ) -> PipelineResult<Vec<job_executions::Model>> {
        // surface a 404 for unknown pipelines rather than an empty list
        self.get(pipeline_id).await?;
        Ok(job_executions::Entity::find()
            .filter(job_executions::Column::PipelineId.eq(pipeline_id))
            .order_by_desc(job_executions::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn get_execution(&self, id: i32) -> PipelineResult<job_executions::Model> {
        job_executions::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(PipelineError::ExecutionNotFound(id))
    }
}

/// Absent step/rule lists are stored as empty arrays
fn normalize_array(value: &serde_json::Value) -> String {
    if value.is_null() {
        "[]".to_string()
    } else {
        value.to_string()
    }
}

/// Absent config objects are stored as empty objects
fn normalize_object(value: &serde_json::Value) -> String {
    if value.is_null() {
        "{}".to_string()
    } else {
        value.to_string()
    }
}
