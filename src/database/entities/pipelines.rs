use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

/// Pipeline entity: one configured extract/transform/load flow
///
/// `source_config` and `destination_config` hold the connector superset
/// config as JSON; `transformation_steps` and `quality_rules` are ordered
/// JSON arrays deserialized by the transform and quality engines. The order
/// of `transformation_steps` is semantically significant.
///
/// `last_run_at` and `last_status` are mutated only by the pipeline worker.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pipelines")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub workspace_id: i32,
    pub name: String,
    pub description: Option<String>,

    pub source_type: String, // 'postgres', 'mysql', 'sqlite', 'graphql', 'crm'
    #[sea_orm(column_type = "Text")]
    pub source_config: String,
    pub destination_type: String,
    #[sea_orm(column_type = "Text")]
    pub destination_config: String,
    pub mode: String, // 'etl' or 'elt'

    #[sea_orm(column_type = "Text")]
    pub transformation_steps: String,
    #[sea_orm(column_type = "Text")]
    pub quality_rules: String,
    pub schedule_cron: Option<String>,

    pub is_active: bool,
    pub last_run_at: Option<ChronoDateTimeUtc>,
    pub last_status: Option<String>, // 'success' or 'failed'
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::job_executions::Entity")]
    JobExecutions,
}

impl Related<super::job_executions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::JobExecutions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub fn new() -> Self {
        Self {
            id: ActiveValue::NotSet,
            workspace_id: ActiveValue::NotSet,
            name: ActiveValue::NotSet,
            description: ActiveValue::NotSet,
            source_type: ActiveValue::NotSet,
            source_config: Set("{}".to_string()),
            destination_type: ActiveValue::NotSet,
            destination_config: Set("{}".to_string()),
            mode: Set("etl".to_string()),
            transformation_steps: Set("[]".to_string()),
            quality_rules: Set("[]".to_string()),
            schedule_cron: ActiveValue::NotSet,
            is_active: Set(true),
            last_run_at: ActiveValue::NotSet,
            last_status: ActiveValue::NotSet,
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
    /// Whether the pipeline transforms in-process before loading
    pub fn is_etl(&self) -> bool {
        self.mode == "etl"
    }
}
