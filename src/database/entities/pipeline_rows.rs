use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Loaded batch rows, keyed by (pipeline_id, batch_id, row_number)
///
/// The unique composite index over those three columns is what makes the
/// load stage an upsert: a redelivered job writes the same keys and the
/// existing rows are replaced instead of duplicated.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pipeline_rows")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub pipeline_id: i32,
    pub batch_id: String,
    pub row_number: i32,
    #[sea_orm(column_type = "Text")]
    pub data: String,
    pub loaded_at: ChronoDateTimeUtc,
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
