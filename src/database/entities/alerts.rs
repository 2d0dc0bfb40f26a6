use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

/// Alert entity: a threshold watch over a saved query
///
/// `last_run_at` and `last_status` are mutated by the alert evaluator each
/// cycle; everything else is CRUD-owned.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "alerts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub query_id: i32,
    pub name: String,

    pub column_name: String,
    pub operator: String, // '>', '<', '>=', '<=', '=', '!='
    pub threshold: f64,
    pub schedule_cron: Option<String>,

    pub email: Option<String>,
    pub webhook_url: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub webhook_headers: String,

    pub is_active: bool,
    pub last_run_at: Option<ChronoDateTimeUtc>,
    pub last_status: Option<String>, // 'triggered', 'ok', 'error'
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::saved_queries::Entity",
        from = "Column::QueryId",
        to = "super::saved_queries::Column::Id"
    )]
    SavedQueries,
    #[sea_orm(has_many = "super::alert_history::Entity")]
    AlertHistory,
}

impl Related<super::saved_queries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SavedQueries.def()
    }
}

impl Related<super::alert_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AlertHistory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub fn new() -> Self {
        Self {
            id: ActiveValue::NotSet,
            query_id: ActiveValue::NotSet,
            name: ActiveValue::NotSet,
            column_name: ActiveValue::NotSet,
            operator: ActiveValue::NotSet,
            threshold: ActiveValue::NotSet,
            schedule_cron: ActiveValue::NotSet,
            email: ActiveValue::NotSet,
            webhook_url: ActiveValue::NotSet,
            webhook_headers: Set("{}".to_string()),
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
