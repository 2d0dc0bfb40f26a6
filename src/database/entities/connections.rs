use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

/// Connection entity: stored credentials for one external source
///
/// The column set is a superset covering SQL databases, GraphQL APIs and
/// REST/CRM systems; each connector validates only the subset it needs.
/// `password` and `auth_token` are never serialized into API responses.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "connections")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub workspace_id: i32,
    pub name: String,
    pub connector_type: String,

    pub host: Option<String>,
    pub port: Option<i32>,
    pub database_name: Option<String>,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub api_url: Option<String>,
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub extra_config: String,

    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::saved_queries::Entity")]
    SavedQueries,
}

impl Related<super::saved_queries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SavedQueries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub fn new() -> Self {
        Self {
            id: ActiveValue::NotSet,
            workspace_id: ActiveValue::NotSet,
            name: ActiveValue::NotSet,
            connector_type: ActiveValue::NotSet,
            host: ActiveValue::NotSet,
            port: ActiveValue::NotSet,
            database_name: ActiveValue::NotSet,
            username: ActiveValue::NotSet,
            password: ActiveValue::NotSet,
            api_url: ActiveValue::NotSet,
            auth_token: ActiveValue::NotSet,
            extra_config: Set("{}".to_string()),
            created_at: Set(chrono::Utc::now()),
            updated_at: Set(chrono::Utc::now()),
        }
    }

    pub fn set_updated_at(mut self) -> Self {
        self.updated_at = Set(chrono::Utc::now());
        self
    }
}
