use anyhow::{anyhow, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};

use crate::database::entities::{alert_history, alerts, connections, saved_queries};

const HISTORY_PAGE: u64 = 100;

const OPERATORS: [&str; 6] = [">", "<", ">=", "<=", "=", "!="];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SavedQueryDraft {
    pub connection_id: i32,
    pub name: String,
    pub sql_text: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlertDraft {
    pub query_id: i32,
    pub name: String,
    pub column_name: String,
    pub operator: String,
    pub threshold: f64,
    pub schedule_cron: Option<String>,
    pub email: Option<String>,
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub webhook_headers: serde_json::Value,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// CRUD for saved queries, alerts, and alert history
#[derive(Clone)]
pub struct AlertService {
    db: DatabaseConnection,
}

impl AlertService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create_query(&self, draft: SavedQueryDraft) -> Result<saved_queries::Model> {
        connections::Entity::find_by_id(draft.connection_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| anyhow!("Connection {} not found", draft.connection_id))?;

        Ok(saved_queries::ActiveModel {
            connection_id: Set(draft.connection_id),
            name: Set(draft.name),
            sql_text: Set(draft.sql_text),
            ..saved_queries::ActiveModel::new()
        }
        .insert(&self.db)
        .await?)
    }

    pub async fn list_queries(&self) -> Result<Vec<saved_queries::Model>> {
        Ok(saved_queries::Entity::find()
            .order_by_asc(saved_queries::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn delete_query(&self, id: i32) -> Result<()> {
        saved_queries::Entity::delete_by_id(id)
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn create_alert(&self, draft: AlertDraft) -> Result<alerts::Model> {
        self.validate_alert(&draft).await?;

        Ok(alerts::ActiveModel {
            query_id: Set(draft.query_id),
            name: Set(draft.name),
            column_name: Set(draft.column_name),
            operator: Set(draft.operator),
            threshold: Set(draft.threshold),
            schedule_cron: Set(draft.schedule_cron),
            email: Set(draft.email),
            webhook_url: Set(draft.webhook_url),
            webhook_headers: Set(normalize_object(&draft.webhook_headers)),
            is_active: Set(draft.is_active),
            ..alerts::ActiveModel::new()
        }
        .insert(&self.db)
        .await?)
    }

    pub async fn update_alert(&self, id: i32, draft: AlertDraft) -> Result<alerts::Model> {
        self.validate_alert(&draft).await?;

        let existing = self
            .get_alert(id)
            .await?
            .ok_or_else(|| anyhow!("Alert {} not found", id))?;

        let mut active: alerts::ActiveModel = existing.into();
        active.query_id = Set(draft.query_id);
        active.name = Set(draft.name);
        active.column_name = Set(draft.column_name);
        active.operator = Set(draft.operator);
        active.threshold = Set(draft.threshold);
        active.schedule_cron = Set(draft.schedule_cron);
        active.email = Set(draft.email);
        active.webhook_url = Set(draft.webhook_url);
        active.webhook_headers = Set(normalize_object(&draft.webhook_headers));
        active.is_active = Set(draft.is_active);

        Ok(active.set_updated_at().update(&self.db).await?)
    }

    async fn validate_alert(&self, draft: &AlertDraft) -> Result<()> {
        if !OPERATORS.contains(&draft.operator.as_str()) {
            return Err(anyhow!("unknown operator '{}'", draft.operator));
        }
        saved_queries::Entity::find_by_id(draft.query_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| anyhow!("Saved query {} not found", draft.query_id))?;
        Ok(())
    }

    pub async fn get_alert(&self, id: i32) -> Result<Option<alerts::Model>> {
        Ok(alerts::Entity::find_by_id(id).one(&self.db).await?)
    }

    pub async fn list_alerts(&self) -> Result<Vec<alerts::Model>> {
        Ok(alerts::Entity::find()
            .order_by_asc(alerts::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn delete_alert(&self, id: i32) -> Result<()> {
        alerts::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(())
    }

    /// Newest-first evaluation history for one alert
    pub async fn alert_history(&self, alert_id: i32) -> Result<Vec<alert_history::Model>> {
        self.get_alert(alert_id)
            .await?
            .ok_or_else(|| anyhow!("Alert {} not found", alert_id))?;

        Ok(alert_history::Entity::find()
            .filter(alert_history::Column::AlertId.eq(alert_id))
            .order_by_desc(alert_history::Column::Id)
            .limit(HISTORY_PAGE)
            .all(&self.db)
            .await?)
    }
}

fn normalize_object(value: &serde_json::Value) -> String {
    if value.is_null() {
        "{}".to_string()
    } else {
        value.to_string()
    }
}
