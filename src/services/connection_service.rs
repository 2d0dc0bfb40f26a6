use anyhow::{anyhow, Result};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};

use crate::connectors::{self, ConnectorConfig, SourceSchema};
use crate::database::entities::connections;

/// Incoming connection definition
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionDraft {
    pub workspace_id: i32,
    pub name: String,
    pub connector_type: String,
    pub host: Option<String>,
    pub port: Option<i32>,
    pub database_name: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub api_url: Option<String>,
    pub auth_token: Option<String>,
    #[serde(default)]
    pub extra_config: serde_json::Value,
}

/// Connection CRUD plus the test/schema passthroughs to live connectors
#[derive(Clone)]
pub struct ConnectionService {
    db: DatabaseConnection,
}

impl ConnectionService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, draft: ConnectionDraft) -> Result<connections::Model> {
        if !connectors::registered_types().contains(&draft.connector_type) {
            return Err(anyhow!("unknown connector type '{}'", draft.connector_type));
        }

        let connection = connections::ActiveModel {
            workspace_id: Set(draft.workspace_id),
            name: Set(draft.name),
            connector_type: Set(draft.connector_type),
            host: Set(draft.host),
            port: Set(draft.port),
            database_name: Set(draft.database_name),
            username: Set(draft.username),
            password: Set(draft.password),
            api_url: Set(draft.api_url),
            auth_token: Set(draft.auth_token),
            extra_config: Set(normalize_object(&draft.extra_config)),
            ..connections::ActiveModel::new()
        }
        .insert(&self.db)
        .await?;

        Ok(connection)
    }

    pub async fn update(&self, id: i32, draft: ConnectionDraft) -> Result<connections::Model> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| anyhow!("Connection {} not found", id))?;

        let mut active: connections::ActiveModel = existing.into();
        active.workspace_id = Set(draft.workspace_id);
        active.name = Set(draft.name);
        active.connector_type = Set(draft.connector_type);
        active.host = Set(draft.host);
        active.port = Set(draft.port);
        active.database_name = Set(draft.database_name);
        active.username = Set(draft.username);
        active.password = Set(draft.password);
        active.api_url = Set(draft.api_url);
        active.auth_token = Set(draft.auth_token);
        active.extra_config = Set(normalize_object(&draft.extra_config));

        Ok(active.set_updated_at().update(&self.db).await?)
    }

    pub async fn get(&self, id: i32) -> Result<Option<connections::Model>> {
        Ok(connections::Entity::find_by_id(id).one(&self.db).await?)
    }

    pub async fn list(&self, workspace_id: Option<i32>) -> Result<Vec<connections::Model>> {
        let mut query = connections::Entity::find().order_by_asc(connections::Column::Id);
        if let Some(workspace_id) = workspace_id {
            query = query.filter(connections::Column::WorkspaceId.eq(workspace_id));
        }
        Ok(query.all(&self.db).await?)
    }

    pub async fn delete(&self, id: i32) -> Result<()> {
        connections::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(())
    }

    /// Probe the stored credentials against the live source.
    /// Returns Ok(None) on success, Ok(Some(reason)) on failure; the
    /// distinction between "unreachable" and "bad request" stays in `reason`.
    pub async fn test_connection(&self, id: i32) -> Result<Option<String>> {
        let connection = self
            .get(id)
            .await?
            .ok_or_else(|| anyhow!("Connection {} not found", id))?;

        let config = ConnectorConfig::from_connection(&connection);
        let outcome = connectors::with_connector(&config, |connector| {
            Box::pin(async move { connector.test_connection().await })
        })
        .await;

        match outcome {
            Ok(()) => Ok(None),
            Err(e) => Ok(Some(e.to_string())),
        }
    }

    /// Fetch the live schema of the source behind a stored connection.
    pub async fn fetch_schema(&self, id: i32) -> Result<SourceSchema> {
        let connection = self
            .get(id)
            .await?
            .ok_or_else(|| anyhow!("Connection {} not found", id))?;

        let config = ConnectorConfig::from_connection(&connection);
        let schema = connectors::with_connector(&config, |connector| {
            Box::pin(async move { connector.fetch_schema().await })
        })
        .await?;
        Ok(schema)
    }
}

fn normalize_object(value: &serde_json::Value) -> String {
    if value.is_null() {
        "{}".to_string()
    } else {
        value.to_string()
    }
}
