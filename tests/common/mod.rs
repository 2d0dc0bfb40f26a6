//! Shared harness for integration tests: in-memory database plus a
//! registry-backed stub connector that serves rows straight out of its
//! config, so pipelines and alerts can run end-to-end without a network.

// each test binary uses a different subset of these helpers
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, Set};
use sea_orm_migration::MigratorTrait;
use serde_json::Value;

use meridian::connectors::{
    self, projection, Connector, ConnectorConfig, QueryResult, Record, SourceSchema,
};
use meridian::database::entities::{connections, job_executions, pipelines, JobStatus};
use meridian::database::migrations::Migrator;
use meridian::errors::{ConnectorError, ConnectorResult};

pub async fn setup_db() -> DatabaseConnection {
    // one pooled connection: an in-memory SQLite database exists per
    // connection, and the queue's worker tasks must see the same one
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .expect("Failed to connect to test database");
    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");
    db
}

/// Test connector: rows come from `extra_config.rows`, an optional
/// `delay_ms` slows execution down for overlap tests, and `fail` makes
/// every query fail with a transient connection error.
pub struct StaticConnector {
    rows: Vec<Record>,
    delay: Duration,
    fail: bool,
}

#[async_trait]
impl Connector for StaticConnector {
    async fn test_connection(&self) -> ConnectorResult<()> {
        if self.fail {
            return Err(ConnectorError::ConnectionFailed {
                endpoint: "static".to_string(),
                reason: "configured to fail".to_string(),
            });
        }
        Ok(())
    }

    async fn fetch_schema(&self) -> ConnectorResult<SourceSchema> {
        Ok(SourceSchema::default())
    }

    async fn execute_query(&self, sql: &str) -> ConnectorResult<QueryResult> {
        if self.fail {
            return Err(ConnectorError::ConnectionFailed {
                endpoint: "static".to_string(),
                reason: "configured to fail".to_string(),
            });
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        projection::execute_projection(&self.rows, sql)
    }

    async fn disconnect(&self) -> ConnectorResult<()> {
        Ok(())
    }
}

/// Register the stub under the `static` type tag. Safe to call from every
/// test; registration is idempotent.
pub fn register_static_connector() {
    connectors::register(
        "static",
        Arc::new(|config: &ConnectorConfig| {
            let rows = config
                .extra_config
                .get("rows")
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| match item {
                            Value::Object(map) => Some(map.clone()),
                            _ => None,
                        })
                        .collect()
                })
                .unwrap_or_default();
            let delay = config
                .extra_config
                .get("delay_ms")
                .and_then(|v| v.as_u64())
                .map(Duration::from_millis)
                .unwrap_or(Duration::ZERO);
            let fail = config
                .extra_config
                .get("fail")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);

            Ok(Box::new(StaticConnector { rows, delay, fail }) as Box<dyn Connector>)
        }),
    );
}

/// Source config JSON for a pipeline backed by the stub connector
pub fn static_source_config(rows: Value, extra: &[(&str, Value)]) -> String {
    let mut config = serde_json::json!({
        "extra_config": { "rows": rows, "query": "SELECT * FROM source" }
    });
    for (key, value) in extra {
        config["extra_config"][*key] = value.clone();
    }
    config.to_string()
}

pub async fn insert_pipeline(
    db: &DatabaseConnection,
    source_config: String,
    steps: Value,
    rules: Value,
    mode: &str,
) -> pipelines::Model {
    pipelines::ActiveModel {
        workspace_id: Set(1),
        name: Set("test pipeline".to_string()),
        source_type: Set("static".to_string()),
        source_config: Set(source_config),
        destination_type: Set("warehouse".to_string()),
        mode: Set(mode.to_string()),
        transformation_steps: Set(steps.to_string()),
        quality_rules: Set(rules.to_string()),
        ..pipelines::ActiveModel::new()
    }
    .insert(db)
    .await
    .expect("Failed to insert pipeline")
}

/// Stub-backed connection record for alert tests
pub async fn insert_static_connection(db: &DatabaseConnection, rows: Value) -> connections::Model {
    connections::ActiveModel {
        workspace_id: Set(1),
        name: Set("static source".to_string()),
        connector_type: Set("static".to_string()),
        extra_config: Set(serde_json::json!({ "rows": rows }).to_string()),
        ..connections::ActiveModel::new()
    }
    .insert(db)
    .await
    .expect("Failed to insert connection")
}

/// Poll an execution until it reaches a terminal state
pub async fn wait_for_terminal(
    db: &DatabaseConnection,
    execution_id: i32,
    timeout: Duration,
) -> job_executions::Model {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let execution = job_executions::Entity::find_by_id(execution_id)
            .one(db)
            .await
            .expect("query failed")
            .expect("execution vanished");
        match execution.job_status() {
            Some(JobStatus::Completed) | Some(JobStatus::Failed)
                if execution.completed_at.is_some() =>
            {
                return execution
            }
            _ => {}
        }
        if tokio::time::Instant::now() > deadline {
            panic!(
                "execution {} still '{}' after {:?}",
                execution_id, execution.status, timeout
            );
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
