//! Multi-source connector abstraction
//!
//! Every external system — SQL databases, GraphQL APIs, REST/CRM systems —
//! is adapted into the one [`Connector`] contract: test the connection,
//! describe the schema, execute SQL, release the session. Callers never see
//! a wire protocol, and connector failures are always structured
//! [`ConnectorError`](crate::errors::ConnectorError)s.
//!
//! Dispatch over source types goes through a registration map from type tag
//! to factory, populated once at startup; adding a source type means adding
//! a factory, not touching a match statement.

pub mod crm;
pub mod graphql;
pub mod projection;
pub mod sql;
pub mod types;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};

use crate::database::entities::connections;
use crate::errors::{ConnectorError, ConnectorResult};

pub use types::{ColumnSchema, ColumnType, QueryResult, Record, SourceSchema, TableSchema};

/// Default hard ceiling on rows fetched from a paginated origin
pub const DEFAULT_ROW_CEILING: usize = 10_000;

/// Uniform interface over one external data source.
///
/// A connector holds a live session once any I/O method has run; callers go
/// through [`with_connector`] so the session is released on every exit path.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Cheap reachability/auth probe
    async fn test_connection(&self) -> ConnectorResult<()>;

    /// Tables (or collections) and their columns, normalized into canonical types
    async fn fetch_schema(&self) -> ConnectorResult<SourceSchema>;

    /// Execute SQL and return a tabular result
    async fn execute_query(&self, sql: &str) -> ConnectorResult<QueryResult>;

    /// Release the underlying session
    async fn disconnect(&self) -> ConnectorResult<()>;
}

/// Superset configuration covering every connector family.
///
/// Each implementation validates only the subset it requires, before any I/O.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConnectorConfig {
    #[serde(rename = "type", default)]
    pub connector_type: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub api_url: Option<String>,
    pub auth_token: Option<String>,
    #[serde(default)]
    pub extra_config: JsonMap<String, Value>,
}

impl ConnectorConfig {
    /// Build a config from a stored connection record
    pub fn from_connection(model: &connections::Model) -> Self {
        let extra_config = serde_json::from_str(&model.extra_config).unwrap_or_default();
        Self {
            connector_type: model.connector_type.clone(),
            host: model.host.clone(),
            port: model.port.map(|p| p as u16),
            database: model.database_name.clone(),
            username: model.username.clone(),
            password: model.password.clone(),
            api_url: model.api_url.clone(),
            auth_token: model.auth_token.clone(),
            extra_config,
        }
    }

    /// Build a config from a pipeline's source_type + source_config JSON
    pub fn from_json(connector_type: &str, config_json: &str) -> ConnectorResult<Self> {
        let mut config: ConnectorConfig = serde_json::from_str(config_json)
            .map_err(|e| ConnectorError::InvalidConfig(format!("source config: {e}")))?;
        config.connector_type = connector_type.to_string();
        Ok(config)
    }

    /// Row ceiling for paginated fetches, overridable via extra_config
    pub fn row_ceiling(&self) -> usize {
        self.extra_config
            .get("max_rows")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_ROW_CEILING)
    }

    pub(crate) fn require<'a>(
        &'a self,
        value: &'a Option<String>,
        field: &str,
        errors: &mut Vec<String>,
    ) -> Option<&'a str> {
        match value.as_deref().filter(|v| !v.is_empty()) {
            Some(v) => Some(v),
            None => {
                errors.push(format!("missing required field '{field}'"));
                None
            }
        }
    }
}

/// Factory producing a ready (but not yet connected) connector
pub type ConnectorFactory =
    Arc<dyn Fn(&ConnectorConfig) -> ConnectorResult<Box<dyn Connector>> + Send + Sync>;

static REGISTRY: Lazy<RwLock<HashMap<String, ConnectorFactory>>> = Lazy::new(|| {
    let mut map: HashMap<String, ConnectorFactory> = HashMap::new();
    let sql_factory: ConnectorFactory = Arc::new(|config| sql::SqlConnector::from_config(config));
    map.insert("postgres".to_string(), sql_factory.clone());
    map.insert("mysql".to_string(), sql_factory.clone());
    map.insert("sqlite".to_string(), sql_factory);
    map.insert(
        "graphql".to_string(),
        Arc::new(|config| graphql::GraphQlConnector::from_config(config)),
    );
    map.insert(
        "crm".to_string(),
        Arc::new(|config| crm::CrmConnector::from_config(config)),
    );
    RwLock::new(map)
});

/// Register a connector factory under a type tag.
///
/// Built-in tags are populated when the registry is first touched; this is
/// the extension point for additional source families.
pub fn register(tag: &str, factory: ConnectorFactory) {
    REGISTRY
        .write()
        .expect("connector registry poisoned")
        .insert(tag.to_string(), factory);
}

/// Resolve a connector for a config, validating the config in the process
pub fn resolve(config: &ConnectorConfig) -> ConnectorResult<Box<dyn Connector>> {
    let factory = {
        let registry = REGISTRY.read().expect("connector registry poisoned");
        registry
            .get(config.connector_type.as_str())
            .cloned()
            .ok_or_else(|| ConnectorError::UnknownType(config.connector_type.clone()))?
    };
    factory(config)
}

/// Type tags currently registered
pub fn registered_types() -> Vec<String> {
    let registry = REGISTRY.read().expect("connector registry poisoned");
    let mut tags: Vec<String> = registry.keys().cloned().collect();
    tags.sort();
    tags
}

/// Scoped connector acquisition: resolve, run, and always disconnect —
/// including when the closure fails mid-query.
pub async fn with_connector<T>(
    config: &ConnectorConfig,
    f: impl for<'c> FnOnce(&'c dyn Connector) -> BoxFuture<'c, ConnectorResult<T>>,
) -> ConnectorResult<T> {
    let connector = resolve(config)?;
    let result = f(connector.as_ref()).await;
    if let Err(e) = connector.disconnect().await {
        tracing::warn!("Connector disconnect failed: {}", e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CannedConnector {
        disconnects: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connector for CannedConnector {
        async fn test_connection(&self) -> ConnectorResult<()> {
            Ok(())
        }

        async fn fetch_schema(&self) -> ConnectorResult<SourceSchema> {
            Ok(SourceSchema::default())
        }

        async fn execute_query(&self, _sql: &str) -> ConnectorResult<QueryResult> {
            Err(ConnectorError::QueryFailed("canned failure".to_string()))
        }

        async fn disconnect(&self) -> ConnectorResult<()> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unknown_type_is_rejected() {
        let config = ConnectorConfig {
            connector_type: "carrier-pigeon".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            resolve(&config),
            Err(ConnectorError::UnknownType(_))
        ));
    }

    #[tokio::test]
    async fn test_with_connector_releases_on_failure() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let counter = disconnects.clone();
        register(
            "canned",
            Arc::new(move |_config| {
                Ok(Box::new(CannedConnector {
                    disconnects: counter.clone(),
                }) as Box<dyn Connector>)
            }),
        );

        let config = ConnectorConfig {
            connector_type: "canned".to_string(),
            ..Default::default()
        };
        let result = with_connector(&config, |c| {
            Box::pin(async move { c.execute_query("SELECT 1").await })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_builtin_registrations() {
        let tags = registered_types();
        for tag in ["postgres", "mysql", "sqlite", "graphql", "crm"] {
            assert!(tags.iter().any(|t| t == tag), "missing builtin tag {tag}");
        }
    }
}
