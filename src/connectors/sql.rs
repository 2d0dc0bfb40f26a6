//! SQL database connector
//!
//! One implementation covers the `postgres`, `mysql` and `sqlite` type tags
//! through sqlx's Any driver. SQL text is executed verbatim at the source;
//! schema discovery reads information_schema (or sqlite_master + PRAGMA for
//! SQLite). The pool is created lazily so constructing a connector never
//! performs I/O; the first query opens the session.

use std::sync::Once;
use std::time::{Duration, Instant};

use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::pool::Pool;
use sqlx::{Any, Column, Row, TypeInfo};

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{ConnectorError, ConnectorResult};

use super::types::{ColumnSchema, ColumnType, QueryResult, Record, SourceSchema, TableSchema};
use super::{Connector, ConnectorConfig};

/// Which SQL family the connector is talking to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SqlBackend {
    Postgres,
    MySql,
    Sqlite,
}

pub struct SqlConnector {
    pool: Pool<Any>,
    backend: SqlBackend,
    /// Host (or file path) with credentials stripped, for error messages
    display_target: String,
    row_ceiling: usize,
}

impl SqlConnector {
    /// Registry factory: validate the config subset and build a lazy pool
    pub fn from_config(config: &ConnectorConfig) -> ConnectorResult<Box<dyn Connector>> {
        static INSTALL_DRIVERS: Once = Once::new();
        INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);

        let backend = match config.connector_type.as_str() {
            "postgres" => SqlBackend::Postgres,
            "mysql" => SqlBackend::MySql,
            "sqlite" => SqlBackend::Sqlite,
            other => return Err(ConnectorError::UnknownType(other.to_string())),
        };

        let mut errors = Vec::new();
        let url = match backend {
            SqlBackend::Sqlite => {
                let database = config.require(&config.database, "database", &mut errors);
                if !errors.is_empty() {
                    return Err(ConnectorError::InvalidConfig(errors.join("; ")));
                }
                format!("sqlite://{}", database.unwrap_or_default())
            }
            SqlBackend::Postgres | SqlBackend::MySql => {
                let host = config.require(&config.host, "host", &mut errors);
                let database = config.require(&config.database, "database", &mut errors);
                let username = config.require(&config.username, "username", &mut errors);
                if !errors.is_empty() {
                    return Err(ConnectorError::InvalidConfig(errors.join("; ")));
                }

                let scheme = if backend == SqlBackend::Postgres {
                    "postgres"
                } else {
                    "mysql"
                };
                let port = config
                    .port
                    .unwrap_or(if backend == SqlBackend::Postgres { 5432 } else { 3306 });
                let auth = match config.password.as_deref() {
                    Some(password) if !password.is_empty() => {
                        format!("{}:{}", username.unwrap_or_default(), password)
                    }
                    _ => username.unwrap_or_default().to_string(),
                };
                format!(
                    "{}://{}@{}:{}/{}",
                    scheme,
                    auth,
                    host.unwrap_or_default(),
                    port,
                    database.unwrap_or_default()
                )
            }
        };

        let display_target = match backend {
            SqlBackend::Sqlite => config.database.clone().unwrap_or_default(),
            _ => config.host.clone().unwrap_or_default(),
        };

        let pool = AnyPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy(&url)
            .map_err(|e| ConnectorError::InvalidConfig(format!("invalid connection URL: {e}")))?;

        Ok(Box::new(Self {
            pool,
            backend,
            display_target,
            row_ceiling: config.row_ceiling(),
        }))
    }

    fn map_error(&self, err: sqlx::Error) -> ConnectorError {
        match err {
            sqlx::Error::PoolTimedOut => ConnectorError::Timeout(10_000),
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) => ConnectorError::ConnectionFailed {
                endpoint: self.display_target.clone(),
                reason: "source unreachable".to_string(),
            },
            sqlx::Error::Configuration(e) => ConnectorError::InvalidConfig(e.to_string()),
            sqlx::Error::Database(db) => {
                let message = db.message().to_string();
                let lowered = message.to_ascii_lowercase();
                if lowered.contains("password") || lowered.contains("authentication") || lowered.contains("access denied") {
                    ConnectorError::AuthFailed(self.display_target.clone())
                } else {
                    ConnectorError::QueryFailed(message)
                }
            }
            other => ConnectorError::QueryFailed(other.to_string()),
        }
    }

    async fn fetch_rows(&self, sql: &str) -> ConnectorResult<Vec<AnyRow>> {
        sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.map_error(e))
    }

    async fn schema_postgres(&self) -> ConnectorResult<SourceSchema> {
        let columns = self
            .fetch_rows(
                "SELECT c.table_name, c.column_name, c.data_type, c.is_nullable \
                 FROM information_schema.columns c \
                 JOIN information_schema.tables t \
                   ON t.table_schema = c.table_schema AND t.table_name = c.table_name \
                 WHERE c.table_schema = 'public' AND t.table_type = 'BASE TABLE' \
                 ORDER BY c.table_name, c.ordinal_position",
            )
            .await?;
        let keys = self
            .fetch_rows(
                "SELECT kcu.table_name, kcu.column_name, tc.constraint_type \
                 FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu \
                   ON tc.constraint_name = kcu.constraint_name \
                 WHERE tc.constraint_type IN ('PRIMARY KEY', 'FOREIGN KEY')",
            )
            .await?;

        let mut schema = SourceSchema::default();
        for row in &columns {
            let table: String = row.try_get(0).unwrap_or_default();
            let column: String = row.try_get(1).unwrap_or_default();
            let data_type: String = row.try_get(2).unwrap_or_default();
            let nullable: String = row.try_get(3).unwrap_or_default();

            let table_entry = match schema.tables.iter_mut().find(|t| t.name == table) {
                Some(entry) => entry,
                None => {
                    schema.tables.push(TableSchema {
                        name: table.clone(),
                        columns: Vec::new(),
                    });
                    schema.tables.last_mut().unwrap()
                }
            };
            table_entry.columns.push(ColumnSchema {
                name: column,
                column_type: ColumnType::from_native(&data_type),
                nullable: nullable.eq_ignore_ascii_case("yes"),
                is_primary: false,
                is_foreign: false,
            });
        }

        for row in &keys {
            let table: String = row.try_get(0).unwrap_or_default();
            let column: String = row.try_get(1).unwrap_or_default();
            let kind: String = row.try_get(2).unwrap_or_default();
            if let Some(col) = schema
                .tables
                .iter_mut()
                .find(|t| t.name == table)
                .and_then(|t| t.columns.iter_mut().find(|c| c.name == column))
            {
                if kind == "PRIMARY KEY" {
                    col.is_primary = true;
                } else {
                    col.is_foreign = true;
                }
            }
        }
        Ok(schema)
    }

    async fn schema_mysql(&self) -> ConnectorResult<SourceSchema> {
        let columns = self
            .fetch_rows(
                "SELECT table_name, column_name, data_type, is_nullable, column_key \
                 FROM information_schema.columns \
                 WHERE table_schema = DATABASE() \
                 ORDER BY table_name, ordinal_position",
            )
            .await?;

        let mut schema = SourceSchema::default();
        for row in &columns {
            let table: String = row.try_get(0).unwrap_or_default();
            let column: String = row.try_get(1).unwrap_or_default();
            let data_type: String = row.try_get(2).unwrap_or_default();
            let nullable: String = row.try_get(3).unwrap_or_default();
            let key: String = row.try_get(4).unwrap_or_default();

            let table_entry = match schema.tables.iter_mut().find(|t| t.name == table) {
                Some(entry) => entry,
                None => {
                    schema.tables.push(TableSchema {
                        name: table.clone(),
                        columns: Vec::new(),
                    });
                    schema.tables.last_mut().unwrap()
                }
            };
            table_entry.columns.push(ColumnSchema {
                name: column,
                column_type: ColumnType::from_native(&data_type),
                nullable: nullable.eq_ignore_ascii_case("yes"),
                is_primary: key == "PRI",
                is_foreign: key == "MUL",
            });
        }
        Ok(schema)
    }

    async fn schema_sqlite(&self) -> ConnectorResult<SourceSchema> {
        let tables = self
            .fetch_rows(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .await?;

        let mut schema = SourceSchema::default();
        for row in &tables {
            let table: String = row.try_get(0).unwrap_or_default();
            // table names come from sqlite_master, not user input
            let pragma = format!("PRAGMA table_info(\"{}\")", table.replace('"', "\"\""));
            let columns = self.fetch_rows(&pragma).await?;

            let mut table_schema = TableSchema {
                name: table,
                columns: Vec::new(),
            };
            for col in &columns {
                let name: String = col.try_get(1).unwrap_or_default();
                let declared: String = col.try_get(2).unwrap_or_default();
                let not_null: i64 = col.try_get(3).unwrap_or(0);
                let pk: i64 = col.try_get(5).unwrap_or(0);
                table_schema.columns.push(ColumnSchema {
                    name,
                    column_type: ColumnType::from_native(&declared),
                    nullable: not_null == 0,
                    is_primary: pk > 0,
                    is_foreign: false,
                });
            }
            schema.tables.push(table_schema);
        }
        Ok(schema)
    }
}

#[async_trait]
impl Connector for SqlConnector {
    async fn test_connection(&self) -> ConnectorResult<()> {
        self.fetch_rows("SELECT 1").await.map(|_| ())
    }

    async fn fetch_schema(&self) -> ConnectorResult<SourceSchema> {
        match self.backend {
            SqlBackend::Postgres => self.schema_postgres().await,
            SqlBackend::MySql => self.schema_mysql().await,
            SqlBackend::Sqlite => self.schema_sqlite().await,
        }
    }

    async fn execute_query(&self, sql: &str) -> ConnectorResult<QueryResult> {
        let started = Instant::now();
        let mut raw = self.fetch_rows(sql).await?;

        // bounded batch: never hand more than the ceiling downstream
        if raw.len() > self.row_ceiling {
            raw.truncate(self.row_ceiling);
        }

        let columns: Vec<String> = raw
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let mut rows = Vec::with_capacity(raw.len());
        for row in &raw {
            let mut record = Record::new();
            for column in row.columns() {
                record.insert(column.name().to_string(), decode_any(row, column.ordinal(), column.type_info().name()));
            }
            rows.push(record);
        }

        Ok(QueryResult::new(
            columns,
            rows,
            started.elapsed().as_millis() as u64,
        ))
    }

    async fn disconnect(&self) -> ConnectorResult<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Decode one Any-driver cell into JSON by declared kind, falling back to
/// text, then null. Sources lie about types often enough that decode failure
/// must degrade, not abort the batch.
fn decode_any(row: &AnyRow, ordinal: usize, type_name: &str) -> Value {
    match type_name.to_ascii_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(ordinal)
            .map(|v| v.map(Value::Bool).unwrap_or(Value::Null))
            .unwrap_or(Value::Null),
        "SMALLINT" | "INTEGER" | "INT" | "BIGINT" => row
            .try_get::<Option<i64>, _>(ordinal)
            .map(|v| v.map(Value::from).unwrap_or(Value::Null))
            .unwrap_or(Value::Null),
        "REAL" | "DOUBLE" | "FLOAT" => row
            .try_get::<Option<f64>, _>(ordinal)
            .map(|v| v.map(Value::from).unwrap_or(Value::Null))
            .unwrap_or(Value::Null),
        "NULL" => Value::Null,
        _ => row
            .try_get::<Option<String>, _>(ordinal)
            .map(|v| v.map(Value::String).unwrap_or(Value::Null))
            .or_else(|_| {
                row.try_get::<Option<i64>, _>(ordinal)
                    .map(|v| v.map(Value::from).unwrap_or(Value::Null))
            })
            .or_else(|_| {
                row.try_get::<Option<f64>, _>(ordinal)
                    .map(|v| v.map(Value::from).unwrap_or(Value::Null))
            })
            .unwrap_or(Value::Null),
    }
}
