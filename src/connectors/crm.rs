//! REST/CRM connector
//!
//! CRM-style REST APIs expose record collections behind paginated list
//! endpoints. The incoming SQL names the collection and columns; records are
//! fetched page by page with bearer auth up to the row ceiling, tolerant of
//! the envelope shapes these APIs use (`[...]`, `{data: [...]}`,
//! `{records: [...]}`, `{results: [...]}`), then the SQL is applied locally
//! via the shared projection evaluator.
//!
//! Schema discovery samples the first page of each collection and infers
//! canonical column types from the values, since CRM APIs rarely publish a
//! machine-readable schema. The collection list comes from a `/collections`
//! listing endpoint when the origin has one, otherwise from the
//! `collections` array in extra_config.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{ConnectorError, ConnectorResult};

use super::projection::{self, SelectPlan};
use super::types::{
    normalize_records, ColumnSchema, ColumnType, QueryResult, Record, SourceSchema, TableSchema,
};
use super::{Connector, ConnectorConfig};

const PAGE_SIZE: usize = 200;
const SCHEMA_SAMPLE_SIZE: usize = 50;

pub struct CrmConnector {
    client: reqwest::Client,
    api_url: String,
    auth_token: Option<String>,
    configured_collections: Vec<String>,
    row_ceiling: usize,
}

impl CrmConnector {
    pub fn from_config(config: &ConnectorConfig) -> ConnectorResult<Box<dyn Connector>> {
        let mut errors = Vec::new();
        let api_url = config
            .require(&config.api_url, "api_url", &mut errors)
            .map(|u| u.trim_end_matches('/').to_string());
        if !errors.is_empty() {
            return Err(ConnectorError::InvalidConfig(errors.join("; ")));
        }

        let configured_collections = config
            .extra_config
            .get("collections")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ConnectorError::InvalidConfig(e.to_string()))?;

        Ok(Box::new(Self {
            client,
            api_url: api_url.unwrap_or_default(),
            auth_token: config.auth_token.clone(),
            configured_collections,
            row_ceiling: config.row_ceiling(),
        }))
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> ConnectorResult<Value> {
        let url = format!("{}/{}", self.api_url, path.trim_start_matches('/'));
        let mut request = self.client.get(&url).query(query);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ConnectorError::AuthFailed(self.api_url.clone()));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ConnectorError::QueryFailed(format!(
                "collection endpoint not found: {path}"
            )));
        }
        if !status.is_success() {
            return Err(ConnectorError::QueryFailed(format!(
                "origin returned HTTP {status} for {path}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ConnectorError::UnexpectedResponse(e.to_string()))
    }

    async fn fetch_page(
        &self,
        collection: &str,
        limit: usize,
        offset: usize,
    ) -> ConnectorResult<Vec<Record>> {
        let body = self
            .get_json(
                collection,
                &[("limit", limit.to_string()), ("offset", offset.to_string())],
            )
            .await?;
        unwrap_envelope(&body, collection)
    }

    async fn fetch_collection(&self, collection: &str) -> ConnectorResult<Vec<Record>> {
        let mut records: Vec<Record> = Vec::new();
        let mut offset = 0usize;

        loop {
            let page = self.fetch_page(collection, PAGE_SIZE, offset).await?;
            let page_len = page.len();
            records.extend(page);

            if records.len() >= self.row_ceiling {
                tracing::warn!(
                    "CRM collection {} truncated to row ceiling {}",
                    collection,
                    self.row_ceiling
                );
                records.truncate(self.row_ceiling);
                break;
            }
            if page_len < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }

        Ok(records)
    }

    async fn collection_names(&self) -> ConnectorResult<Vec<String>> {
        if !self.configured_collections.is_empty() {
            return Ok(self.configured_collections.clone());
        }

        let body = self.get_json("collections", &[]).await?;
        let items = match &body {
            Value::Array(items) => items.clone(),
            Value::Object(obj) => obj
                .get("collections")
                .or_else(|| obj.get("data"))
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        let names: Vec<String> = items
            .iter()
            .filter_map(|item| match item {
                Value::String(name) => Some(name.clone()),
                Value::Object(obj) => obj
                    .get("name")
                    .and_then(|n| n.as_str())
                    .map(str::to_string),
                _ => None,
            })
            .collect();

        if names.is_empty() {
            return Err(ConnectorError::UnexpectedResponse(
                "origin exposes no collection listing; set 'collections' in extra config"
                    .to_string(),
            ));
        }
        Ok(names)
    }
}

#[async_trait]
impl Connector for CrmConnector {
    async fn test_connection(&self) -> ConnectorResult<()> {
        // any authenticated listing proves reachability and credentials
        match self.collection_names().await {
            Ok(_) => Ok(()),
            Err(ConnectorError::UnexpectedResponse(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn fetch_schema(&self) -> ConnectorResult<SourceSchema> {
        let mut schema = SourceSchema::default();
        for collection in self.collection_names().await? {
            let sample = self.fetch_page(&collection, SCHEMA_SAMPLE_SIZE, 0).await?;
            schema.tables.push(TableSchema {
                columns: infer_columns(&sample),
                name: collection,
            });
        }
        Ok(schema)
    }

    async fn execute_query(&self, sql: &str) -> ConnectorResult<QueryResult> {
        let started = Instant::now();
        let plan: SelectPlan = projection::parse_select(sql)?;

        let raw = self.fetch_collection(&plan.collection).await?;
        let normalized = normalize_records(raw);

        let mut result = projection::execute_plan(&normalized, &plan)?;
        result.execution_time_ms = started.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn disconnect(&self) -> ConnectorResult<()> {
        Ok(())
    }
}

fn unwrap_envelope(body: &Value, collection: &str) -> ConnectorResult<Vec<Record>> {
    let items = match body {
        Value::Array(items) => items.clone(),
        Value::Object(obj) => {
            let candidates = ["data", "records", "results", "items"];
            match candidates
                .iter()
                .find_map(|key| obj.get(*key).and_then(|v| v.as_array()))
            {
                Some(items) => items.clone(),
                None => {
                    return Err(ConnectorError::UnexpectedResponse(format!(
                        "unrecognized envelope for collection '{collection}'"
                    )))
                }
            }
        }
        _ => {
            return Err(ConnectorError::UnexpectedResponse(format!(
                "collection '{collection}' did not return a list"
            )))
        }
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect())
}

fn infer_columns(sample: &[Record]) -> Vec<ColumnSchema> {
    let mut columns: Vec<ColumnSchema> = Vec::new();
    for record in sample {
        for (key, value) in record {
            match columns.iter_mut().find(|c| &c.name == key) {
                Some(existing) => {
                    if value.is_null() {
                        existing.nullable = true;
                    }
                }
                None => {
                    let mut column = ColumnSchema::new(key.clone(), ColumnType::infer(value));
                    column.nullable = value.is_null();
                    column.is_primary = key == "id";
                    columns.push(column);
                }
            }
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_requires_api_url() {
        let config = ConnectorConfig {
            connector_type: "crm".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            CrmConnector::from_config(&config),
            Err(ConnectorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_envelope_shapes() {
        let bare = json!([{"id": 1}, {"id": 2}]);
        assert_eq!(unwrap_envelope(&bare, "contacts").unwrap().len(), 2);

        let data = json!({"data": [{"id": 1}]});
        assert_eq!(unwrap_envelope(&data, "contacts").unwrap().len(), 1);

        let records = json!({"records": [{"id": 1}], "total": 1});
        assert_eq!(unwrap_envelope(&records, "contacts").unwrap().len(), 1);

        let bogus = json!({"message": "hello"});
        assert!(unwrap_envelope(&bogus, "contacts").is_err());
    }

    #[test]
    fn test_infer_columns_from_sample() {
        let sample = unwrap_envelope(
            &json!([
                {"id": 7, "name": "Acme", "mrr": 120.5, "churned": false},
                {"id": 8, "name": "Initech", "mrr": null, "churned": true}
            ]),
            "accounts",
        )
        .unwrap();

        let columns = infer_columns(&sample);
        let by_name = |n: &str| columns.iter().find(|c| c.name == n).unwrap();
        assert_eq!(by_name("id").column_type, ColumnType::Integer);
        assert!(by_name("id").is_primary);
        assert_eq!(by_name("mrr").column_type, ColumnType::Real);
        assert!(by_name("mrr").nullable);
        assert_eq!(by_name("churned").column_type, ColumnType::Boolean);
    }
}
