//! GraphQL API connector
//!
//! GraphQL sources have no SQL engine, so the incoming SQL is parsed into a
//! [`SelectPlan`](super::projection::SelectPlan) first: the FROM collection
//! becomes the top-level query field, the referenced columns become the
//! selection set, and the records are fetched with offset pagination up to
//! the row ceiling. The original SQL — predicate, aggregates, ordering —
//! is then applied locally by the shared projection evaluator.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::errors::{ConnectorError, ConnectorResult};

use super::projection::{self, SelectPlan};
use super::types::{
    normalize_records, ColumnSchema, ColumnType, QueryResult, Record, SourceSchema, TableSchema,
};
use super::{Connector, ConnectorConfig};

const PAGE_SIZE: usize = 500;

const INTROSPECTION_QUERY: &str = r#"
query {
  __schema {
    queryType { name }
    types {
      name
      kind
      fields {
        name
        type {
          kind name
          ofType {
            kind name
            ofType {
              kind name
              ofType { kind name }
            }
          }
        }
      }
    }
  }
}
"#;

pub struct GraphQlConnector {
    client: reqwest::Client,
    api_url: String,
    auth_token: Option<String>,
    row_ceiling: usize,
}

impl GraphQlConnector {
    pub fn from_config(config: &ConnectorConfig) -> ConnectorResult<Box<dyn Connector>> {
        let mut errors = Vec::new();
        let api_url = config
            .require(&config.api_url, "api_url", &mut errors)
            .map(str::to_string);
        if !errors.is_empty() {
            return Err(ConnectorError::InvalidConfig(errors.join("; ")));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ConnectorError::InvalidConfig(e.to_string()))?;

        Ok(Box::new(Self {
            client,
            api_url: api_url.unwrap_or_default(),
            auth_token: config.auth_token.clone(),
            row_ceiling: config.row_ceiling(),
        }))
    }

    async fn post_document(&self, document: &str) -> ConnectorResult<Value> {
        let mut request = self
            .client
            .post(&self.api_url)
            .json(&json!({ "query": document }));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ConnectorError::AuthFailed(self.api_url.clone()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ConnectorError::UnexpectedResponse(e.to_string()))?;

        if let Some(errors) = body
            .get("errors")
            .and_then(|e| e.as_array())
            .filter(|e| !e.is_empty())
        {
            let messages: Vec<String> = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                .map(str::to_string)
                .collect();
            let joined = messages.join("; ");
            if joined.to_ascii_lowercase().contains("unauthorized")
                || joined.to_ascii_lowercase().contains("unauthenticated")
            {
                return Err(ConnectorError::AuthFailed(self.api_url.clone()));
            }
            return Err(ConnectorError::QueryFailed(joined));
        }

        Ok(body)
    }

    /// Fetch all records of a collection, paginating until the origin runs
    /// dry or the ceiling is hit. Origins without limit/offset arguments get
    /// one unpaginated fetch.
    async fn fetch_collection(
        &self,
        collection: &str,
        fields: &[String],
    ) -> ConnectorResult<Vec<Record>> {
        let selection = if fields.is_empty() {
            // wildcard: fall back to the introspected field list
            let schema = self.fetch_schema().await?;
            let table = schema
                .tables
                .iter()
                .find(|t| t.name == collection)
                .ok_or_else(|| {
                    ConnectorError::QueryFailed(format!("unknown collection: {collection}"))
                })?;
            table
                .columns
                .iter()
                .map(|c| c.name.clone())
                .collect::<Vec<_>>()
                .join(" ")
        } else {
            fields.join(" ")
        };

        let mut records: Vec<Record> = Vec::new();
        let mut offset = 0usize;

        loop {
            let document = format!(
                "query {{ {collection}(limit: {PAGE_SIZE}, offset: {offset}) {{ {selection} }} }}"
            );
            let body = match self.post_document(&document).await {
                Ok(body) => body,
                Err(ConnectorError::QueryFailed(message))
                    if offset == 0 && message.to_ascii_lowercase().contains("argument") =>
                {
                    // origin exposes a plain list field with no pagination args
                    let document = format!("query {{ {collection} {{ {selection} }} }}");
                    let body = self.post_document(&document).await?;
                    let mut page = extract_records(&body, collection)?;
                    if page.len() > self.row_ceiling {
                        tracing::warn!(
                            "GraphQL collection {} truncated to row ceiling {}",
                            collection,
                            self.row_ceiling
                        );
                        page.truncate(self.row_ceiling);
                    }
                    return Ok(page);
                }
                Err(e) => return Err(e),
            };

            let page = extract_records(&body, collection)?;
            let page_len = page.len();
            records.extend(page);

            if records.len() >= self.row_ceiling {
                tracing::warn!(
                    "GraphQL collection {} truncated to row ceiling {}",
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
}

#[async_trait]
impl Connector for GraphQlConnector {
    async fn test_connection(&self) -> ConnectorResult<()> {
        self.post_document("query { __typename }").await.map(|_| ())
    }

    async fn fetch_schema(&self) -> ConnectorResult<SourceSchema> {
        let body = self.post_document(INTROSPECTION_QUERY).await?;
        parse_introspection(&body)
    }

    async fn execute_query(&self, sql: &str) -> ConnectorResult<QueryResult> {
        let started = Instant::now();
        let plan: SelectPlan = projection::parse_select(sql)?;

        let fields = plan.referenced_columns().unwrap_or_default();
        let raw = self.fetch_collection(&plan.collection, &fields).await?;
        let normalized = normalize_records(raw);

        let mut result = projection::execute_plan(&normalized, &plan)?;
        result.execution_time_ms = started.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn disconnect(&self) -> ConnectorResult<()> {
        // reqwest sessions are pooled per-client and dropped with it
        Ok(())
    }
}

fn extract_records(body: &Value, collection: &str) -> ConnectorResult<Vec<Record>> {
    let data = body
        .get("data")
        .and_then(|d| d.get(collection))
        .ok_or_else(|| {
            ConnectorError::UnexpectedResponse(format!("no data for field '{collection}'"))
        })?;

    let items = match data {
        Value::Array(items) => items.clone(),
        // connection-style wrapper: { nodes: [...] } or { edges: [{node}] }
        Value::Object(obj) => {
            if let Some(Value::Array(nodes)) = obj.get("nodes") {
                nodes.clone()
            } else if let Some(Value::Array(edges)) = obj.get("edges") {
                edges
                    .iter()
                    .filter_map(|e| e.get("node").cloned())
                    .collect()
            } else {
                return Err(ConnectorError::UnexpectedResponse(format!(
                    "field '{collection}' is not a list"
                )));
            }
        }
        _ => {
            return Err(ConnectorError::UnexpectedResponse(format!(
                "field '{collection}' is not a list"
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

fn parse_introspection(body: &Value) -> ConnectorResult<SourceSchema> {
    let schema = body
        .get("data")
        .and_then(|d| d.get("__schema"))
        .ok_or_else(|| ConnectorError::UnexpectedResponse("no __schema in response".to_string()))?;

    let query_type = schema
        .pointer("/queryType/name")
        .and_then(|n| n.as_str())
        .unwrap_or("Query");

    let types = schema
        .get("types")
        .and_then(|t| t.as_array())
        .ok_or_else(|| ConnectorError::UnexpectedResponse("no types in __schema".to_string()))?;

    // object type name -> its scalar fields
    let mut object_fields: HashMap<&str, Vec<ColumnSchema>> = HashMap::new();
    for ty in types {
        if ty.get("kind").and_then(|k| k.as_str()) != Some("OBJECT") {
            continue;
        }
        let name = match ty.get("name").and_then(|n| n.as_str()) {
            Some(name) if !name.starts_with("__") => name,
            _ => continue,
        };
        let fields = match ty.get("fields").and_then(|f| f.as_array()) {
            Some(fields) => fields,
            None => continue,
        };

        let mut columns = Vec::new();
        for field in fields {
            let field_name = field.get("name").and_then(|n| n.as_str()).unwrap_or("");
            let (kind, scalar, non_null) = unwrap_type_ref(field.get("type"));
            if kind == "SCALAR" || kind == "ENUM" {
                columns.push(ColumnSchema {
                    name: field_name.to_string(),
                    column_type: graphql_scalar_type(&scalar),
                    nullable: !non_null,
                    is_primary: field_name == "id",
                    is_foreign: false,
                });
            }
        }
        object_fields.insert(name, columns);
    }

    // collections = query fields returning a list of a known object type
    let mut tables = Vec::new();
    if let Some(query) = types
        .iter()
        .find(|t| t.get("name").and_then(|n| n.as_str()) == Some(query_type))
    {
        if let Some(fields) = query.get("fields").and_then(|f| f.as_array()) {
            for field in fields {
                let field_name = field.get("name").and_then(|n| n.as_str()).unwrap_or("");
                let (_, inner_name, _) = unwrap_type_ref(field.get("type"));
                if let Some(columns) = object_fields.get(inner_name.as_str()) {
                    if !columns.is_empty() {
                        tables.push(TableSchema {
                            name: field_name.to_string(),
                            columns: columns.clone(),
                        });
                    }
                }
            }
        }
    }

    Ok(SourceSchema { tables })
}

/// Walk NON_NULL/LIST wrappers down to the named type.
/// Returns (innermost kind, innermost name, outer NON_NULL flag).
fn unwrap_type_ref(type_ref: Option<&Value>) -> (String, String, bool) {
    let mut non_null = false;
    let mut current = type_ref;
    for _ in 0..6 {
        let Some(ty) = current else { break };
        let kind = ty.get("kind").and_then(|k| k.as_str()).unwrap_or("");
        match kind {
            "NON_NULL" => {
                non_null = true;
                current = ty.get("ofType");
            }
            "LIST" => current = ty.get("ofType"),
            _ => {
                let name = ty.get("name").and_then(|n| n.as_str()).unwrap_or("");
                return (kind.to_string(), name.to_string(), non_null);
            }
        }
    }
    (String::new(), String::new(), non_null)
}

fn graphql_scalar_type(name: &str) -> ColumnType {
    match name {
        "Int" => ColumnType::Integer,
        "Float" => ColumnType::Real,
        "Boolean" => ColumnType::Boolean,
        "DateTime" | "Date" | "Timestamp" | "Time" => ColumnType::Timestamp,
        _ => ColumnType::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_requires_api_url() {
        let config = ConnectorConfig {
            connector_type: "graphql".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            GraphQlConnector::from_config(&config),
            Err(ConnectorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_extract_records_handles_connection_shape() {
        let plain = json!({ "data": { "users": [ {"id": 1}, {"id": 2} ] } });
        assert_eq!(extract_records(&plain, "users").unwrap().len(), 2);

        let nodes = json!({ "data": { "users": { "nodes": [ {"id": 1} ] } } });
        assert_eq!(extract_records(&nodes, "users").unwrap().len(), 1);

        let edges = json!({ "data": { "users": { "edges": [ { "node": {"id": 1} } ] } } });
        assert_eq!(extract_records(&edges, "users").unwrap().len(), 1);
    }

    #[test]
    fn test_parse_introspection() {
        let body = json!({
            "data": { "__schema": {
                "queryType": { "name": "Query" },
                "types": [
                    {
                        "name": "Query", "kind": "OBJECT",
                        "fields": [
                            { "name": "orders", "type": { "kind": "LIST", "name": null,
                                "ofType": { "kind": "OBJECT", "name": "Order" } } }
                        ]
                    },
                    {
                        "name": "Order", "kind": "OBJECT",
                        "fields": [
                            { "name": "id", "type": { "kind": "NON_NULL", "name": null,
                                "ofType": { "kind": "SCALAR", "name": "Int" } } },
                            { "name": "total", "type": { "kind": "SCALAR", "name": "Float" } },
                            { "name": "lines", "type": { "kind": "LIST", "name": null,
                                "ofType": { "kind": "OBJECT", "name": "OrderLine" } } }
                        ]
                    }
                ]
            }}
        });

        let schema = parse_introspection(&body).unwrap();
        assert_eq!(schema.tables.len(), 1);
        let table = &schema.tables[0];
        assert_eq!(table.name, "orders");
        assert_eq!(table.columns.len(), 2); // object-typed field excluded
        assert_eq!(table.columns[0].column_type, ColumnType::Integer);
        assert!(!table.columns[0].nullable);
        assert!(table.columns[0].is_primary);
    }
}
