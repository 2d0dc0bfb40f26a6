use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::connectors::SourceSchema;
use crate::database::entities::connections;
use crate::server::app::AppState;
use crate::services::connection_service::ConnectionDraft;

#[derive(Deserialize)]
pub struct ListParams {
    pub workspace_id: Option<i32>,
}

pub async fn list_connections(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<connections::Model>>, StatusCode> {
    state
        .connections
        .list(params.workspace_id)
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

pub async fn create_connection(
    State(state): State<AppState>,
    Json(draft): Json<ConnectionDraft>,
) -> Result<(StatusCode, Json<connections::Model>), StatusCode> {
    let connection = state
        .connections
        .create(draft)
        .await
        .map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;
    Ok((StatusCode::CREATED, Json(connection)))
}

pub async fn get_connection(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<connections::Model>, StatusCode> {
    state
        .connections
        .get(id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn update_connection(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(draft): Json<ConnectionDraft>,
) -> Result<Json<connections::Model>, StatusCode> {
    state
        .connections
        .update(id, draft)
        .await
        .map(Json)
        .map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)
}

pub async fn delete_connection(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, StatusCode> {
    state
        .connections
        .delete(id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Probe the stored credentials; failures come back as a structured body,
/// not an error status — an unreachable source is a valid answer.
pub async fn test_connection(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let outcome = state
        .connections
        .test_connection(id)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;

    Ok(Json(match outcome {
        None => json!({ "success": true }),
        Some(reason) => json!({ "success": false, "error": reason }),
    }))
}

pub async fn fetch_schema(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<SourceSchema>, StatusCode> {
    state
        .connections
        .fetch_schema(id)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::warn!("Schema fetch failed for connection {}: {}", id, e);
            StatusCode::BAD_GATEWAY
        })
}
