use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde_json::json;

use crate::database::entities::{alert_history, alerts, saved_queries};
use crate::server::app::AppState;
use crate::services::alert_service::{AlertDraft, SavedQueryDraft};

pub async fn list_queries(
    State(state): State<AppState>,
) -> Result<Json<Vec<saved_queries::Model>>, StatusCode> {
    state
        .alerts
        .list_queries()
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

pub async fn create_query(
    State(state): State<AppState>,
    Json(draft): Json<SavedQueryDraft>,
) -> Result<(StatusCode, Json<saved_queries::Model>), StatusCode> {
    let query = state
        .alerts
        .create_query(draft)
        .await
        .map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;
    Ok((StatusCode::CREATED, Json(query)))
}

pub async fn delete_query(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, StatusCode> {
    state
        .alerts
        .delete_query(id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_alerts(
    State(state): State<AppState>,
) -> Result<Json<Vec<alerts::Model>>, StatusCode> {
    state
        .alerts
        .list_alerts()
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

pub async fn create_alert(
    State(state): State<AppState>,
    Json(draft): Json<AlertDraft>,
) -> Result<(StatusCode, Json<alerts::Model>), StatusCode> {
    let alert = state
        .alerts
        .create_alert(draft)
        .await
        .map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;
    Ok((StatusCode::CREATED, Json(alert)))
}

pub async fn get_alert(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<alerts::Model>, StatusCode> {
    state
        .alerts
        .get_alert(id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn update_alert(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(draft): Json<AlertDraft>,
) -> Result<Json<alerts::Model>, StatusCode> {
    state
        .alerts
        .update_alert(id, draft)
        .await
        .map(Json)
        .map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)
}

pub async fn delete_alert(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, StatusCode> {
    state
        .alerts
        .delete_alert(id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn alert_history(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Vec<alert_history::Model>>, StatusCode> {
    state
        .alerts
        .alert_history(id)
        .await
        .map(Json)
        .map_err(|_| StatusCode::NOT_FOUND)
}

/// External periodic trigger for the alert evaluator. When a shared secret
/// is configured, the call must carry it as a bearer token.
pub async fn evaluate_alerts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if let Some(secret) = &state.trigger_secret {
        let authorized = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|token| token == secret)
            .unwrap_or(false);
        if !authorized {
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    let summary = state.evaluator.evaluate_all().await.map_err(|e| {
        tracing::error!("Alert evaluation cycle failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(json!({
        "evaluated": summary.evaluated,
        "triggered": summary.triggered,
        "ok": summary.ok,
        "errors": summary.errors,
    })))
}
