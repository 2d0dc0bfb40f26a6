use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;

use crate::database::entities::{job_executions, pipelines};
use crate::errors::PipelineError;
use crate::server::app::AppState;
use crate::services::PipelineDraft;

/// Map domain errors onto HTTP statuses; the message stays in the log, the
/// status is all the caller gets for 5xx.
fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::NotFound(_) | PipelineError::ExecutionNotFound(_) => StatusCode::NOT_FOUND,
        PipelineError::AlreadyRunning(_) => StatusCode::CONFLICT,
        PipelineError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn into_status(err: PipelineError) -> StatusCode {
    let status = status_for(&err);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("Pipeline handler error: {}", err);
    }
    status
}

#[derive(Deserialize)]
pub struct ListParams {
    pub workspace_id: Option<i32>,
}

pub async fn list_pipelines(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<pipelines::Model>>, StatusCode> {
    state
        .pipelines
        .list(params.workspace_id)
        .await
        .map(Json)
        .map_err(into_status)
}

pub async fn create_pipeline(
    State(state): State<AppState>,
    Json(draft): Json<PipelineDraft>,
) -> Result<(StatusCode, Json<pipelines::Model>), StatusCode> {
    let pipeline = state.pipelines.create(draft).await.map_err(into_status)?;
    Ok((StatusCode::CREATED, Json(pipeline)))
}

pub async fn get_pipeline(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<pipelines::Model>, StatusCode> {
    state.pipelines.get(id).await.map(Json).map_err(into_status)
}

pub async fn update_pipeline(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(draft): Json<PipelineDraft>,
) -> Result<Json<pipelines::Model>, StatusCode> {
    state
        .pipelines
        .update(id, draft)
        .await
        .map(Json)
        .map_err(into_status)
}

pub async fn delete_pipeline(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, StatusCode> {
    state.pipelines.delete(id).await.map_err(into_status)?;
    Ok(StatusCode::NO_CONTENT)
}

/// "Run now": enqueue a PENDING execution. 409 while a prior run for the
/// same pipeline is still in flight.
pub async fn run_pipeline(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<(StatusCode, Json<job_executions::Model>), StatusCode> {
    let execution = state.pipelines.run_now(id).await.map_err(into_status)?;
    Ok((StatusCode::ACCEPTED, Json(execution)))
}

pub async fn list_executions(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Vec<job_executions::Model>>, StatusCode> {
    state
        .pipelines
        .list_executions(id)
        .await
        .map(Json)
        .map_err(into_status)
}

pub async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<job_executions::Model>, StatusCode> {
    state
        .pipelines
        .get_execution(id)
        .await
        .map(Json)
        .map_err(into_status)
}
