use anyhow::{anyhow, Result};
use axum::{
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use crate::alerts::AlertEvaluator;
use crate::queue::JobQueue;
use crate::services::{AlertService, ConnectionService, PipelineService};

use super::handlers::{alerts, connections, health, pipelines};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub pipelines: PipelineService,
    pub connections: ConnectionService,
    pub alerts: AlertService,
    pub evaluator: Arc<AlertEvaluator>,
    pub trigger_secret: Option<String>,
}

pub async fn create_app(
    db: DatabaseConnection,
    queue: Arc<JobQueue>,
    evaluator: Arc<AlertEvaluator>,
    cors_origin: Option<&str>,
    trigger_secret: Option<String>,
) -> Result<Router> {
    let state = AppState {
        pipelines: PipelineService::new(db.clone(), queue),
        connections: ConnectionService::new(db.clone()),
        alerts: AlertService::new(db.clone()),
        evaluator,
        trigger_secret,
        db,
    };

    let cors = match cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(
                origin
                    .parse::<axum::http::HeaderValue>()
                    .map_err(|e| anyhow!("Invalid CORS origin: {}", e))?,
            )
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PUT,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers(Any),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PUT,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers(Any),
    };

    let api = Router::new()
        // pipelines
        .route(
            "/pipelines",
            get(pipelines::list_pipelines).post(pipelines::create_pipeline),
        )
        .route(
            "/pipelines/:id",
            get(pipelines::get_pipeline)
                .put(pipelines::update_pipeline)
                .delete(pipelines::delete_pipeline),
        )
        .route("/pipelines/:id/run", post(pipelines::run_pipeline))
        .route("/pipelines/:id/executions", get(pipelines::list_executions))
        .route("/executions/:id", get(pipelines::get_execution))
        // connections
        .route(
            "/connections",
            get(connections::list_connections).post(connections::create_connection),
        )
        .route(
            "/connections/:id",
            get(connections::get_connection)
                .put(connections::update_connection)
                .delete(connections::delete_connection),
        )
        .route("/connections/:id/test", post(connections::test_connection))
        .route("/connections/:id/schema", get(connections::fetch_schema))
        // saved queries + alerts
        .route(
            "/queries",
            get(alerts::list_queries).post(alerts::create_query),
        )
        .route("/queries/:id", axum::routing::delete(alerts::delete_query))
        .route("/alerts", get(alerts::list_alerts).post(alerts::create_alert))
        .route(
            "/alerts/:id",
            get(alerts::get_alert)
                .put(alerts::update_alert)
                .delete(alerts::delete_alert),
        )
        .route("/alerts/:id/history", get(alerts::alert_history))
        .route("/internal/alerts/evaluate", post(alerts::evaluate_alerts));

    let app = Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1", api)
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(state);

    Ok(app)
}
