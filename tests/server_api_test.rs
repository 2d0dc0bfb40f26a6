//! HTTP surface tests: trigger authentication, the run-now endpoint and its
//! conflict behavior, and execution visibility through the API.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use meridian::alerts::{AlertEvaluator, DefaultNotifier};
use meridian::queue::{JobQueue, QueueConfig};
use meridian::server::app::create_app;

use common::{insert_pipeline, register_static_connector, setup_db, static_source_config};

async fn test_app(
    db: &sea_orm::DatabaseConnection,
    trigger_secret: Option<&str>,
) -> axum::Router {
    let queue = JobQueue::start(
        db.clone(),
        QueueConfig {
            workers: 2,
            backoff_base: Duration::from_millis(10),
            ..QueueConfig::default()
        },
    );
    let notifier = Arc::new(DefaultNotifier::new(None));
    let evaluator = Arc::new(AlertEvaluator::new(db.clone(), notifier));
    create_app(
        db.clone(),
        queue,
        evaluator,
        None,
        trigger_secret.map(str::to_string),
    )
    .await
    .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    register_static_connector();
    let db = setup_db().await;
    let app = test_app(&db, None).await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn evaluate_trigger_requires_the_shared_secret() {
    register_static_connector();
    let db = setup_db().await;
    let app = test_app(&db, Some("sekrit")).await;

    // unauthenticated
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/internal/alerts/evaluate")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // wrong token
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/internal/alerts/evaluate")
                .header(header::AUTHORIZATION, "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // correct token
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/internal/alerts/evaluate")
                .header(header::AUTHORIZATION, "Bearer sekrit")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["evaluated"], 0);
}

#[tokio::test]
async fn evaluate_trigger_is_open_without_a_secret() {
    register_static_connector();
    let db = setup_db().await;
    let app = test_app(&db, None).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/internal/alerts/evaluate")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn run_now_returns_conflict_while_running() {
    register_static_connector();
    let db = setup_db().await;
    let app = test_app(&db, None).await;

    let pipeline = insert_pipeline(
        &db,
        static_source_config(json!([{"v": 1}]), &[("delay_ms", json!(400))]),
        json!([]),
        json!([]),
        "etl",
    )
    .await;

    let run_uri = format!("/api/v1/pipelines/{}/run", pipeline.id);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(&run_uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let execution = body_json(response).await;
    assert_eq!(execution["status"], "pending");
    assert_eq!(execution["pipeline_id"], pipeline.id);

    // same pipeline, run still in flight
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(&run_uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // the execution is visible through the API
    let execution_id = execution["id"].as_i64().unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/executions/{}", execution_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn pipeline_crud_round_trip() {
    register_static_connector();
    let db = setup_db().await;
    let app = test_app(&db, None).await;

    let draft = json!({
        "workspace_id": 1,
        "name": "orders sync",
        "source_type": "static",
        "source_config": { "extra_config": { "table": "orders", "rows": [] } },
        "destination_type": "warehouse",
        "mode": "etl",
        "transformation_steps": [{"type": "trim", "column": "name"}],
        "quality_rules": []
    });

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/pipelines")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(draft.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let id = created["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/pipelines/{}", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fetched = body_json(response).await;
    assert_eq!(fetched["name"], "orders sync");

    // invalid mode is rejected at write time
    let mut invalid = draft.clone();
    invalid["mode"] = json!("streaming");
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/pipelines")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(invalid.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/v1/pipelines/{}", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
