//! End-to-end pipeline execution tests over an in-memory database and the
//! stub connector: the full extract → transform → quality → load path, the
//! quality gate, per-pipeline run serialization, redelivery idempotency,
//! and the queue's retry policy.

mod common;

use std::time::Duration;

use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde_json::{json, Value};

use meridian::database::entities::{job_executions, pipeline_rows, pipelines, JobStatus};
use meridian::errors::PipelineError;
use meridian::queue::{JobQueue, QueueConfig};
use meridian::services::{PipelineDraft, PipelineService};
use meridian::worker::PipelineWorker;

use common::{
    insert_pipeline, register_static_connector, setup_db, static_source_config, wait_for_terminal,
};

/// 100 people, 10 of them under 21, names padded with whitespace
fn people_rows() -> Value {
    let rows: Vec<Value> = (0..100)
        .map(|i| {
            json!({
                "name": format!("  person-{} ", i),
                "age": if i < 10 { 18 } else { 30 },
                "email": format!("person-{}@example.com", i),
            })
        })
        .collect();
    Value::Array(rows)
}

fn test_queue(db: &sea_orm::DatabaseConnection) -> std::sync::Arc<JobQueue> {
    JobQueue::start(
        db.clone(),
        QueueConfig {
            workers: 2,
            max_attempts: 3,
            backoff_base: Duration::from_millis(10),
            retention: 50,
        },
    )
}

#[tokio::test]
async fn etl_run_transforms_checks_and_loads() {
    register_static_connector();
    let db = setup_db().await;

    let pipeline = insert_pipeline(
        &db,
        static_source_config(people_rows(), &[]),
        json!([
            {"type": "trim", "column": "name"},
            {"type": "filter", "column": "age", "op": ">=", "value": 21}
        ]),
        json!([]),
        "etl",
    )
    .await;

    let queue = test_queue(&db);
    let execution = queue.enqueue(pipeline.id).await.unwrap();
    assert_eq!(execution.job_status(), Some(JobStatus::Pending));

    let finished = wait_for_terminal(&db, execution.id, Duration::from_secs(5)).await;
    assert_eq!(finished.job_status(), Some(JobStatus::Completed));
    assert_eq!(finished.rows_processed, Some(90));
    assert!(finished.duration_ms.is_some());
    assert!(finished.batch_fingerprint.is_some());

    // the log reports the filtered rows and the stage sequence
    assert!(finished.log.contains("[EXTRACT] Extracted 100 rows"));
    assert!(finished.log.contains("10 rows dropped"));
    assert!(finished.log.contains("[LOAD] Loaded 90 rows"));

    // loaded rows are trimmed and filtered
    let loaded = pipeline_rows::Entity::find()
        .filter(pipeline_rows::Column::PipelineId.eq(pipeline.id))
        .all(&db)
        .await
        .unwrap();
    assert_eq!(loaded.len(), 90);
    let first: Value = serde_json::from_str(&loaded[0].data).unwrap();
    assert!(!first["name"].as_str().unwrap().starts_with(' '));

    // worker owns the pipeline's last-run bookkeeping
    let pipeline = pipelines::Entity::find_by_id(pipeline.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pipeline.last_status.as_deref(), Some("success"));
    assert!(pipeline.last_run_at.is_some());
}

#[tokio::test]
async fn fail_severity_violation_blocks_load() {
    register_static_connector();
    let db = setup_db().await;

    let rows = json!([
        {"email": "a@example.com"},
        {"email": null},
        {"email": null},
        {"email": "b@example.com"},
    ]);
    let pipeline = insert_pipeline(
        &db,
        static_source_config(rows, &[]),
        json!([]),
        json!([{"column": "email", "rule": "not_null", "severity": "fail"}]),
        "etl",
    )
    .await;

    let queue = test_queue(&db);
    let execution = queue.enqueue(pipeline.id).await.unwrap();
    let finished = wait_for_terminal(&db, execution.id, Duration::from_secs(5)).await;

    assert_eq!(finished.job_status(), Some(JobStatus::Failed));
    assert!(finished.error.as_deref().unwrap().contains("Quality gate"));
    assert!(finished.log.contains("[QUALITY] Found 2 violations."));
    assert!(finished.log.contains("aborting before load"));

    // the hard gate means zero load side effects
    let loaded = pipeline_rows::Entity::find()
        .filter(pipeline_rows::Column::PipelineId.eq(pipeline.id))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(loaded, 0);

    // quality-gate failures are terminal: exactly one attempt
    assert_eq!(finished.attempts, 1);

    let pipeline = pipelines::Entity::find_by_id(pipeline.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pipeline.last_status.as_deref(), Some("failed"));
}

#[tokio::test]
async fn warn_only_violations_allow_completion() {
    register_static_connector();
    let db = setup_db().await;

    let rows = json!([
        {"email": "a@example.com"},
        {"email": null},
    ]);
    let pipeline = insert_pipeline(
        &db,
        static_source_config(rows, &[]),
        json!([]),
        json!([{"column": "email", "rule": "not_null", "severity": "warn"}]),
        "etl",
    )
    .await;

    let queue = test_queue(&db);
    let execution = queue.enqueue(pipeline.id).await.unwrap();
    let finished = wait_for_terminal(&db, execution.id, Duration::from_secs(5)).await;

    assert_eq!(finished.job_status(), Some(JobStatus::Completed));
    assert!(finished.log.contains("[QUALITY] Found 1 violations."));
    assert_eq!(finished.rows_processed, Some(2));
}

#[tokio::test]
async fn elt_mode_loads_raw_batch() {
    register_static_connector();
    let db = setup_db().await;

    let rows = json!([{"name": "  padded  "}]);
    let pipeline = insert_pipeline(
        &db,
        static_source_config(rows, &[]),
        // steps present but must be ignored in ELT mode
        json!([{"type": "trim", "column": "name"}]),
        json!([]),
        "elt",
    )
    .await;

    let queue = test_queue(&db);
    let execution = queue.enqueue(pipeline.id).await.unwrap();
    let finished = wait_for_terminal(&db, execution.id, Duration::from_secs(5)).await;

    assert_eq!(finished.job_status(), Some(JobStatus::Completed));
    assert!(finished.log.contains("destination-side transformation delegated"));
    assert!(!finished.log.contains("[TRANSFORM]"));

    let loaded = pipeline_rows::Entity::find()
        .filter(pipeline_rows::Column::PipelineId.eq(pipeline.id))
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    let data: Value = serde_json::from_str(&loaded.data).unwrap();
    assert_eq!(data["name"], json!("  padded  "));
}

#[tokio::test]
async fn overlapping_runs_of_one_pipeline_are_refused() {
    register_static_connector();
    let db = setup_db().await;

    let pipeline = insert_pipeline(
        &db,
        static_source_config(people_rows(), &[("delay_ms", json!(400))]),
        json!([]),
        json!([]),
        "etl",
    )
    .await;

    let queue = test_queue(&db);
    let first = queue.enqueue(pipeline.id).await.unwrap();

    // second trigger while the first is pending/processing
    let second = queue.enqueue(pipeline.id).await;
    assert!(matches!(second, Err(PipelineError::AlreadyRunning(id)) if id == pipeline.id));

    // the lease releases once the first run is terminal
    wait_for_terminal(&db, first.id, Duration::from_secs(5)).await;
    let third = queue.enqueue(pipeline.id).await;
    assert!(third.is_ok());
    wait_for_terminal(&db, third.unwrap().id, Duration::from_secs(5)).await;
}

#[tokio::test]
async fn redelivered_job_does_not_duplicate_rows() {
    register_static_connector();
    let db = setup_db().await;

    let pipeline = insert_pipeline(
        &db,
        static_source_config(people_rows(), &[]),
        json!([]),
        json!([]),
        "etl",
    )
    .await;

    let queue = test_queue(&db);
    let execution = queue.enqueue(pipeline.id).await.unwrap();
    let finished = wait_for_terminal(&db, execution.id, Duration::from_secs(5)).await;
    assert_eq!(finished.job_status(), Some(JobStatus::Completed));

    // simulate at-least-once redelivery: re-open and run the same execution
    let mut reopened: job_executions::ActiveModel = finished.into();
    reopened.status = Set(JobStatus::Pending.as_str().to_string());
    reopened.update(&db).await.unwrap();

    let worker = PipelineWorker::new(db.clone());
    worker.execute(execution.id).await.unwrap();

    // the upsert key absorbs the repeat
    let loaded = pipeline_rows::Entity::find()
        .filter(pipeline_rows::Column::PipelineId.eq(pipeline.id))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(loaded, 100);
}

#[tokio::test]
async fn transient_failures_retry_until_exhausted() {
    register_static_connector();
    let db = setup_db().await;

    let pipeline = insert_pipeline(
        &db,
        static_source_config(json!([]), &[("fail", json!(true))]),
        json!([]),
        json!([]),
        "etl",
    )
    .await;

    let queue = test_queue(&db);
    let execution = queue.enqueue(pipeline.id).await.unwrap();

    // wait until the attempt budget is spent and the job settles FAILED
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let finished = loop {
        let current = job_executions::Entity::find_by_id(execution.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        if current.attempts >= 3 && current.job_status() == Some(JobStatus::Failed) {
            break current;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "retries did not exhaust in time (status {}, attempts {})",
            current.status,
            current.attempts
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    };

    assert_eq!(finished.attempts, 3);
    assert!(finished.log.contains("[QUEUE] Attempt 2/3"));
    assert!(finished.log.contains("[QUEUE] Attempt 3/3"));
    assert!(finished.error.as_deref().unwrap().contains("Connection"));
}

#[tokio::test]
async fn claimed_jobs_cannot_be_claimed_twice() {
    register_static_connector();
    let db = setup_db().await;

    let pipeline = insert_pipeline(
        &db,
        static_source_config(json!([{"v": 1}]), &[]),
        json!([]),
        json!([]),
        "etl",
    )
    .await;

    let queue = test_queue(&db);
    let execution = queue.enqueue(pipeline.id).await.unwrap();
    let finished = wait_for_terminal(&db, execution.id, Duration::from_secs(5)).await;
    assert_eq!(finished.job_status(), Some(JobStatus::Completed));

    // a second worker touching the already-terminal job is a no-op
    let worker = PipelineWorker::new(db.clone());
    worker.execute(execution.id).await.unwrap();
    let after = job_executions::Entity::find_by_id(execution.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.attempts, finished.attempts);
    assert_eq!(after.completed_at, finished.completed_at);
}

#[tokio::test]
async fn service_rejects_invalid_drafts() {
    register_static_connector();
    let db = setup_db().await;
    let queue = test_queue(&db);
    let service = PipelineService::new(db.clone(), queue);

    let mut draft = PipelineDraft {
        workspace_id: 1,
        name: "orders sync".to_string(),
        description: None,
        source_type: "static".to_string(),
        source_config: json!({"extra_config": {"table": "orders"}}),
        destination_type: "warehouse".to_string(),
        destination_config: Value::Null,
        mode: "etl".to_string(),
        transformation_steps: Value::Null,
        quality_rules: Value::Null,
        schedule_cron: None,
    };
    assert!(service.create(draft.clone()).await.is_ok());

    draft.mode = "streaming".to_string();
    assert!(matches!(
        service.create(draft.clone()).await,
        Err(PipelineError::Configuration(_))
    ));

    draft.mode = "etl".to_string();
    draft.source_type = "telepathy".to_string();
    assert!(matches!(
        service.create(draft.clone()).await,
        Err(PipelineError::Configuration(_))
    ));

    draft.source_type = "static".to_string();
    draft.transformation_steps = json!([{"type": "teleport"}]);
    assert!(matches!(
        service.create(draft).await,
        Err(PipelineError::Configuration(_))
    ));
}
