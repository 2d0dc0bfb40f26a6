//! Alert evaluator tests: threshold classification, per-evaluation history
//! rows, per-alert failure isolation, and notification dispatch.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde_json::json;
use tokio::sync::Mutex;

use meridian::alerts::{AlertEvaluator, AlertNotification, AlertNotifier};
use meridian::database::entities::{alert_history, alerts, saved_queries};

use common::{insert_static_connection, register_static_connector, setup_db};

/// Captures notifications instead of dispatching them
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<AlertNotification>>,
}

#[async_trait]
impl AlertNotifier for RecordingNotifier {
    async fn notify(&self, notification: &AlertNotification) {
        self.sent.lock().await.push(notification.clone());
    }
}

async fn insert_query(
    db: &sea_orm::DatabaseConnection,
    connection_id: i32,
    sql: &str,
) -> saved_queries::Model {
    saved_queries::ActiveModel {
        connection_id: Set(connection_id),
        name: Set("Daily revenue".to_string()),
        sql_text: Set(sql.to_string()),
        ..saved_queries::ActiveModel::new()
    }
    .insert(db)
    .await
    .unwrap()
}

async fn insert_alert(
    db: &sea_orm::DatabaseConnection,
    query_id: i32,
    column: &str,
    operator: &str,
    threshold: f64,
) -> alerts::Model {
    alerts::ActiveModel {
        query_id: Set(query_id),
        name: Set("Revenue watch".to_string()),
        column_name: Set(column.to_string()),
        operator: Set(operator.to_string()),
        threshold: Set(threshold),
        webhook_url: Set(None),
        email: Set(None),
        ..alerts::ActiveModel::new()
    }
    .insert(db)
    .await
    .unwrap()
}

async fn history_for(db: &sea_orm::DatabaseConnection, alert_id: i32) -> Vec<alert_history::Model> {
    alert_history::Entity::find()
        .filter(alert_history::Column::AlertId.eq(alert_id))
        .all(db)
        .await
        .unwrap()
}

#[tokio::test]
async fn value_above_threshold_triggers() {
    register_static_connector();
    let db = setup_db().await;

    let connection = insert_static_connection(&db, json!([{"revenue": 120}])).await;
    let query = insert_query(&db, connection.id, "SELECT revenue FROM metrics").await;
    let alert = insert_alert(&db, query.id, "revenue", ">", 100.0).await;

    let notifier = Arc::new(RecordingNotifier::default());
    let evaluator = AlertEvaluator::new(db.clone(), notifier.clone());

    let summary = evaluator.evaluate_all().await.unwrap();
    assert_eq!(summary.evaluated, 1);
    assert_eq!(summary.triggered, 1);

    let history = history_for(&db, alert.id).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, "triggered");
    assert_eq!(history[0].value, Some(120.0));

    let sent = notifier.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].actual_value, 120.0);
    assert_eq!(sent[0].threshold, 100.0);
    assert_eq!(sent[0].query_name, "Daily revenue");

    let alert = alerts::Entity::find_by_id(alert.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alert.last_status.as_deref(), Some("triggered"));
    assert!(alert.last_run_at.is_some());
}

#[tokio::test]
async fn value_below_threshold_is_ok() {
    register_static_connector();
    let db = setup_db().await;

    let connection = insert_static_connection(&db, json!([{"revenue": 80}])).await;
    let query = insert_query(&db, connection.id, "SELECT revenue FROM metrics").await;
    let alert = insert_alert(&db, query.id, "revenue", ">", 100.0).await;

    let notifier = Arc::new(RecordingNotifier::default());
    let evaluator = AlertEvaluator::new(db.clone(), notifier.clone());

    let summary = evaluator.evaluate_all().await.unwrap();
    assert_eq!(summary.ok, 1);
    assert_eq!(summary.triggered, 0);

    let history = history_for(&db, alert.id).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, "ok");
    assert!(notifier.sent.lock().await.is_empty());
}

#[tokio::test]
async fn non_numeric_value_is_an_evaluation_error() {
    register_static_connector();
    let db = setup_db().await;

    let connection = insert_static_connection(&db, json!([{"revenue": "n/a"}])).await;
    let query = insert_query(&db, connection.id, "SELECT revenue FROM metrics").await;
    let alert = insert_alert(&db, query.id, "revenue", ">", 100.0).await;

    let notifier = Arc::new(RecordingNotifier::default());
    let evaluator = AlertEvaluator::new(db.clone(), notifier.clone());

    let summary = evaluator.evaluate_all().await.unwrap();
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.triggered, 0);

    let history = history_for(&db, alert.id).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, "error");
    assert!(history[0].value.is_none());
    assert!(history[0].message.contains("not numeric"));
    assert!(notifier.sent.lock().await.is_empty());

    let alert = alerts::Entity::find_by_id(alert.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alert.last_status.as_deref(), Some("error"));
}

#[tokio::test]
async fn one_broken_alert_does_not_block_the_cycle() {
    register_static_connector();
    let db = setup_db().await;

    let connection = insert_static_connection(&db, json!([{"revenue": 120}])).await;
    let good_query = insert_query(&db, connection.id, "SELECT revenue FROM metrics").await;

    // this alert reads a column the query never returns
    let broken = insert_alert(&db, good_query.id, "missing_column", ">", 1.0).await;
    let healthy = insert_alert(&db, good_query.id, "revenue", ">", 100.0).await;

    let notifier = Arc::new(RecordingNotifier::default());
    let evaluator = AlertEvaluator::new(db.clone(), notifier.clone());

    let summary = evaluator.evaluate_all().await.unwrap();
    assert_eq!(summary.evaluated, 2);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.triggered, 1);

    assert_eq!(history_for(&db, broken.id).await.len(), 1);
    assert_eq!(history_for(&db, healthy.id).await.len(), 1);
    assert_eq!(notifier.sent.lock().await.len(), 1);
}

#[tokio::test]
async fn each_cycle_appends_exactly_one_history_row() {
    register_static_connector();
    let db = setup_db().await;

    let connection = insert_static_connection(&db, json!([{"revenue": 120}])).await;
    let query = insert_query(&db, connection.id, "SELECT revenue FROM metrics").await;
    let alert = insert_alert(&db, query.id, "revenue", ">", 100.0).await;

    let notifier = Arc::new(RecordingNotifier::default());
    let evaluator = AlertEvaluator::new(db.clone(), notifier.clone());

    evaluator.evaluate_all().await.unwrap();
    evaluator.evaluate_all().await.unwrap();
    evaluator.evaluate_all().await.unwrap();

    assert_eq!(history_for(&db, alert.id).await.len(), 3);
}

#[tokio::test]
async fn inactive_alerts_are_skipped() {
    register_static_connector();
    let db = setup_db().await;

    let connection = insert_static_connection(&db, json!([{"revenue": 120}])).await;
    let query = insert_query(&db, connection.id, "SELECT revenue FROM metrics").await;
    let alert = insert_alert(&db, query.id, "revenue", ">", 100.0).await;

    let mut inactive: alerts::ActiveModel = alert.clone().into();
    inactive.is_active = Set(false);
    inactive.update(&db).await.unwrap();

    let notifier = Arc::new(RecordingNotifier::default());
    let evaluator = AlertEvaluator::new(db.clone(), notifier.clone());

    let summary = evaluator.evaluate_all().await.unwrap();
    assert_eq!(summary.evaluated, 0);
    assert_eq!(
        alert_history::Entity::find().count(&db).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn aggregate_query_feeds_the_alert() {
    register_static_connector();
    let db = setup_db().await;

    let rows = json!([
        {"amount": 40}, {"amount": 50}, {"amount": 40}
    ]);
    let connection = insert_static_connection(&db, rows).await;
    let query = insert_query(
        &db,
        connection.id,
        "SELECT SUM(amount) AS total FROM orders",
    )
    .await;
    let alert = insert_alert(&db, query.id, "total", ">=", 130.0).await;

    let notifier = Arc::new(RecordingNotifier::default());
    let evaluator = AlertEvaluator::new(db.clone(), notifier.clone());

    let summary = evaluator.evaluate_all().await.unwrap();
    assert_eq!(summary.triggered, 1);

    let history = history_for(&db, alert.id).await;
    assert_eq!(history[0].value, Some(130.0));
}
