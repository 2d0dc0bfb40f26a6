use std::sync::Arc;

use futures::future::join_all;
use indexmap::IndexMap;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::connectors::{self, projection::as_f64, ConnectorConfig};
use crate::database::entities::{alert_history, alerts, connections, saved_queries};
use crate::errors::{AlertError, AlertResult};

use super::notify::{AlertNotification, AlertNotifier};
use super::AlertStatus;

/// Totals for one evaluation cycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub evaluated: usize,
    pub triggered: usize,
    pub ok: usize,
    pub errors: usize,
}

/// Re-runs saved queries for active alerts and dispatches notifications.
///
/// Evaluations are isolated: one alert failing — bad query, dead source,
/// non-numeric result — is recorded as an `error` outcome for that alert and
/// never blocks the rest of the cycle.
pub struct AlertEvaluator {
    db: DatabaseConnection,
    notifier: Arc<dyn AlertNotifier>,
}

impl AlertEvaluator {
    pub fn new(db: DatabaseConnection, notifier: Arc<dyn AlertNotifier>) -> Self {
        Self { db, notifier }
    }

    /// Evaluate every active alert once.
    pub async fn evaluate_all(&self) -> Result<CycleSummary, sea_orm::DbErr> {
        let active = alerts::Entity::find()
            .filter(alerts::Column::IsActive.eq(true))
            .all(&self.db)
            .await?;

        let outcomes = join_all(active.iter().map(|alert| self.evaluate_and_record(alert))).await;

        let mut summary = CycleSummary::default();
        for status in outcomes {
            summary.evaluated += 1;
            match status {
                AlertStatus::Triggered => summary.triggered += 1,
                AlertStatus::Ok => summary.ok += 1,
                AlertStatus::Error => summary.errors += 1,
            }
        }

        tracing::info!(
            "Alert cycle: {} evaluated, {} triggered, {} ok, {} errors",
            summary.evaluated,
            summary.triggered,
            summary.ok,
            summary.errors
        );
        Ok(summary)
    }

    /// Evaluate one alert and persist the outcome. Exactly one history row
    /// is written whatever happens inside.
    async fn evaluate_and_record(&self, alert: &alerts::Model) -> AlertStatus {
        let (status, value, message) = match self.evaluate(alert).await {
            Ok((value, triggered, query)) => {
                if triggered {
                    self.notifier
                        .notify(&build_notification(alert, &query, value))
                        .await;
                    (
                        AlertStatus::Triggered,
                        Some(value),
                        format!(
                            "value {} {} threshold {}",
                            value, alert.operator, alert.threshold
                        ),
                    )
                } else {
                    (
                        AlertStatus::Ok,
                        Some(value),
                        format!(
                            "value {} within threshold ({} {})",
                            value, alert.operator, alert.threshold
                        ),
                    )
                }
            }
            Err(e) => {
                tracing::warn!("Alert {} evaluation failed: {}", alert.id, e);
                (AlertStatus::Error, None, e.to_string())
            }
        };

        if let Err(e) = self.record(alert, status, value, &message).await {
            tracing::error!("Could not record evaluation of alert {}: {}", alert.id, e);
        }
        status
    }

    /// Run the saved query and compare. Returns (value, triggered, query).
    async fn evaluate(
        &self,
        alert: &alerts::Model,
    ) -> AlertResult<(f64, bool, saved_queries::Model)> {
        let query = saved_queries::Entity::find_by_id(alert.query_id)
            .one(&self.db)
            .await?
            .ok_or(AlertError::QueryNotFound(alert.query_id))?;

        let connection = connections::Entity::find_by_id(query.connection_id)
            .one(&self.db)
            .await?
            .ok_or(AlertError::ConnectionNotFound(query.connection_id))?;

        let config = ConnectorConfig::from_connection(&connection);
        let sql = query.sql_text.clone();
        let result = connectors::with_connector(&config, |connector| {
            let sql = sql.clone();
            Box::pin(async move { connector.execute_query(&sql).await })
        })
        .await?;

        let first = result.rows.first().ok_or(AlertError::EmptyResult)?;
        let cell = first
            .get(&alert.column_name)
            .ok_or_else(|| AlertError::MissingColumn(alert.column_name.clone()))?;

        // a non-numeric value is a hard evaluation error, not a trigger
        let value = as_f64(cell).ok_or_else(|| AlertError::NonNumericValue {
            column: alert.column_name.clone(),
            value: cell.to_string(),
        })?;

        let triggered = compare(&alert.operator, value, alert.threshold)?;
        Ok((value, triggered, query))
    }

    async fn record(
        &self,
        alert: &alerts::Model,
        status: AlertStatus,
        value: Option<f64>,
        message: &str,
    ) -> AlertResult<()> {
        alert_history::ActiveModel {
            alert_id: Set(alert.id),
            status: Set(status.as_str().to_string()),
            value: Set(value),
            message: Set(message.to_string()),
            ..alert_history::ActiveModel::new()
        }
        .insert(&self.db)
        .await?;

        let mut active: alerts::ActiveModel = alert.clone().into();
        active.last_run_at = Set(Some(chrono::Utc::now()));
        active.last_status = Set(Some(status.as_str().to_string()));
        active.set_updated_at().update(&self.db).await?;

        Ok(())
    }
}

fn build_notification(
    alert: &alerts::Model,
    query: &saved_queries::Model,
    value: f64,
) -> AlertNotification {
    let webhook_headers: IndexMap<String, String> =
        serde_json::from_str(&alert.webhook_headers).unwrap_or_default();

    AlertNotification {
        alert_id: alert.id,
        alert_name: alert.name.clone(),
        email: alert.email.clone(),
        webhook_url: alert.webhook_url.clone(),
        webhook_headers,
        column: alert.column_name.clone(),
        operator: alert.operator.clone(),
        threshold: alert.threshold,
        actual_value: value,
        query_id: query.id,
        query_name: query.name.clone(),
    }
}

/// Threshold comparison with the alert's stored operator
fn compare(operator: &str, value: f64, threshold: f64) -> AlertResult<bool> {
    match operator {
        ">" => Ok(value > threshold),
        "<" => Ok(value < threshold),
        ">=" => Ok(value >= threshold),
        "<=" => Ok(value <= threshold),
        "=" => Ok((value - threshold).abs() < f64::EPSILON),
        "!=" => Ok((value - threshold).abs() >= f64::EPSILON),
        other => Err(AlertError::UnknownOperator(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_comparisons() {
        assert!(compare(">", 120.0, 100.0).unwrap());
        assert!(!compare(">", 80.0, 100.0).unwrap());
        assert!(compare("<=", 100.0, 100.0).unwrap());
        assert!(compare("=", 5.0, 5.0).unwrap());
        assert!(compare("!=", 5.0, 6.0).unwrap());
        assert!(matches!(
            compare("~", 1.0, 1.0),
            Err(AlertError::UnknownOperator(_))
        ));
    }
}
