//! Pipeline worker
//!
//! Executes one claimed job through extract → transform → quality check →
//! load, maintaining the execution's status, stage-tagged log, and the
//! pipeline's last-run bookkeeping. Claiming is a conditional
//! pending→processing update, so exactly one worker ever owns a job even
//! when the queue redelivers it.

use std::time::Instant;

use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use sha2::{Digest, Sha256};

use crate::connectors::{self, ConnectorConfig, Record};
use crate::database::entities::{
    job_executions, pipeline_rows, pipelines, JobStatus, RunStatus,
};
use crate::errors::{PipelineError, PipelineResult};
use crate::{quality, transform};

/// Rows per INSERT statement during load; keeps well under SQLite's
/// bind-variable limit
const LOAD_CHUNK_SIZE: usize = 500;

/// Violation detail lines copied into the execution log
const LOGGED_VIOLATIONS: usize = 5;

/// Accumulates stage-tagged log lines for one execution
#[derive(Debug, Default)]
pub struct ExecutionLog {
    lines: Vec<String>,
}

impl ExecutionLog {
    pub fn push(&mut self, stage: &str, message: impl AsRef<str>) {
        let line = format!("[{}] {}", stage, message.as_ref());
        tracing::info!("{}", line);
        self.lines.push(line);
    }

    pub fn join(&self) -> String {
        self.lines.join("\n")
    }
}

pub struct PipelineWorker {
    db: DatabaseConnection,
}

impl PipelineWorker {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Run one job to a terminal state.
    ///
    /// Returns the error to the queue so its retry policy can decide whether
    /// to re-attempt; every error is already recorded on the execution row
    /// by the time this returns.
    pub async fn execute(&self, execution_id: i32) -> PipelineResult<()> {
        let started = Instant::now();

        if !self.claim(execution_id).await? {
            tracing::debug!("Execution {} already claimed; skipping", execution_id);
            return Ok(());
        }

        let execution = job_executions::Entity::find_by_id(execution_id)
            .one(&self.db)
            .await?
            .ok_or(PipelineError::ExecutionNotFound(execution_id))?;

        let mut log = ExecutionLog::default();
        // a retried job starts its log from the prior attempt's lines
        for line in execution.log_lines() {
            log.lines.push(line.to_string());
        }

        let pipeline = match pipelines::Entity::find_by_id(execution.pipeline_id)
            .one(&self.db)
            .await?
        {
            Some(pipeline) => pipeline,
            None => {
                let err = PipelineError::NotFound(execution.pipeline_id);
                self.finish_failed(&execution, &mut log, &err, started).await?;
                return Err(err);
            }
        };

        match self.run_stages(&pipeline, &execution, &mut log).await {
            Ok(rows_processed) => {
                self.finish_completed(&execution, &pipeline, &mut log, rows_processed, started)
                    .await?;
                Ok(())
            }
            Err(err) => {
                self.finish_failed(&execution, &mut log, &err, started).await?;
                self.stamp_pipeline(&pipeline, RunStatus::Failed).await?;
                Err(err)
            }
        }
    }

    /// Exclusive claim: pending → processing. False when another worker won.
    async fn claim(&self, execution_id: i32) -> PipelineResult<bool> {
        let result = job_executions::Entity::update_many()
            .col_expr(
                job_executions::Column::Status,
                Expr::value(JobStatus::Processing.as_str()),
            )
            .col_expr(
                job_executions::Column::StartedAt,
                Expr::value(chrono::Utc::now()),
            )
            .col_expr(
                job_executions::Column::Attempts,
                Expr::col(job_executions::Column::Attempts).add(1),
            )
            .col_expr(
                job_executions::Column::UpdatedAt,
                Expr::value(chrono::Utc::now()),
            )
            .filter(job_executions::Column::Id.eq(execution_id))
            .filter(job_executions::Column::Status.eq(JobStatus::Pending.as_str()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn run_stages(
        &self,
        pipeline: &pipelines::Model,
        execution: &job_executions::Model,
        log: &mut ExecutionLog,
    ) -> PipelineResult<i64> {
        // EXTRACT
        let stage_started = Instant::now();
        let config = ConnectorConfig::from_json(&pipeline.source_type, &pipeline.source_config)
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        let extract_sql = extract_query(&config)?;

        let result = connectors::with_connector(&config, |connector| {
            let sql = extract_sql.clone();
            Box::pin(async move { connector.execute_query(&sql).await })
        })
        .await?;
        log.push(
            "EXTRACT",
            format!(
                "Extracted {} rows from {} source. ({}ms)",
                result.row_count,
                pipeline.source_type,
                stage_started.elapsed().as_millis()
            ),
        );

        let mut rows = result.rows;

        // TRANSFORM (ETL mode only)
        if pipeline.is_etl() {
            let steps = transform::parse_steps(&pipeline.transformation_steps)
                .map_err(|e| PipelineError::Configuration(format!("transformation steps: {e}")))?;
            if !steps.is_empty() {
                let stage_started = Instant::now();
                let outcome = transform::apply(rows, &steps)?;
                for (index, step) in outcome.steps.iter().enumerate() {
                    if step.rows_dropped > 0 {
                        log.push(
                            "TRANSFORM",
                            format!(
                                "Step {} ({}): {} rows dropped.",
                                index + 1,
                                step.kind,
                                step.rows_dropped
                            ),
                        );
                    }
                }
                log.push(
                    "TRANSFORM",
                    format!(
                        "Applied {} steps; {} rows dropped. ({}ms)",
                        outcome.steps.len(),
                        outcome.rows_dropped(),
                        stage_started.elapsed().as_millis()
                    ),
                );
                rows = outcome.rows;
            }
        }

        // QUALITY CHECK
        let rules = quality::parse_rules(&pipeline.quality_rules)
            .map_err(|e| PipelineError::Configuration(format!("quality rules: {e}")))?;
        if !rules.is_empty() {
            let report = quality::evaluate(&rows, &rules);
            log.push("QUALITY", format!("Found {} violations.", report.total()));
            for violation in report.violations.iter().take(LOGGED_VIOLATIONS) {
                log.push(
                    "QUALITY",
                    format!("Row {}: {}", violation.row_index, violation.message),
                );
            }
            if report.total() > LOGGED_VIOLATIONS {
                log.push(
                    "QUALITY",
                    format!("... and {} more.", report.total() - LOGGED_VIOLATIONS),
                );
            }
            if report.has_failures() {
                log.push(
                    "QUALITY",
                    format!(
                        "{} FAIL-severity violations; aborting before load.",
                        report.fail_count()
                    ),
                );
                return Err(PipelineError::QualityGate {
                    violations: report.fail_count(),
                    columns: report.failed_columns().join(", "),
                });
            }
        }

        // LOAD
        let stage_started = Instant::now();
        let loaded = self
            .load_batch(pipeline.id, &execution.batch_id, &rows)
            .await?;
        if pipeline.is_etl() {
            log.push(
                "LOAD",
                format!(
                    "Loaded {} rows for batch {}. ({}ms)",
                    loaded,
                    execution.batch_id,
                    stage_started.elapsed().as_millis()
                ),
            );
        } else {
            log.push(
                "LOAD",
                format!(
                    "Raw batch {} persisted ({} rows); destination-side transformation delegated to {}. ({}ms)",
                    execution.batch_id,
                    loaded,
                    pipeline.destination_type,
                    stage_started.elapsed().as_millis()
                ),
            );
        }

        self.store_fingerprint(execution.id, &rows).await?;

        Ok(loaded)
    }

    /// Idempotent load: upsert on (pipeline_id, batch_id, row_number) so a
    /// redelivered job replaces its own rows instead of duplicating them.
    async fn load_batch(
        &self,
        pipeline_id: i32,
        batch_id: &str,
        rows: &[Record],
    ) -> PipelineResult<i64> {
        for (chunk_index, chunk) in rows.chunks(LOAD_CHUNK_SIZE).enumerate() {
            let models: Vec<pipeline_rows::ActiveModel> = chunk
                .iter()
                .enumerate()
                .map(|(offset, row)| pipeline_rows::ActiveModel {
                    pipeline_id: Set(pipeline_id),
                    batch_id: Set(batch_id.to_string()),
                    row_number: Set((chunk_index * LOAD_CHUNK_SIZE + offset) as i32),
                    data: Set(serde_json::Value::Object(row.clone()).to_string()),
                    loaded_at: Set(chrono::Utc::now()),
                    ..Default::default()
                })
                .collect();

            pipeline_rows::Entity::insert_many(models)
                .on_conflict(
                    OnConflict::columns([
                        pipeline_rows::Column::PipelineId,
                        pipeline_rows::Column::BatchId,
                        pipeline_rows::Column::RowNumber,
                    ])
                    .update_columns([
                        pipeline_rows::Column::Data,
                        pipeline_rows::Column::LoadedAt,
                    ])
                    .to_owned(),
                )
                .exec(&self.db)
                .await
                .map_err(|e| PipelineError::Load(e.to_string()))?;
        }

        Ok(rows.len() as i64)
    }

    async fn store_fingerprint(&self, execution_id: i32, rows: &[Record]) -> PipelineResult<()> {
        let mut hasher = Sha256::new();
        for row in rows {
            hasher.update(serde_json::Value::Object(row.clone()).to_string().as_bytes());
            hasher.update(b"\n");
        }
        let digest = format!("{:x}", hasher.finalize());

        let mut active: job_executions::ActiveModel =
            job_executions::ActiveModel {
                id: Set(execution_id),
                ..Default::default()
            };
        active.batch_fingerprint = Set(Some(digest[..16].to_string()));
        active.update(&self.db).await?;
        Ok(())
    }

    async fn finish_completed(
        &self,
        execution: &job_executions::Model,
        pipeline: &pipelines::Model,
        log: &mut ExecutionLog,
        rows_processed: i64,
        started: Instant,
    ) -> PipelineResult<()> {
        let duration_ms = started.elapsed().as_millis() as i64;
        log.push(
            "DONE",
            format!("Completed in {}ms; {} rows processed.", duration_ms, rows_processed),
        );

        let mut active: job_executions::ActiveModel = execution.clone().into();
        active.status = Set(JobStatus::Completed.as_str().to_string());
        active.completed_at = Set(Some(chrono::Utc::now()));
        active.duration_ms = Set(Some(duration_ms));
        active.rows_processed = Set(Some(rows_processed));
        active.log = Set(log.join());
        active.error = Set(None);
        active.set_updated_at().update(&self.db).await?;

        self.stamp_pipeline(pipeline, RunStatus::Success).await?;
        Ok(())
    }

    async fn finish_failed(
        &self,
        execution: &job_executions::Model,
        log: &mut ExecutionLog,
        err: &PipelineError,
        started: Instant,
    ) -> PipelineResult<()> {
        let duration_ms = started.elapsed().as_millis() as i64;
        log.push("ERROR", err.to_string());

        let mut active: job_executions::ActiveModel = execution.clone().into();
        active.status = Set(JobStatus::Failed.as_str().to_string());
        active.completed_at = Set(Some(chrono::Utc::now()));
        active.duration_ms = Set(Some(duration_ms));
        active.log = Set(log.join());
        active.error = Set(Some(err.to_string()));
        active.set_updated_at().update(&self.db).await?;
        Ok(())
    }

    async fn stamp_pipeline(
        &self,
        pipeline: &pipelines::Model,
        status: RunStatus,
    ) -> PipelineResult<()> {
        let mut active: pipelines::ActiveModel = pipeline.clone().into();
        active.last_run_at = Set(Some(chrono::Utc::now()));
        active.last_status = Set(Some(status.as_str().to_string()));
        active.set_updated_at().update(&self.db).await?;
        Ok(())
    }
}

/// The extract statement comes from the pipeline's source config: either a
/// full `query`, or a `table` name expanded to a SELECT *.
fn extract_query(config: &ConnectorConfig) -> PipelineResult<String> {
    if let Some(query) = config.extra_config.get("query").and_then(|v| v.as_str()) {
        return Ok(query.to_string());
    }
    if let Some(table) = config.extra_config.get("table").and_then(|v| v.as_str()) {
        return Ok(format!("SELECT * FROM {table}"));
    }
    Err(PipelineError::Configuration(
        "source config needs either 'query' or 'table'".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_query_from_config() {
        let mut config = ConnectorConfig::default();
        config
            .extra_config
            .insert("table".to_string(), serde_json::json!("orders"));
        assert_eq!(extract_query(&config).unwrap(), "SELECT * FROM orders");

        config.extra_config.insert(
            "query".to_string(),
            serde_json::json!("SELECT id FROM orders WHERE total > 5"),
        );
        assert_eq!(
            extract_query(&config).unwrap(),
            "SELECT id FROM orders WHERE total > 5"
        );

        let empty = ConnectorConfig::default();
        assert!(matches!(
            extract_query(&empty),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_log_format() {
        let mut log = ExecutionLog::default();
        log.push("EXTRACT", "Extracted 100 rows.");
        log.push("QUALITY", "Found 3 violations.");
        assert_eq!(
            log.join(),
            "[EXTRACT] Extracted 100 rows.\n[QUALITY] Found 3 violations."
        );
    }
}
