//! Durable job queue
//!
//! Jobs live in the job_executions table (the durable side) and are handed
//! to a fixed pool of worker tasks through an in-process channel (the fast
//! side). On startup [`JobQueue::recover`] re-queues whatever was pending
//! when the process last stopped, which is what makes delivery at-least-once:
//! a job can be redelivered after a crash, and the worker's upsert-keyed load
//! absorbs the repeat.
//!
//! Retry policy: transient failures are re-opened with exponential backoff up
//! to the attempt budget; configuration and quality-gate failures are
//! terminal on first occurrence. Exhausted jobs stay FAILED and visible.
//! Terminal executions are pruned to a bounded per-pipeline retention count.

use std::sync::Arc;
use std::time::Duration;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::database::entities::{job_executions, pipelines, JobStatus};
use crate::errors::{PipelineError, PipelineResult};
use crate::worker::PipelineWorker;

/// Tuning knobs for the queue and its worker pool
#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// Concurrent worker tasks draining the queue
    pub workers: usize,
    /// Attempt budget per job, first attempt included
    pub max_attempts: i32,
    /// Base delay for exponential backoff (1x, 2x, 4x, ...)
    pub backoff_base: Duration,
    /// Terminal executions retained per pipeline
    pub retention: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            retention: 50,
        }
    }
}

/// Payload handed from trigger to worker
#[derive(Clone, Debug)]
pub struct QueuedJob {
    pub execution_id: i32,
    pub pipeline_id: i32,
    pub source_type: String,
}

pub struct JobQueue {
    db: DatabaseConnection,
    tx: mpsc::UnboundedSender<QueuedJob>,
    config: QueueConfig,
    /// Serializes the lease check inside enqueue
    enqueue_lock: Mutex<()>,
}

impl JobQueue {
    /// Create the queue and spawn its worker pool.
    pub fn start(db: DatabaseConnection, config: QueueConfig) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel::<QueuedJob>();
        let rx = Arc::new(Mutex::new(rx));

        let queue = Arc::new(Self {
            db: db.clone(),
            tx: tx.clone(),
            config: config.clone(),
            enqueue_lock: Mutex::new(()),
        });

        for worker_index in 0..config.workers.max(1) {
            let rx = rx.clone();
            let queue = queue.clone();
            tokio::spawn(async move {
                tracing::debug!("Queue worker {} started", worker_index);
                loop {
                    let job = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    let Some(job) = job else {
                        tracing::debug!("Queue worker {} shutting down", worker_index);
                        break;
                    };
                    queue.process(job).await;
                }
            });
        }

        queue
    }

    /// Create a PENDING execution and hand it to the pool.
    ///
    /// Per-pipeline lease: refused while any non-terminal execution exists
    /// for the pipeline, so overlapping runs of one pipeline cannot start.
    /// The lease releases itself when that execution reaches a terminal
    /// state.
    pub async fn enqueue(&self, pipeline_id: i32) -> PipelineResult<job_executions::Model> {
        let _guard = self.enqueue_lock.lock().await;

        let pipeline = pipelines::Entity::find_by_id(pipeline_id)
            .one(&self.db)
            .await?
            .ok_or(PipelineError::NotFound(pipeline_id))?;

        let active = job_executions::Entity::find()
            .filter(job_executions::Column::PipelineId.eq(pipeline_id))
            .filter(job_executions::Column::Status.is_in([
                JobStatus::Pending.as_str(),
                JobStatus::Processing.as_str(),
            ]))
            .count(&self.db)
            .await?;
        if active > 0 {
            return Err(PipelineError::AlreadyRunning(pipeline_id));
        }

        let execution = job_executions::ActiveModel {
            pipeline_id: Set(pipeline_id),
            batch_id: Set(Uuid::new_v4().to_string()),
            ..job_executions::ActiveModel::new()
        }
        .insert(&self.db)
        .await?;

        self.dispatch(QueuedJob {
            execution_id: execution.id,
            pipeline_id,
            source_type: pipeline.source_type.clone(),
        });

        tracing::info!(
            "Enqueued execution {} for pipeline {} ({})",
            execution.id,
            pipeline_id,
            pipeline.source_type
        );
        Ok(execution)
    }

    /// Re-queue executions left PENDING by a previous process. Call once at
    /// startup, before accepting triggers.
    pub async fn recover(&self) -> PipelineResult<usize> {
        let pending = job_executions::Entity::find()
            .filter(job_executions::Column::Status.eq(JobStatus::Pending.as_str()))
            .order_by_asc(job_executions::Column::Id)
            .all(&self.db)
            .await?;

        let count = pending.len();
        for execution in pending {
            let pipeline = pipelines::Entity::find_by_id(execution.pipeline_id)
                .one(&self.db)
                .await?;
            let Some(pipeline) = pipeline else { continue };
            self.dispatch(QueuedJob {
                execution_id: execution.id,
                pipeline_id: execution.pipeline_id,
                source_type: pipeline.source_type,
            });
        }

        if count > 0 {
            tracing::info!("Recovered {} pending executions into the queue", count);
        }
        Ok(count)
    }

    fn dispatch(&self, job: QueuedJob) {
        // send only fails when every worker is gone, i.e. at shutdown
        if self.tx.send(job).is_err() {
            tracing::warn!("Queue workers are gone; job dropped");
        }
    }

    async fn process(&self, job: QueuedJob) {
        let worker = PipelineWorker::new(self.db.clone());

        match worker.execute(job.execution_id).await {
            Ok(()) => {
                self.prune(job.pipeline_id).await;
            }
            Err(err) if err.is_terminal() => {
                tracing::warn!(
                    "Execution {} failed terminally: {}",
                    job.execution_id,
                    err
                );
                self.prune(job.pipeline_id).await;
            }
            Err(err) => {
                if let Err(retry_err) = self.schedule_retry(&job, &err).await {
                    tracing::error!(
                        "Could not schedule retry for execution {}: {}",
                        job.execution_id,
                        retry_err
                    );
                }
                self.prune(job.pipeline_id).await;
            }
        }
    }

    /// Re-open a transiently-failed execution and redeliver it after backoff,
    /// while attempts remain.
    async fn schedule_retry(&self, job: &QueuedJob, err: &PipelineError) -> PipelineResult<()> {
        let execution = job_executions::Entity::find_by_id(job.execution_id)
            .one(&self.db)
            .await?
            .ok_or(PipelineError::ExecutionNotFound(job.execution_id))?;

        if execution.attempts >= self.config.max_attempts {
            tracing::warn!(
                "Execution {} exhausted {} attempts; leaving FAILED: {}",
                job.execution_id,
                execution.attempts,
                err
            );
            return Ok(());
        }

        let delay = backoff_delay(self.config.backoff_base, execution.attempts);
        let retry_line = format!(
            "[QUEUE] Attempt {}/{} scheduled in {}ms.",
            execution.attempts + 1,
            self.config.max_attempts,
            delay.as_millis()
        );

        let mut log = execution.log.clone();
        if !log.is_empty() {
            log.push('\n');
        }
        log.push_str(&retry_line);

        let mut active: job_executions::ActiveModel = execution.into();
        active.status = Set(JobStatus::Pending.as_str().to_string());
        active.log = Set(log);
        active.set_updated_at().update(&self.db).await?;

        let tx = self.tx.clone();
        let job = job.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(job).is_err() {
                tracing::warn!("Queue workers are gone; retry dropped");
            }
        });

        Ok(())
    }

    /// Bound the terminal-execution history per pipeline.
    async fn prune(&self, pipeline_id: i32) {
        let result: PipelineResult<()> = async {
            let terminal = job_executions::Entity::find()
                .filter(job_executions::Column::PipelineId.eq(pipeline_id))
                .filter(job_executions::Column::Status.is_in([
                    JobStatus::Completed.as_str(),
                    JobStatus::Failed.as_str(),
                ]))
                .order_by_desc(job_executions::Column::Id)
                .all(&self.db)
                .await?;

            let stale: Vec<i32> = terminal
                .iter()
                .skip(self.config.retention as usize)
                .map(|e| e.id)
                .collect();
            if !stale.is_empty() {
                job_executions::Entity::delete_many()
                    .filter(job_executions::Column::Id.is_in(stale.clone()))
                    .exec(&self.db)
                    .await?;
                tracing::debug!(
                    "Pruned {} old executions for pipeline {}",
                    stale.len(),
                    pipeline_id
                );
            }
            Ok(())
        }
        .await;

        if let Err(e) = result {
            tracing::warn!("Execution pruning failed for pipeline {}: {}", pipeline_id, e);
        }
    }
}

/// 1x, 2x, 4x, ... of the base delay
fn backoff_delay(base: Duration, attempts_so_far: i32) -> Duration {
    let exponent = attempts_so_far.saturating_sub(1).clamp(0, 16) as u32;
    base * 2u32.saturating_pow(exponent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_progression() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(4));
    }

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.workers, 5);
        assert_eq!(config.max_attempts, 3);
    }
}
