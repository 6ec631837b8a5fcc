//! Job execution persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use helpdesk_core::error::{AppError, ErrorKind};
use helpdesk_core::result::AppResult;
use helpdesk_entity::job::JobExecution;

/// Storage for execution records, queried by job name in start order.
#[async_trait]
pub trait JobExecutionStore: Send + Sync + std::fmt::Debug + 'static {
    /// Insert a new execution row.
    async fn create(&self, execution: &JobExecution) -> AppResult<()>;

    /// Overwrite an existing execution row with the given state.
    async fn save(&self, execution: &JobExecution) -> AppResult<()>;

    /// Find an execution by ID.
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<JobExecution>>;

    /// Most recent executions of a job, newest first.
    async fn find_recent(&self, job_name: &str, limit: usize) -> AppResult<Vec<JobExecution>>;

    /// The most recently started execution of a job.
    async fn find_last(&self, job_name: &str) -> AppResult<Option<JobExecution>> {
        Ok(self.find_recent(job_name, 1).await?.into_iter().next())
    }

    /// Delete every execution started before `before`. Returns the number removed.
    async fn delete_started_before(&self, before: DateTime<Utc>) -> AppResult<u64>;
}

/// PostgreSQL-backed execution store.
#[derive(Debug, Clone)]
pub struct JobExecutionRepository {
    pool: PgPool,
}

impl JobExecutionRepository {
    /// Create a new job execution repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobExecutionStore for JobExecutionRepository {
    async fn create(&self, execution: &JobExecution) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO job_executions \
             (id, job_name, instance_id, status, started_at, completed_at, duration_ms, \
              records_processed, error, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(execution.id)
        .bind(&execution.job_name)
        .bind(&execution.instance_id)
        .bind(execution.status)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(execution.duration_ms)
        .bind(execution.records_processed)
        .bind(&execution.error)
        .bind(&execution.metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to create job execution", e)
        })?;
        Ok(())
    }

    async fn save(&self, execution: &JobExecution) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE job_executions SET status = $2, completed_at = $3, duration_ms = $4, \
             records_processed = $5, error = $6, metadata = $7 \
             WHERE id = $1",
        )
        .bind(execution.id)
        .bind(execution.status)
        .bind(execution.completed_at)
        .bind(execution.duration_ms)
        .bind(execution.records_processed)
        .bind(&execution.error)
        .bind(&execution.metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to update job execution", e)
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!(
                "Job execution {} not found",
                execution.id
            )));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<JobExecution>> {
        sqlx::query_as::<_, JobExecution>("SELECT * FROM job_executions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to find job execution", e)
            })
    }

    async fn find_recent(&self, job_name: &str, limit: usize) -> AppResult<Vec<JobExecution>> {
        sqlx::query_as::<_, JobExecution>(
            "SELECT * FROM job_executions WHERE job_name = $1 \
             ORDER BY started_at DESC LIMIT $2",
        )
        .bind(job_name)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list job executions", e)
        })
    }

    async fn delete_started_before(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM job_executions WHERE started_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to clean up job executions", e)
            })?;
        Ok(result.rows_affected())
    }
}
