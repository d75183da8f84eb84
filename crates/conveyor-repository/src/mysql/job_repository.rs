//! MySQL job repository implementation.

use crate::mysql::invalid_column;
use crate::pool::DatabasePool;
use crate::traits::JobRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conveyor_core::{ConveyorError, ConveyorResult, Job, JobPriority, JobStatus};
use serde_json::Value;
use sqlx::FromRow;
use std::collections::HashMap;
use tracing::debug;

/// MySQL job repository.
#[derive(Clone)]
pub struct MySqlJobRepository {
    pool: DatabasePool,
}

impl MySqlJobRepository {
    #[must_use]
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a job.
#[derive(Debug, FromRow)]
struct JobRow {
    id: String,
    name: String,
    job_type: String,
    payload: String,
    priority: String,
    status: String,
    max_retries: u32,
    retry_delay_ms: u64,
    retry_count: u32,
    scheduled_at: Option<DateTime<Utc>>,
    schedule_id: Option<String>,
    worker_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    result: Option<String>,
    error: Option<String>,
    webhook_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = ConveyorError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let priority = JobPriority::parse(&row.priority)
            .ok_or_else(|| invalid_column("priority", &row.priority))?;
        let status =
            JobStatus::parse(&row.status).ok_or_else(|| invalid_column("status", &row.status))?;
        let payload: Value = serde_json::from_str(&row.payload)?;
        let result = row.result.as_deref().map(serde_json::from_str).transpose()?;

        Ok(Job {
            id: row.id,
            name: row.name,
            job_type: row.job_type,
            payload,
            priority,
            status,
            max_retries: row.max_retries,
            retry_delay_ms: row.retry_delay_ms,
            retry_count: row.retry_count,
            scheduled_at: row.scheduled_at,
            schedule_id: row.schedule_id,
            worker_id: row.worker_id,
            started_at: row.started_at,
            completed_at: row.completed_at,
            result,
            error: row.error,
            webhook_url: row.webhook_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const JOB_COLUMNS: &str = "id, name, job_type, payload, priority, status, max_retries, \
     retry_delay_ms, retry_count, scheduled_at, schedule_id, worker_id, \
     started_at, completed_at, result, error, webhook_url, created_at, updated_at";

#[async_trait]
impl JobRepository for MySqlJobRepository {
    async fn insert(&self, job: &Job) -> ConveyorResult<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, name, job_type, payload, priority, status, max_retries,
                              retry_delay_ms, retry_count, scheduled_at, schedule_id, worker_id,
                              started_at, completed_at, result, error, webhook_url,
                              created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.name)
        .bind(&job.job_type)
        .bind(job.payload.to_string())
        .bind(job.priority.as_str())
        .bind(job.status.as_str())
        .bind(job.max_retries)
        .bind(job.retry_delay_ms)
        .bind(job.retry_count)
        .bind(job.scheduled_at)
        .bind(&job.schedule_id)
        .bind(&job.worker_id)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.result.as_ref().map(|v| v.to_string()))
        .bind(&job.error)
        .bind(&job.webhook_url)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(self.pool.inner())
        .await?;

        debug!(job_id = %job.id, job_type = %job.job_type, "Inserted job");
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> ConveyorResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool.inner())
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn list(
        &self,
        status: Option<JobStatus>,
        limit: u32,
        offset: u32,
    ) -> ConveyorResult<Vec<Job>> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, JobRow>(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs WHERE status = ? \
                     ORDER BY created_at DESC LIMIT ? OFFSET ?"
                ))
                .bind(status.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(self.pool.inner())
                .await?
            }
            None => {
                sqlx::query_as::<_, JobRow>(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC LIMIT ? OFFSET ?"
                ))
                .bind(limit)
                .bind(offset)
                .fetch_all(self.pool.inner())
                .await?
            }
        };

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn mark_queued(&self, id: &str) -> ConveyorResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'QUEUED', updated_at = ? WHERE id = ? AND status = 'PENDING'",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool.inner())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_processing(&self, id: &str, worker_id: &str) -> ConveyorResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'PROCESSING', worker_id = ?, started_at = ?, updated_at = ?
            WHERE id = ? AND status IN ('QUEUED', 'RETRYING')
            "#,
        )
        .bind(worker_id)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(self.pool.inner())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete_if_processing(
        &self,
        id: &str,
        worker_id: &str,
        result_value: &Value,
    ) -> ConveyorResult<bool> {
        let now = Utc::now();
        // Compare-and-set: a worker reclaimed by orphan recovery no longer
        // matches and its late result is discarded.
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'COMPLETED', result = ?, error = NULL, completed_at = ?,
                worker_id = NULL, updated_at = ?
            WHERE id = ? AND status = 'PROCESSING' AND worker_id = ?
            "#,
        )
        .bind(result_value.to_string())
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(worker_id)
        .execute(self.pool.inner())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_retrying(&self, id: &str, error: &str) -> ConveyorResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'RETRYING', retry_count = retry_count + 1, error = ?,
                worker_id = NULL, updated_at = ?
            WHERE id = ? AND status = 'PROCESSING'
            "#,
        )
        .bind(error)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool.inner())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_failed(&self, id: &str, error: &str) -> ConveyorResult<bool> {
        let now = Utc::now();
        // QUEUED and RETRYING are included for the missing-handler path,
        // which fails a job before it ever reaches PROCESSING.
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'FAILED', error = ?, result = NULL, completed_at = ?,
                worker_id = NULL, updated_at = ?
            WHERE id = ? AND status IN ('PROCESSING', 'QUEUED', 'RETRYING')
            "#,
        )
        .bind(error)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(self.pool.inner())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn cancel(&self, id: &str) -> ConveyorResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'CANCELLED', completed_at = ?, updated_at = ?
            WHERE id = ? AND status IN ('PENDING', 'QUEUED', 'RETRYING')
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(self.pool.inner())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_processing_by_worker(
        &self,
        worker_id: &str,
        limit: u32,
    ) -> ConveyorResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE status = 'PROCESSING' AND worker_id = ? LIMIT ?"
        ))
        .bind(worker_id)
        .bind(limit)
        .fetch_all(self.pool.inner())
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn count_by_status(&self) -> ConveyorResult<HashMap<JobStatus, u64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM jobs GROUP BY status")
                .fetch_all(self.pool.inner())
                .await?;

        let mut counts = HashMap::new();
        for (status, count) in rows {
            if let Some(status) = JobStatus::parse(&status) {
                counts.insert(status, count as u64);
            }
        }
        Ok(counts)
    }

    async fn purge_terminal_older_than(&self, cutoff: DateTime<Utc>) -> ConveyorResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE status IN ('COMPLETED', 'FAILED', 'CANCELLED') AND completed_at < ?
            "#,
        )
        .bind(cutoff)
        .execute(self.pool.inner())
        .await?;

        Ok(result.rows_affected())
    }
}
