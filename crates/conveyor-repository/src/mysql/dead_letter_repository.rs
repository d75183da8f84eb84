//! MySQL dead-letter repository implementation.

use crate::mysql::invalid_column;
use crate::pool::DatabasePool;
use crate::traits::{DeadLetterRepository, DeadLetterStats};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conveyor_core::{ConveyorError, ConveyorResult, DeadLetterJob, JobPriority};
use serde_json::Value;
use sqlx::FromRow;
use tracing::debug;

/// MySQL dead-letter repository.
#[derive(Clone)]
pub struct MySqlDeadLetterRepository {
    pool: DatabasePool,
}

impl MySqlDeadLetterRepository {
    #[must_use]
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct DeadLetterRow {
    id: String,
    original_job_id: String,
    job_name: String,
    job_type: String,
    job_payload: String,
    job_priority: String,
    failure_reason: String,
    failure_count: u32,
    last_error: Option<String>,
    error_stack: Option<String>,
    worker_id: Option<String>,
    original_created_at: DateTime<Utc>,
    failed_at: DateTime<Utc>,
}

impl TryFrom<DeadLetterRow> for DeadLetterJob {
    type Error = ConveyorError;

    fn try_from(row: DeadLetterRow) -> Result<Self, Self::Error> {
        let job_priority = JobPriority::parse(&row.job_priority)
            .ok_or_else(|| invalid_column("job_priority", &row.job_priority))?;
        let job_payload: Value = serde_json::from_str(&row.job_payload)?;

        Ok(DeadLetterJob {
            id: row.id,
            original_job_id: row.original_job_id,
            job_name: row.job_name,
            job_type: row.job_type,
            job_payload,
            job_priority,
            failure_reason: row.failure_reason,
            failure_count: row.failure_count,
            last_error: row.last_error,
            error_stack: row.error_stack,
            worker_id: row.worker_id,
            original_created_at: row.original_created_at,
            failed_at: row.failed_at,
        })
    }
}

const DLQ_COLUMNS: &str = "id, original_job_id, job_name, job_type, job_payload, job_priority, \
     failure_reason, failure_count, last_error, error_stack, worker_id, \
     original_created_at, failed_at";

#[async_trait]
impl DeadLetterRepository for MySqlDeadLetterRepository {
    async fn insert(&self, entry: &DeadLetterJob) -> ConveyorResult<()> {
        sqlx::query(
            r#"
            INSERT INTO dead_letter_jobs (id, original_job_id, job_name, job_type, job_payload,
                                          job_priority, failure_reason, failure_count, last_error,
                                          error_stack, worker_id, original_created_at, failed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.original_job_id)
        .bind(&entry.job_name)
        .bind(&entry.job_type)
        .bind(entry.job_payload.to_string())
        .bind(entry.job_priority.as_str())
        .bind(&entry.failure_reason)
        .bind(entry.failure_count)
        .bind(&entry.last_error)
        .bind(&entry.error_stack)
        .bind(&entry.worker_id)
        .bind(entry.original_created_at)
        .bind(entry.failed_at)
        .execute(self.pool.inner())
        .await?;

        debug!(
            dlq_id = %entry.id,
            original_job_id = %entry.original_job_id,
            "Archived dead-letter job"
        );
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> ConveyorResult<Option<DeadLetterJob>> {
        let row = sqlx::query_as::<_, DeadLetterRow>(&format!(
            "SELECT {DLQ_COLUMNS} FROM dead_letter_jobs WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool.inner())
        .await?;

        row.map(DeadLetterJob::try_from).transpose()
    }

    async fn list(&self, limit: u32, offset: u32) -> ConveyorResult<Vec<DeadLetterJob>> {
        let rows = sqlx::query_as::<_, DeadLetterRow>(&format!(
            "SELECT {DLQ_COLUMNS} FROM dead_letter_jobs \
             ORDER BY failed_at DESC LIMIT ? OFFSET ?"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.inner())
        .await?;

        rows.into_iter().map(DeadLetterJob::try_from).collect()
    }

    async fn delete(&self, id: &str) -> ConveyorResult<bool> {
        let result = sqlx::query("DELETE FROM dead_letter_jobs WHERE id = ?")
            .bind(id)
            .execute(self.pool.inner())
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn stats(&self) -> ConveyorResult<DeadLetterStats> {
        let row: (i64, Option<DateTime<Utc>>, Option<DateTime<Utc>>) = sqlx::query_as(
            "SELECT COUNT(*), MIN(failed_at), MAX(failed_at) FROM dead_letter_jobs",
        )
        .fetch_one(self.pool.inner())
        .await?;

        Ok(DeadLetterStats {
            total: row.0 as u64,
            oldest_failed_at: row.1,
            newest_failed_at: row.2,
        })
    }
}
