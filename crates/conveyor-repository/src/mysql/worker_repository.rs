//! MySQL worker repository implementation.

use crate::mysql::invalid_column;
use crate::pool::DatabasePool;
use crate::traits::WorkerRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conveyor_core::{ConveyorError, ConveyorResult, WorkerRecord, WorkerStatus};
use sqlx::FromRow;
use tracing::debug;

/// MySQL worker repository.
#[derive(Clone)]
pub struct MySqlWorkerRepository {
    pool: DatabasePool,
}

impl MySqlWorkerRepository {
    #[must_use]
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct WorkerRow {
    id: String,
    name: String,
    hostname: String,
    pid: u32,
    status: String,
    concurrency: u32,
    active_jobs: u32,
    processed_count: u64,
    failed_count: u64,
    last_heartbeat: DateTime<Utc>,
    started_at: DateTime<Utc>,
    stopped_at: Option<DateTime<Utc>>,
}

impl TryFrom<WorkerRow> for WorkerRecord {
    type Error = ConveyorError;

    fn try_from(row: WorkerRow) -> Result<Self, Self::Error> {
        let status = WorkerStatus::parse(&row.status)
            .ok_or_else(|| invalid_column("status", &row.status))?;

        Ok(WorkerRecord {
            id: row.id,
            name: row.name,
            hostname: row.hostname,
            pid: row.pid,
            status,
            concurrency: row.concurrency,
            active_jobs: row.active_jobs,
            processed_count: row.processed_count,
            failed_count: row.failed_count,
            last_heartbeat: row.last_heartbeat,
            started_at: row.started_at,
            stopped_at: row.stopped_at,
        })
    }
}

const WORKER_COLUMNS: &str = "id, name, hostname, pid, status, concurrency, active_jobs, \
     processed_count, failed_count, last_heartbeat, started_at, stopped_at";

#[async_trait]
impl WorkerRepository for MySqlWorkerRepository {
    async fn insert(&self, worker: &WorkerRecord) -> ConveyorResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workers (id, name, hostname, pid, status, concurrency, active_jobs,
                                 processed_count, failed_count, last_heartbeat, started_at,
                                 stopped_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&worker.id)
        .bind(&worker.name)
        .bind(&worker.hostname)
        .bind(worker.pid)
        .bind(worker.status.as_str())
        .bind(worker.concurrency)
        .bind(worker.active_jobs)
        .bind(worker.processed_count)
        .bind(worker.failed_count)
        .bind(worker.last_heartbeat)
        .bind(worker.started_at)
        .bind(worker.stopped_at)
        .execute(self.pool.inner())
        .await?;

        debug!(worker_id = %worker.id, hostname = %worker.hostname, "Registered worker");
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> ConveyorResult<Option<WorkerRecord>> {
        let row = sqlx::query_as::<_, WorkerRow>(&format!(
            "SELECT {WORKER_COLUMNS} FROM workers WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool.inner())
        .await?;

        row.map(WorkerRecord::try_from).transpose()
    }

    async fn list(&self) -> ConveyorResult<Vec<WorkerRecord>> {
        let rows = sqlx::query_as::<_, WorkerRow>(&format!(
            "SELECT {WORKER_COLUMNS} FROM workers ORDER BY started_at DESC"
        ))
        .fetch_all(self.pool.inner())
        .await?;

        rows.into_iter().map(WorkerRecord::try_from).collect()
    }

    async fn heartbeat(&self, id: &str, now: DateTime<Utc>) -> ConveyorResult<bool> {
        // last_heartbeat only ever moves forward.
        let result = sqlx::query(
            "UPDATE workers SET last_heartbeat = ? WHERE id = ? AND last_heartbeat <= ?",
        )
        .bind(now)
        .bind(id)
        .bind(now)
        .execute(self.pool.inner())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_active_jobs(&self, id: &str, active_jobs: u32) -> ConveyorResult<bool> {
        let result = sqlx::query("UPDATE workers SET active_jobs = ? WHERE id = ?")
            .bind(active_jobs)
            .bind(id)
            .execute(self.pool.inner())
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_outcome(&self, id: &str, success: bool) -> ConveyorResult<bool> {
        let query = if success {
            "UPDATE workers SET processed_count = processed_count + 1 WHERE id = ?"
        } else {
            "UPDATE workers SET failed_count = failed_count + 1 WHERE id = ?"
        };

        let result = sqlx::query(query).bind(id).execute(self.pool.inner()).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_stopped(&self, id: &str, now: DateTime<Utc>) -> ConveyorResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE workers
            SET status = 'stopped', stopped_at = ?, active_jobs = 0
            WHERE id = ? AND status != 'stopped'
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(self.pool.inner())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_stale(&self, cutoff: DateTime<Utc>) -> ConveyorResult<Vec<WorkerRecord>> {
        let rows = sqlx::query_as::<_, WorkerRow>(&format!(
            "SELECT {WORKER_COLUMNS} FROM workers \
             WHERE status = 'active' AND last_heartbeat < ?"
        ))
        .bind(cutoff)
        .fetch_all(self.pool.inner())
        .await?;

        rows.into_iter().map(WorkerRecord::try_from).collect()
    }

    async fn count_active(&self) -> ConveyorResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM workers WHERE status = 'active'")
                .fetch_one(self.pool.inner())
                .await?;

        Ok(count as u64)
    }
}
