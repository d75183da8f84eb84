//! MySQL schedule repository implementation.

use crate::mysql::invalid_column;
use crate::pool::DatabasePool;
use crate::traits::ScheduleRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conveyor_core::{ConveyorError, ConveyorResult, JobPriority, Schedule};
use serde_json::Value;
use sqlx::FromRow;
use tracing::debug;

/// MySQL schedule repository.
#[derive(Clone)]
pub struct MySqlScheduleRepository {
    pool: DatabasePool,
}

impl MySqlScheduleRepository {
    #[must_use]
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ScheduleRow {
    id: String,
    name: String,
    cron_expr: String,
    timezone: String,
    enabled: bool,
    job_type: String,
    job_payload: String,
    job_priority: String,
    next_run_at: Option<DateTime<Utc>>,
    last_run_at: Option<DateTime<Utc>>,
    run_count: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ScheduleRow> for Schedule {
    type Error = ConveyorError;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        let job_priority = JobPriority::parse(&row.job_priority)
            .ok_or_else(|| invalid_column("job_priority", &row.job_priority))?;
        let job_payload: Value = serde_json::from_str(&row.job_payload)?;

        Ok(Schedule {
            id: row.id,
            name: row.name,
            cron_expr: row.cron_expr,
            timezone: row.timezone,
            enabled: row.enabled,
            job_type: row.job_type,
            job_payload,
            job_priority,
            next_run_at: row.next_run_at,
            last_run_at: row.last_run_at,
            run_count: row.run_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SCHEDULE_COLUMNS: &str = "id, name, cron_expr, timezone, enabled, job_type, job_payload, \
     job_priority, next_run_at, last_run_at, run_count, created_at, updated_at";

#[async_trait]
impl ScheduleRepository for MySqlScheduleRepository {
    async fn insert(&self, schedule: &Schedule) -> ConveyorResult<()> {
        sqlx::query(
            r#"
            INSERT INTO schedules (id, name, cron_expr, timezone, enabled, job_type,
                                   job_payload, job_priority, next_run_at, last_run_at,
                                   run_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&schedule.id)
        .bind(&schedule.name)
        .bind(&schedule.cron_expr)
        .bind(&schedule.timezone)
        .bind(schedule.enabled)
        .bind(&schedule.job_type)
        .bind(schedule.job_payload.to_string())
        .bind(schedule.job_priority.as_str())
        .bind(schedule.next_run_at)
        .bind(schedule.last_run_at)
        .bind(schedule.run_count)
        .bind(schedule.created_at)
        .bind(schedule.updated_at)
        .execute(self.pool.inner())
        .await?;

        debug!(schedule_id = %schedule.id, name = %schedule.name, "Inserted schedule");
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> ConveyorResult<Option<Schedule>> {
        let row = sqlx::query_as::<_, ScheduleRow>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool.inner())
        .await?;

        row.map(Schedule::try_from).transpose()
    }

    async fn list(&self, limit: u32, offset: u32) -> ConveyorResult<Vec<Schedule>> {
        let rows = sqlx::query_as::<_, ScheduleRow>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules ORDER BY name LIMIT ? OFFSET ?"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.inner())
        .await?;

        rows.into_iter().map(Schedule::try_from).collect()
    }

    async fn update(&self, schedule: &Schedule) -> ConveyorResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE schedules
            SET name = ?, cron_expr = ?, timezone = ?, enabled = ?, job_type = ?,
                job_payload = ?, job_priority = ?, next_run_at = ?, last_run_at = ?,
                run_count = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&schedule.name)
        .bind(&schedule.cron_expr)
        .bind(&schedule.timezone)
        .bind(schedule.enabled)
        .bind(&schedule.job_type)
        .bind(schedule.job_payload.to_string())
        .bind(schedule.job_priority.as_str())
        .bind(schedule.next_run_at)
        .bind(schedule.last_run_at)
        .bind(schedule.run_count)
        .bind(Utc::now())
        .bind(&schedule.id)
        .execute(self.pool.inner())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, id: &str) -> ConveyorResult<bool> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = ?")
            .bind(id)
            .execute(self.pool.inner())
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_due(&self, now: DateTime<Utc>, limit: u32) -> ConveyorResult<Vec<Schedule>> {
        let rows = sqlx::query_as::<_, ScheduleRow>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules \
             WHERE enabled = TRUE AND next_run_at IS NOT NULL AND next_run_at <= ? \
             ORDER BY next_run_at ASC LIMIT ?"
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool.inner())
        .await?;

        rows.into_iter().map(Schedule::try_from).collect()
    }

    async fn record_firing(
        &self,
        id: &str,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> ConveyorResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE schedules
            SET last_run_at = ?, next_run_at = ?, run_count = run_count + 1, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(last_run_at)
        .bind(next_run_at)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool.inner())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn advance_next_run(
        &self,
        id: &str,
        next_run_at: Option<DateTime<Utc>>,
    ) -> ConveyorResult<bool> {
        let result = sqlx::query("UPDATE schedules SET next_run_at = ?, updated_at = ? WHERE id = ?")
            .bind(next_run_at)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool.inner())
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
