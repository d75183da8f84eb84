//! MySQL webhook event repository implementation.

use crate::mysql::invalid_column;
use crate::pool::DatabasePool;
use crate::traits::WebhookEventRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conveyor_core::{ConveyorError, ConveyorResult, WebhookEvent, WebhookStatus};
use serde_json::Value;
use sqlx::FromRow;

/// MySQL webhook event repository.
#[derive(Clone)]
pub struct MySqlWebhookEventRepository {
    pool: DatabasePool,
}

impl MySqlWebhookEventRepository {
    #[must_use]
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct WebhookEventRow {
    id: String,
    job_id: String,
    job_type: String,
    url: String,
    payload: String,
    status: String,
    attempts: u32,
    max_attempts: u32,
    last_status_code: Option<u16>,
    last_error: Option<String>,
    last_attempt_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<WebhookEventRow> for WebhookEvent {
    type Error = ConveyorError;

    fn try_from(row: WebhookEventRow) -> Result<Self, Self::Error> {
        let status = WebhookStatus::parse(&row.status)
            .ok_or_else(|| invalid_column("status", &row.status))?;
        let payload: Value = serde_json::from_str(&row.payload)?;

        Ok(WebhookEvent {
            id: row.id,
            job_id: row.job_id,
            job_type: row.job_type,
            url: row.url,
            payload,
            status,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            last_status_code: row.last_status_code,
            last_error: row.last_error,
            last_attempt_at: row.last_attempt_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const EVENT_COLUMNS: &str = "id, job_id, job_type, url, payload, status, attempts, max_attempts, \
     last_status_code, last_error, last_attempt_at, completed_at, created_at, updated_at";

#[async_trait]
impl WebhookEventRepository for MySqlWebhookEventRepository {
    async fn insert(&self, event: &WebhookEvent) -> ConveyorResult<()> {
        sqlx::query(
            r#"
            INSERT INTO webhook_events (id, job_id, job_type, url, payload, status, attempts,
                                        max_attempts, last_status_code, last_error,
                                        last_attempt_at, completed_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.job_id)
        .bind(&event.job_type)
        .bind(&event.url)
        .bind(event.payload.to_string())
        .bind(event.status.as_str())
        .bind(event.attempts)
        .bind(event.max_attempts)
        .bind(event.last_status_code)
        .bind(&event.last_error)
        .bind(event.last_attempt_at)
        .bind(event.completed_at)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(self.pool.inner())
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> ConveyorResult<Option<WebhookEvent>> {
        let row = sqlx::query_as::<_, WebhookEventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM webhook_events WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool.inner())
        .await?;

        row.map(WebhookEvent::try_from).transpose()
    }

    async fn find_by_job(&self, job_id: &str) -> ConveyorResult<Vec<WebhookEvent>> {
        let rows = sqlx::query_as::<_, WebhookEventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM webhook_events \
             WHERE job_id = ? ORDER BY created_at"
        ))
        .bind(job_id)
        .fetch_all(self.pool.inner())
        .await?;

        rows.into_iter().map(WebhookEvent::try_from).collect()
    }

    async fn update(&self, event: &WebhookEvent) -> ConveyorResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = ?, attempts = ?, last_status_code = ?, last_error = ?,
                last_attempt_at = ?, completed_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(event.status.as_str())
        .bind(event.attempts)
        .bind(event.last_status_code)
        .bind(&event.last_error)
        .bind(event.last_attempt_at)
        .bind(event.completed_at)
        .bind(Utc::now())
        .bind(&event.id)
        .execute(self.pool.inner())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_retryable(&self, limit: u32) -> ConveyorResult<Vec<WebhookEvent>> {
        let rows = sqlx::query_as::<_, WebhookEventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM webhook_events \
             WHERE status IN ('pending', 'retrying') AND attempts < max_attempts \
             ORDER BY COALESCE(last_attempt_at, created_at) ASC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(self.pool.inner())
        .await?;

        rows.into_iter().map(WebhookEvent::try_from).collect()
    }
}
