//! Webhook outbox entity.

use crate::domain::value_objects::WebhookStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One outbound notification, persisted before the first send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    pub job_id: String,
    pub job_type: String,
    pub url: String,

    /// Request body, frozen at creation.
    pub payload: Value,

    pub status: WebhookStatus,
    pub attempts: u32,
    pub max_attempts: u32,

    pub last_status_code: Option<u16>,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookEvent {
    /// Creates a pending outbox entry.
    #[must_use]
    pub fn new(
        job_id: impl Into<String>,
        job_type: impl Into<String>,
        url: impl Into<String>,
        payload: Value,
        max_attempts: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            job_id: job_id.into(),
            job_type: job_type.into(),
            url: url.into(),
            payload,
            status: WebhookStatus::Pending,
            attempts: 0,
            max_attempts,
            last_status_code: None,
            last_error: None,
            last_attempt_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true while the retry budget is open.
    #[must_use]
    pub const fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Counts an attempt as started. Written back before the send so a
    /// crash mid-request cannot lose the attempt.
    pub fn begin_attempt(&mut self) {
        let now = Utc::now();
        self.attempts += 1;
        self.status = WebhookStatus::Retrying;
        self.last_attempt_at = Some(now);
        self.updated_at = now;
    }

    /// Records a 2xx outcome.
    pub fn record_success(&mut self, status_code: u16) {
        let now = Utc::now();
        self.status = WebhookStatus::Success;
        self.last_status_code = Some(status_code);
        self.last_error = None;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Records a failed attempt: non-2xx response or transport error.
    ///
    /// The status code is absent for timeouts and transport failures.
    pub fn record_failure(&mut self, status_code: Option<u16>, error: impl Into<String>) {
        let now = Utc::now();
        self.last_status_code = status_code;
        self.last_error = Some(error.into());
        self.status = if self.attempts >= self.max_attempts {
            WebhookStatus::Failed
        } else {
            WebhookStatus::Retrying
        };
        self.updated_at = now;
    }

    /// Earliest instant at which the next attempt may run.
    ///
    /// `last_attempt_at + base * 2^attempts`, capped. Events that were never
    /// attempted are immediately eligible.
    #[must_use]
    pub fn next_attempt_at(&self, base_delay_ms: u64, max_delay_ms: u64) -> Option<DateTime<Utc>> {
        let last = self.last_attempt_at?;
        let factor = 2u64.checked_pow(self.attempts).unwrap_or(u64::MAX);
        let delay_ms = base_delay_ms.saturating_mul(factor).min(max_delay_ms);
        Some(last + chrono::Duration::milliseconds(delay_ms as i64))
    }
}
