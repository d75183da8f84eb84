//! Job entity.

use crate::domain::value_objects::{JobPriority, JobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A single unit of work.
///
/// The durable store owns every field here; the queue index only ever holds
/// derived references (id plus routing metadata).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Free-text display name.
    pub name: String,

    /// Handler key; workers look up the registered handler by this string.
    pub job_type: String,

    /// Opaque structured payload handed to the handler.
    pub payload: Value,

    /// Scheduling band.
    pub priority: JobPriority,

    /// Lifecycle state.
    pub status: JobStatus,

    /// Retry budget.
    pub max_retries: u32,

    /// Base backoff delay in milliseconds; doubled per attempt.
    pub retry_delay_ms: u64,

    /// Attempts consumed so far.
    pub retry_count: u32,

    /// Earliest fire time; a future value routes the job to the delayed
    /// index instead of the ready index.
    pub scheduled_at: Option<DateTime<Utc>>,

    /// Back-reference to the schedule that produced this job, if any.
    pub schedule_id: Option<String>,

    /// Owning worker while PROCESSING; cleared by orphan recovery.
    pub worker_id: Option<String>,

    /// When the current (or last) execution started.
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,

    /// Handler result on success.
    pub result: Option<Value>,

    /// Last error message on failure.
    pub error: Option<String>,

    /// Optional notification URL for terminal outcomes.
    pub webhook_url: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Creates a new pending job with default retry policy.
    #[must_use]
    pub fn new(name: impl Into<String>, job_type: impl Into<String>, payload: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            job_type: job_type.into(),
            payload,
            priority: JobPriority::Normal,
            status: JobStatus::Pending,
            max_retries: 3,
            retry_delay_ms: 1000,
            retry_count: 0,
            scheduled_at: None,
            schedule_id: None,
            worker_id: None,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            webhook_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true when the retry budget is spent.
    #[must_use]
    pub const fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// Returns true when `scheduled_at` is in the future relative to `now`.
    #[must_use]
    pub fn is_delayed(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at.is_some_and(|at| at > now)
    }

    /// Exponential backoff for the next retry, in milliseconds.
    ///
    /// `retry_delay_ms * 2^retry_count`, capped at one minute.
    #[must_use]
    pub fn next_backoff_ms(&self) -> u64 {
        const MAX_DELAY_MS: u64 = 60_000;
        let factor = 2u64.checked_pow(self.retry_count).unwrap_or(u64::MAX);
        self.retry_delay_ms.saturating_mul(factor).min(MAX_DELAY_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_job_defaults() {
        let job = Job::new("send welcome email", "email.send", json!({"to": "a@b.c"}));
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.priority, JobPriority::Normal);
        assert_eq!(job.max_retries, 3);
        assert_eq!(job.retry_count, 0);
        assert!(job.worker_id.is_none());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut job = Job::new("j", "t", json!({}));
        job.retry_delay_ms = 100;

        job.retry_count = 0;
        assert_eq!(job.next_backoff_ms(), 100);
        job.retry_count = 1;
        assert_eq!(job.next_backoff_ms(), 200);
        job.retry_count = 2;
        assert_eq!(job.next_backoff_ms(), 400);

        job.retry_count = 30;
        assert_eq!(job.next_backoff_ms(), 60_000);
    }

    #[test]
    fn test_retries_exhausted() {
        let mut job = Job::new("j", "t", json!({}));
        job.max_retries = 2;
        assert!(!job.retries_exhausted());
        job.retry_count = 2;
        assert!(job.retries_exhausted());
    }

    #[test]
    fn test_is_delayed() {
        let now = Utc::now();
        let mut job = Job::new("j", "t", json!({}));
        assert!(!job.is_delayed(now));

        job.scheduled_at = Some(now + chrono::Duration::seconds(5));
        assert!(job.is_delayed(now));

        job.scheduled_at = Some(now - chrono::Duration::seconds(5));
        assert!(!job.is_delayed(now));
    }
}
