//! Dead-letter entity.

use crate::domain::entities::Job;
use crate::domain::value_objects::JobPriority;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Post-mortem copy of a job whose retries were exhausted.
///
/// Descriptor fields are frozen at failure time so the archive survives
/// deletion of the original row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterJob {
    pub id: String,
    pub original_job_id: String,
    pub job_name: String,
    pub job_type: String,
    pub job_payload: Value,
    pub job_priority: JobPriority,
    pub failure_reason: String,

    /// Total attempts including the final one.
    pub failure_count: u32,
    pub last_error: Option<String>,
    pub error_stack: Option<String>,
    pub worker_id: Option<String>,
    pub original_created_at: DateTime<Utc>,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetterJob {
    /// Archives a permanently failed job.
    #[must_use]
    pub fn from_failed_job(job: &Job, reason: impl Into<String>, stack: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            original_job_id: job.id.clone(),
            job_name: job.name.clone(),
            job_type: job.job_type.clone(),
            job_payload: job.payload.clone(),
            job_priority: job.priority,
            failure_reason: reason.into(),
            failure_count: job.retry_count + 1,
            last_error: job.error.clone(),
            error_stack: stack,
            worker_id: job.worker_id.clone(),
            original_created_at: job.created_at,
            failed_at: Utc::now(),
        }
    }
}
