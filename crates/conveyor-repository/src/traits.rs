//! Repository trait definitions.
//!
//! Every runtime component depends on these object-safe traits rather than
//! the concrete MySQL implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conveyor_core::{
    ConveyorResult, DeadLetterJob, Job, JobStatus, Schedule, WebhookEvent, WorkerRecord,
};
use serde_json::Value;
use std::collections::HashMap;

/// Job repository.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Inserts a new job row.
    async fn insert(&self, job: &Job) -> ConveyorResult<()>;

    /// Finds a job by id.
    async fn find_by_id(&self, id: &str) -> ConveyorResult<Option<Job>>;

    /// Lists jobs, optionally filtered by status, newest first.
    async fn list(
        &self,
        status: Option<JobStatus>,
        limit: u32,
        offset: u32,
    ) -> ConveyorResult<Vec<Job>>;

    /// PENDING -> QUEUED once the job has been placed in the ready index.
    ///
    /// Returns false if the job was not PENDING.
    async fn mark_queued(&self, id: &str) -> ConveyorResult<bool>;

    /// QUEUED/RETRYING -> PROCESSING under the given worker.
    ///
    /// Returns false if the job was not in a dequeueable state.
    async fn mark_processing(&self, id: &str, worker_id: &str) -> ConveyorResult<bool>;

    /// PROCESSING -> COMPLETED, guarded by ownership.
    ///
    /// The update applies only while `status = PROCESSING AND worker_id`
    /// still matches; a false return means the job was reclaimed and the
    /// caller must discard its result.
    async fn complete_if_processing(
        &self,
        id: &str,
        worker_id: &str,
        result: &Value,
    ) -> ConveyorResult<bool>;

    /// PROCESSING -> RETRYING: bumps `retry_count`, records the error, and
    /// clears the owning worker.
    async fn mark_retrying(&self, id: &str, error: &str) -> ConveyorResult<bool>;

    /// PROCESSING -> FAILED terminal write.
    async fn mark_failed(&self, id: &str, error: &str) -> ConveyorResult<bool>;

    /// PENDING/QUEUED/RETRYING -> CANCELLED.
    ///
    /// Returns false when the current state does not allow cancellation.
    async fn cancel(&self, id: &str) -> ConveyorResult<bool>;

    /// In-flight jobs owned by a worker, paged. The predicate runs in the
    /// store, not client-side.
    async fn find_processing_by_worker(
        &self,
        worker_id: &str,
        limit: u32,
    ) -> ConveyorResult<Vec<Job>>;

    /// Job counts grouped by status.
    async fn count_by_status(&self) -> ConveyorResult<HashMap<JobStatus, u64>>;

    /// Deletes terminal jobs older than the cutoff; returns rows removed.
    async fn purge_terminal_older_than(&self, cutoff: DateTime<Utc>) -> ConveyorResult<u64>;
}

/// Schedule repository.
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn insert(&self, schedule: &Schedule) -> ConveyorResult<()>;

    async fn find_by_id(&self, id: &str) -> ConveyorResult<Option<Schedule>>;

    async fn list(&self, limit: u32, offset: u32) -> ConveyorResult<Vec<Schedule>>;

    /// Full-row update (template, rule, enabled flag, firing state).
    async fn update(&self, schedule: &Schedule) -> ConveyorResult<bool>;

    async fn delete(&self, id: &str) -> ConveyorResult<bool>;

    /// Enabled schedules due at `now`, soonest first.
    async fn find_due(&self, now: DateTime<Utc>, limit: u32) -> ConveyorResult<Vec<Schedule>>;

    /// Records a successful firing: sets `last_run_at`, advances
    /// `next_run_at`, and increments `run_count`.
    async fn record_firing(
        &self,
        id: &str,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> ConveyorResult<bool>;

    /// Advances `next_run_at` without counting a firing. Used when job
    /// creation failed so the schedule does not stick on one instant.
    async fn advance_next_run(
        &self,
        id: &str,
        next_run_at: Option<DateTime<Utc>>,
    ) -> ConveyorResult<bool>;
}

/// Worker repository.
#[async_trait]
pub trait WorkerRepository: Send + Sync {
    async fn insert(&self, worker: &WorkerRecord) -> ConveyorResult<()>;

    async fn find_by_id(&self, id: &str) -> ConveyorResult<Option<WorkerRecord>>;

    async fn list(&self) -> ConveyorResult<Vec<WorkerRecord>>;

    /// Writes `last_heartbeat = now` on the worker row.
    async fn heartbeat(&self, id: &str, now: DateTime<Utc>) -> ConveyorResult<bool>;

    /// Updates the in-flight slot count.
    async fn set_active_jobs(&self, id: &str, active_jobs: u32) -> ConveyorResult<bool>;

    /// Increments the processed or failed counter.
    async fn record_outcome(&self, id: &str, success: bool) -> ConveyorResult<bool>;

    /// active -> stopped with `stopped_at` set and the slot cleared.
    async fn mark_stopped(&self, id: &str, now: DateTime<Utc>) -> ConveyorResult<bool>;

    /// Active workers whose heartbeat is older than the cutoff.
    async fn find_stale(&self, cutoff: DateTime<Utc>) -> ConveyorResult<Vec<WorkerRecord>>;

    /// Number of workers currently registered as active.
    async fn count_active(&self) -> ConveyorResult<u64>;
}

/// Dead-letter repository.
#[async_trait]
pub trait DeadLetterRepository: Send + Sync {
    async fn insert(&self, entry: &DeadLetterJob) -> ConveyorResult<()>;

    async fn find_by_id(&self, id: &str) -> ConveyorResult<Option<DeadLetterJob>>;

    async fn list(&self, limit: u32, offset: u32) -> ConveyorResult<Vec<DeadLetterJob>>;

    async fn delete(&self, id: &str) -> ConveyorResult<bool>;

    async fn stats(&self) -> ConveyorResult<DeadLetterStats>;
}

/// Aggregate dead-letter statistics.
#[derive(Debug, Clone, Default)]
pub struct DeadLetterStats {
    pub total: u64,
    pub oldest_failed_at: Option<DateTime<Utc>>,
    pub newest_failed_at: Option<DateTime<Utc>>,
}

/// Webhook event repository.
#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    async fn insert(&self, event: &WebhookEvent) -> ConveyorResult<()>;

    async fn find_by_id(&self, id: &str) -> ConveyorResult<Option<WebhookEvent>>;

    async fn find_by_job(&self, job_id: &str) -> ConveyorResult<Vec<WebhookEvent>>;

    /// Writes back delivery state (status, attempts, codes, timestamps).
    async fn update(&self, event: &WebhookEvent) -> ConveyorResult<bool>;

    /// Events still owed an attempt: `status IN (pending, retrying) AND
    /// attempts < max_attempts`, oldest attempt first.
    async fn find_retryable(&self, limit: u32) -> ConveyorResult<Vec<WebhookEvent>>;
}
