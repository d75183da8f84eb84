//! Service layer consumed by the external request surface.
//!
//! Controllers validate transport-level input and call these operations;
//! everything here speaks the unified error vocabulary (Validation,
//! Conflict, NotFound) so the surface can map outcomes to status codes.

use crate::cron::CronRule;
use crate::metrics;
use crate::queue::{QueueDepths, QueueIndex};
use chrono::{DateTime, Utc};
use conveyor_config::QueueConfig;
use conveyor_core::{
    ConveyorError, ConveyorResult, DeadLetterJob, Job, JobPriority, JobStatus, Schedule,
    WorkerRecord,
};
use conveyor_repository::{
    DeadLetterRepository, DeadLetterStats, JobRepository, ScheduleRepository, WorkerRepository,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Request to create a job.
#[derive(Debug, Clone, Deserialize)]
pub struct NewJob {
    pub name: String,
    pub job_type: String,
    pub payload: Value,
    #[serde(default)]
    pub priority: JobPriority,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub webhook_url: Option<String>,
}

/// Aggregate view over the durable store and the queue index.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub jobs_by_status: HashMap<JobStatus, u64>,
    pub queue: QueueDepths,
    pub active_workers: u64,
}

/// Job-level operations.
pub struct JobService {
    jobs: Arc<dyn JobRepository>,
    workers: Arc<dyn WorkerRepository>,
    queue: Arc<dyn QueueIndex>,
    config: QueueConfig,
}

impl JobService {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        workers: Arc<dyn WorkerRepository>,
        queue: Arc<dyn QueueIndex>,
        config: QueueConfig,
    ) -> Self {
        Self {
            jobs,
            workers,
            queue,
            config,
        }
    }

    /// Creates a job and makes it visible to workers.
    ///
    /// The durable row is written first; only then is the id placed in the
    /// ready or delayed index and the status flipped to QUEUED.
    pub async fn create_job(&self, request: NewJob) -> ConveyorResult<Job> {
        if request.job_type.trim().is_empty() {
            return Err(ConveyorError::Validation(
                "job_type must not be empty".to_string(),
            ));
        }

        let retry_delay_ms = request
            .retry_delay_ms
            .unwrap_or(self.config.default_retry_delay_ms);
        if retry_delay_ms < self.config.min_retry_delay_ms {
            return Err(ConveyorError::Validation(format!(
                "retry_delay_ms must be at least {}",
                self.config.min_retry_delay_ms
            )));
        }

        let mut job = Job::new(request.name, request.job_type, request.payload);
        job.priority = request.priority;
        job.max_retries = request.max_retries.unwrap_or(self.config.default_max_retries);
        job.retry_delay_ms = retry_delay_ms;
        job.scheduled_at = request.scheduled_at;
        job.webhook_url = request.webhook_url;

        self.jobs.insert(&job).await?;

        let now = Utc::now();
        match job.scheduled_at {
            Some(fire_at) if fire_at > now => {
                self.queue
                    .enqueue_delayed(&job.id, fire_at, job.priority)
                    .await?;
            }
            _ => {
                self.queue.enqueue(&job.id, job.priority).await?;
            }
        }

        self.jobs.mark_queued(&job.id).await?;
        job.status = JobStatus::Queued;
        metrics::record_enqueued();

        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            priority = %job.priority,
            delayed = job.scheduled_at.is_some_and(|at| at > now),
            "Job created"
        );

        Ok(job)
    }

    /// Loads a job by id.
    pub async fn get_job(&self, id: &str) -> ConveyorResult<Job> {
        self.jobs
            .find_by_id(id)
            .await?
            .ok_or_else(|| ConveyorError::not_found("job", id))
    }

    /// Lists jobs, optionally filtered by status.
    pub async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: u32,
        offset: u32,
    ) -> ConveyorResult<Vec<Job>> {
        Ok(self.jobs.list(status, limit, offset).await?)
    }

    /// Cancels a job that has not started running.
    ///
    /// The id may still sit in an index; workers discard references whose
    /// row is no longer dequeueable.
    pub async fn cancel_job(&self, id: &str) -> ConveyorResult<Job> {
        let job = self.get_job(id).await?;

        if !job.status.is_cancellable() {
            return Err(ConveyorError::Conflict(format!(
                "cannot cancel job in state {}",
                job.status
            )));
        }

        if !self.jobs.cancel(id).await? {
            // Raced with a worker between the read and the write.
            return Err(ConveyorError::Conflict(
                "job state changed during cancellation".to_string(),
            ));
        }

        debug!(job_id = %id, "Job cancelled");
        self.get_job(id).await
    }

    /// Aggregate statistics for dashboards and the metrics surface.
    pub async fn stats(&self) -> ConveyorResult<DashboardStats> {
        let jobs_by_status = self.jobs.count_by_status().await?;
        let queue = self.queue.stats().await.map_err(ConveyorError::from)?;
        let active_workers = self.workers.count_active().await?;

        metrics::record_queue_depths(&queue);

        Ok(DashboardStats {
            jobs_by_status,
            queue,
            active_workers,
        })
    }

    /// Lists all worker registrations.
    pub async fn list_workers(&self) -> ConveyorResult<Vec<WorkerRecord>> {
        Ok(self.workers.list().await?)
    }

    /// Deletes terminal jobs older than the cutoff.
    pub async fn purge_completed(&self, cutoff: DateTime<Utc>) -> ConveyorResult<u64> {
        let purged = self.jobs.purge_terminal_older_than(cutoff).await?;
        if purged > 0 {
            info!(count = purged, "Purged terminal jobs");
        }
        Ok(purged)
    }
}

/// Request to create a schedule.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSchedule {
    pub name: String,
    pub cron_expr: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    pub job_type: String,
    pub job_payload: Value,
    #[serde(default)]
    pub job_priority: JobPriority,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_enabled() -> bool {
    true
}

/// Partial schedule update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleUpdate {
    pub name: Option<String>,
    pub cron_expr: Option<String>,
    pub timezone: Option<String>,
    pub job_type: Option<String>,
    pub job_payload: Option<Value>,
    pub job_priority: Option<JobPriority>,
}

/// Schedule template operations.
pub struct ScheduleService {
    schedules: Arc<dyn ScheduleRepository>,
    jobs: Arc<dyn JobRepository>,
    queue: Arc<dyn QueueIndex>,
    config: QueueConfig,
}

impl ScheduleService {
    pub fn new(
        schedules: Arc<dyn ScheduleRepository>,
        jobs: Arc<dyn JobRepository>,
        queue: Arc<dyn QueueIndex>,
        config: QueueConfig,
    ) -> Self {
        Self {
            schedules,
            jobs,
            queue,
            config,
        }
    }

    /// Creates a schedule. The cron rule is validated and the first firing
    /// computed before anything is stored.
    pub async fn create_schedule(&self, request: NewSchedule) -> ConveyorResult<Schedule> {
        let rule = CronRule::parse(&request.cron_expr, &request.timezone)
            .map_err(ConveyorError::from)?;

        let mut schedule = Schedule::new(
            request.name,
            request.cron_expr,
            request.timezone,
            request.job_type,
            request.job_payload,
            request.job_priority,
        );
        schedule.enabled = request.enabled;
        schedule.next_run_at = if request.enabled {
            rule.next_after(Utc::now())
        } else {
            None
        };

        self.schedules.insert(&schedule).await?;
        info!(
            schedule_id = %schedule.id,
            name = %schedule.name,
            cron_expr = %schedule.cron_expr,
            next_run_at = ?schedule.next_run_at,
            "Schedule created"
        );

        Ok(schedule)
    }

    pub async fn get_schedule(&self, id: &str) -> ConveyorResult<Schedule> {
        self.schedules
            .find_by_id(id)
            .await?
            .ok_or_else(|| ConveyorError::not_found("schedule", id))
    }

    pub async fn list_schedules(&self, limit: u32, offset: u32) -> ConveyorResult<Vec<Schedule>> {
        Ok(self.schedules.list(limit, offset).await?)
    }

    /// Applies a partial update. Any rule change re-validates the cron
    /// expression and recomputes the next firing.
    pub async fn update_schedule(
        &self,
        id: &str,
        update: ScheduleUpdate,
    ) -> ConveyorResult<Schedule> {
        let mut schedule = self.get_schedule(id).await?;

        if let Some(name) = update.name {
            schedule.name = name;
        }
        if let Some(cron_expr) = update.cron_expr {
            schedule.cron_expr = cron_expr;
        }
        if let Some(timezone) = update.timezone {
            schedule.timezone = timezone;
        }
        if let Some(job_type) = update.job_type {
            schedule.job_type = job_type;
        }
        if let Some(job_payload) = update.job_payload {
            schedule.job_payload = job_payload;
        }
        if let Some(job_priority) = update.job_priority {
            schedule.job_priority = job_priority;
        }

        let rule = CronRule::parse(&schedule.cron_expr, &schedule.timezone)
            .map_err(ConveyorError::from)?;
        if schedule.enabled {
            schedule.next_run_at = rule.next_after(Utc::now());
        }
        schedule.updated_at = Utc::now();

        self.schedules.update(&schedule).await?;
        Ok(schedule)
    }

    pub async fn delete_schedule(&self, id: &str) -> ConveyorResult<()> {
        if !self.schedules.delete(id).await? {
            return Err(ConveyorError::not_found("schedule", id));
        }
        info!(schedule_id = %id, "Schedule deleted");
        Ok(())
    }

    /// Enables the schedule and computes its next firing.
    pub async fn enable_schedule(&self, id: &str) -> ConveyorResult<Schedule> {
        let mut schedule = self.get_schedule(id).await?;
        let rule = CronRule::parse(&schedule.cron_expr, &schedule.timezone)
            .map_err(ConveyorError::from)?;

        schedule.enabled = true;
        schedule.next_run_at = rule.next_after(Utc::now());
        schedule.updated_at = Utc::now();

        self.schedules.update(&schedule).await?;
        Ok(schedule)
    }

    /// Disables the schedule; a disabled schedule has no next firing.
    pub async fn disable_schedule(&self, id: &str) -> ConveyorResult<Schedule> {
        let mut schedule = self.get_schedule(id).await?;
        schedule.disable();
        self.schedules.update(&schedule).await?;
        Ok(schedule)
    }

    /// Creates and enqueues one job from the template immediately, without
    /// touching the firing state.
    pub async fn trigger_now(&self, id: &str) -> ConveyorResult<Job> {
        let schedule = self.get_schedule(id).await?;

        let mut job = Job::new(
            format!("{} (scheduled)", schedule.name),
            schedule.job_type.clone(),
            schedule.job_payload.clone(),
        );
        job.priority = schedule.job_priority;
        job.max_retries = self.config.default_max_retries;
        job.retry_delay_ms = self.config.default_retry_delay_ms;
        job.schedule_id = Some(schedule.id.clone());

        self.jobs.insert(&job).await?;
        self.queue
            .enqueue(&job.id, job.priority)
            .await
            .map_err(ConveyorError::from)?;
        self.jobs.mark_queued(&job.id).await?;
        job.status = JobStatus::Queued;
        metrics::record_enqueued();

        info!(schedule_id = %id, job_id = %job.id, "Schedule triggered manually");
        Ok(job)
    }

    /// Previews the next firings without mutating anything.
    pub async fn preview_next_runs(
        &self,
        id: &str,
        count: usize,
    ) -> ConveyorResult<Vec<DateTime<Utc>>> {
        let schedule = self.get_schedule(id).await?;
        let rule = CronRule::parse(&schedule.cron_expr, &schedule.timezone)
            .map_err(ConveyorError::from)?;
        Ok(rule.upcoming(Utc::now(), count))
    }
}

/// Dead-letter archive operations.
pub struct DeadLetterService {
    dead_letters: Arc<dyn DeadLetterRepository>,
    jobs: Arc<dyn JobRepository>,
    queue: Arc<dyn QueueIndex>,
    config: QueueConfig,
}

impl DeadLetterService {
    pub fn new(
        dead_letters: Arc<dyn DeadLetterRepository>,
        jobs: Arc<dyn JobRepository>,
        queue: Arc<dyn QueueIndex>,
        config: QueueConfig,
    ) -> Self {
        Self {
            dead_letters,
            jobs,
            queue,
            config,
        }
    }

    pub async fn get(&self, id: &str) -> ConveyorResult<DeadLetterJob> {
        self.dead_letters
            .find_by_id(id)
            .await?
            .ok_or_else(|| ConveyorError::not_found("dead_letter_job", id))
    }

    pub async fn list(&self, limit: u32, offset: u32) -> ConveyorResult<Vec<DeadLetterJob>> {
        Ok(self.dead_letters.list(limit, offset).await?)
    }

    pub async fn stats(&self) -> ConveyorResult<DeadLetterStats> {
        Ok(self.dead_letters.stats().await?)
    }

    /// Retries an archived job: a fresh job is created from the frozen
    /// template and the archive entry is consumed.
    pub async fn retry(&self, id: &str) -> ConveyorResult<Job> {
        let entry = self.get(id).await?;

        let mut job = Job::new(
            entry.job_name.clone(),
            entry.job_type.clone(),
            entry.job_payload.clone(),
        );
        job.priority = entry.job_priority;
        job.max_retries = self.config.default_max_retries;
        job.retry_delay_ms = self.config.default_retry_delay_ms;

        self.jobs.insert(&job).await?;
        self.queue
            .enqueue(&job.id, job.priority)
            .await
            .map_err(ConveyorError::from)?;
        self.jobs.mark_queued(&job.id).await?;
        job.status = JobStatus::Queued;
        metrics::record_enqueued();

        // Consume the archive entry and its index mirror.
        self.queue
            .remove_from_dlq(&entry.original_job_id)
            .await
            .map_err(ConveyorError::from)?;
        self.dead_letters.delete(id).await?;

        info!(
            dlq_id = %id,
            original_job_id = %entry.original_job_id,
            new_job_id = %job.id,
            "Dead-letter job retried"
        );

        Ok(job)
    }

    /// Deletes an archive entry and its index mirror.
    pub async fn delete(&self, id: &str) -> ConveyorResult<()> {
        let entry = self.get(id).await?;

        self.queue
            .remove_from_dlq(&entry.original_job_id)
            .await
            .map_err(ConveyorError::from)?;

        if !self.dead_letters.delete(id).await? {
            return Err(ConveyorError::not_found("dead_letter_job", id));
        }
        info!(dlq_id = %id, "Dead-letter job deleted");
        Ok(())
    }
}
