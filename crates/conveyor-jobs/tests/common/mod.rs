//! In-memory store fakes for exercising the runtime components without
//! MySQL or Redis. The fakes keep the same contracts as the real
//! implementations: conditional updates, compare-and-set completion, and
//! sorted-set ordering.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conveyor_core::{
    ConveyorResult, DeadLetterJob, Job, JobPriority, JobStatus, Schedule, WebhookEvent,
    WebhookStatus, WorkerRecord, WorkerStatus,
};
use conveyor_jobs::error::JobResult;
use conveyor_jobs::queue::{QueueDepths, QueueIndex};
use conveyor_repository::{
    DeadLetterRepository, DeadLetterStats, JobRepository, ScheduleRepository,
    WebhookEventRepository, WorkerRepository,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

// ---------------------------------------------------------------------------
// Queue index
// ---------------------------------------------------------------------------

#[derive(Default)]
struct QueueState {
    seq: u64,
    ready: BTreeSet<(u64, u64, String)>,
    delayed: HashMap<String, i64>,
    processing: HashMap<String, String>,
    deadletter: Vec<(String, String)>,
}

/// Sorted-set queue index backed by plain collections.
#[derive(Default)]
pub struct InMemoryQueue {
    state: Mutex<QueueState>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Members of the delayed index (for assertions).
    pub fn delayed_members(&self) -> Vec<String> {
        self.state.lock().delayed.keys().cloned().collect()
    }

    /// Job ids currently in the processing set.
    pub fn processing_ids(&self) -> Vec<String> {
        self.state.lock().processing.keys().cloned().collect()
    }

    /// Dead-letter entries as (job_id, reason) pairs.
    pub fn dead_letters(&self) -> Vec<(String, String)> {
        self.state.lock().deadletter.clone()
    }

    /// Forces every delayed member to be due immediately.
    pub fn make_delayed_due(&self) {
        let mut state = self.state.lock();
        for fire_at in state.delayed.values_mut() {
            *fire_at = 0;
        }
    }
}

fn member(job_id: &str, priority: JobPriority) -> String {
    format!("{}:{}", job_id, priority.as_str())
}

fn parse_member(member: &str) -> Option<(String, JobPriority)> {
    let (id, priority) = member.rsplit_once(':')?;
    Some((id.to_string(), JobPriority::parse(priority)?))
}

#[async_trait]
impl QueueIndex for InMemoryQueue {
    async fn enqueue(&self, job_id: &str, priority: JobPriority) -> JobResult<()> {
        let mut state = self.state.lock();
        let score = Utc::now().timestamp_millis() as u64 + priority.offset_ms();
        let seq = state.seq;
        state.seq += 1;
        state.ready.insert((score, seq, job_id.to_string()));
        Ok(())
    }

    async fn enqueue_delayed(
        &self,
        job_id: &str,
        fire_at: DateTime<Utc>,
        priority: JobPriority,
    ) -> JobResult<()> {
        let mut state = self.state.lock();
        state
            .delayed
            .insert(member(job_id, priority), fire_at.timestamp_millis());
        Ok(())
    }

    async fn dequeue(&self) -> JobResult<Option<String>> {
        let mut state = self.state.lock();
        let Some(first) = state.ready.iter().next().cloned() else {
            return Ok(None);
        };
        state.ready.remove(&first);
        Ok(Some(first.2))
    }

    async fn promote_delayed(&self) -> JobResult<u64> {
        let mut state = self.state.lock();
        let now_ms = Utc::now().timestamp_millis();

        let due: Vec<String> = state
            .delayed
            .iter()
            .filter(|(_, fire)| **fire <= now_ms)
            .map(|(m, _)| m.clone())
            .collect();

        let mut promoted = 0u64;
        for m in due {
            if state.delayed.remove(&m).is_none() {
                continue;
            }
            let Some((job_id, priority)) = parse_member(&m) else {
                continue;
            };
            let score = now_ms as u64 + priority.offset_ms();
            let seq = state.seq;
            state.seq += 1;
            state.ready.insert((score, seq, job_id));
            promoted += 1;
        }

        Ok(promoted)
    }

    async fn mark_processing(&self, job_id: &str, worker_id: &str) -> JobResult<()> {
        self.state
            .lock()
            .processing
            .insert(job_id.to_string(), worker_id.to_string());
        Ok(())
    }

    async fn mark_completed(&self, job_id: &str) -> JobResult<()> {
        self.state.lock().processing.remove(job_id);
        Ok(())
    }

    async fn requeue(&self, job_id: &str, priority: JobPriority, delay_ms: u64) -> JobResult<()> {
        let mut state = self.state.lock();
        state.processing.remove(job_id);
        let fire_at = Utc::now().timestamp_millis() + delay_ms as i64;
        state.delayed.insert(member(job_id, priority), fire_at);
        Ok(())
    }

    async fn move_to_dlq(&self, job_id: &str, reason: &str) -> JobResult<()> {
        let mut state = self.state.lock();
        state.processing.remove(job_id);
        state
            .deadletter
            .push((job_id.to_string(), reason.to_string()));
        Ok(())
    }

    async fn remove_from_dlq(&self, job_id: &str) -> JobResult<u64> {
        let mut state = self.state.lock();
        let before = state.deadletter.len();
        state.deadletter.retain(|(id, _)| id != job_id);
        Ok((before - state.deadletter.len()) as u64)
    }

    async fn stats(&self) -> JobResult<QueueDepths> {
        let state = self.state.lock();
        Ok(QueueDepths {
            ready: state.ready.len() as u64,
            delayed: state.delayed.len() as u64,
            processing: state.processing.len() as u64,
            deadletter: state.deadletter.len() as u64,
        })
    }

    async fn health_check(&self) -> JobResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Job repository
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryJobs {
    jobs: Mutex<HashMap<String, Job>>,
}

impl InMemoryJobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Job {
        self.jobs.lock().get(id).cloned().expect("job exists")
    }
}

#[async_trait]
impl JobRepository for InMemoryJobs {
    async fn insert(&self, job: &Job) -> ConveyorResult<()> {
        self.jobs.lock().insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> ConveyorResult<Option<Job>> {
        Ok(self.jobs.lock().get(id).cloned())
    }

    async fn list(
        &self,
        status: Option<JobStatus>,
        limit: u32,
        offset: u32,
    ) -> ConveyorResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .lock()
            .values()
            .filter(|j| status.is_none_or(|s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn mark_queued(&self, id: &str) -> ConveyorResult<bool> {
        let mut jobs = self.jobs.lock();
        match jobs.get_mut(id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Queued;
                job.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_processing(&self, id: &str, worker_id: &str) -> ConveyorResult<bool> {
        let mut jobs = self.jobs.lock();
        match jobs.get_mut(id) {
            Some(job) if job.status.is_dequeueable() => {
                job.status = JobStatus::Processing;
                job.worker_id = Some(worker_id.to_string());
                job.started_at = Some(Utc::now());
                job.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_if_processing(
        &self,
        id: &str,
        worker_id: &str,
        result: &Value,
    ) -> ConveyorResult<bool> {
        let mut jobs = self.jobs.lock();
        match jobs.get_mut(id) {
            Some(job)
                if job.status == JobStatus::Processing
                    && job.worker_id.as_deref() == Some(worker_id) =>
            {
                job.status = JobStatus::Completed;
                job.result = Some(result.clone());
                job.error = None;
                job.worker_id = None;
                job.completed_at = Some(Utc::now());
                job.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_retrying(&self, id: &str, error: &str) -> ConveyorResult<bool> {
        let mut jobs = self.jobs.lock();
        match jobs.get_mut(id) {
            Some(job) if job.status == JobStatus::Processing => {
                job.status = JobStatus::Retrying;
                job.retry_count += 1;
                job.error = Some(error.to_string());
                job.worker_id = None;
                job.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_failed(&self, id: &str, error: &str) -> ConveyorResult<bool> {
        let mut jobs = self.jobs.lock();
        match jobs.get_mut(id) {
            Some(job)
                if matches!(
                    job.status,
                    JobStatus::Processing | JobStatus::Queued | JobStatus::Retrying
                ) =>
            {
                job.status = JobStatus::Failed;
                job.error = Some(error.to_string());
                job.result = None;
                job.worker_id = None;
                job.completed_at = Some(Utc::now());
                job.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cancel(&self, id: &str) -> ConveyorResult<bool> {
        let mut jobs = self.jobs.lock();
        match jobs.get_mut(id) {
            Some(job) if job.status.is_cancellable() => {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(Utc::now());
                job.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_processing_by_worker(
        &self,
        worker_id: &str,
        limit: u32,
    ) -> ConveyorResult<Vec<Job>> {
        Ok(self
            .jobs
            .lock()
            .values()
            .filter(|j| {
                j.status == JobStatus::Processing && j.worker_id.as_deref() == Some(worker_id)
            })
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count_by_status(&self) -> ConveyorResult<HashMap<JobStatus, u64>> {
        let mut counts = HashMap::new();
        for job in self.jobs.lock().values() {
            *counts.entry(job.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn purge_terminal_older_than(&self, cutoff: DateTime<Utc>) -> ConveyorResult<u64> {
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|_, j| {
            !(j.status.is_terminal() && j.completed_at.is_some_and(|at| at < cutoff))
        });
        Ok((before - jobs.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// Schedule repository
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemorySchedules {
    schedules: Mutex<HashMap<String, Schedule>>,
}

impl InMemorySchedules {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Schedule {
        self.schedules
            .lock()
            .get(id)
            .cloned()
            .expect("schedule exists")
    }
}

#[async_trait]
impl ScheduleRepository for InMemorySchedules {
    async fn insert(&self, schedule: &Schedule) -> ConveyorResult<()> {
        self.schedules
            .lock()
            .insert(schedule.id.clone(), schedule.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> ConveyorResult<Option<Schedule>> {
        Ok(self.schedules.lock().get(id).cloned())
    }

    async fn list(&self, limit: u32, offset: u32) -> ConveyorResult<Vec<Schedule>> {
        let mut all: Vec<Schedule> = self.schedules.lock().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn update(&self, schedule: &Schedule) -> ConveyorResult<bool> {
        let mut schedules = self.schedules.lock();
        if schedules.contains_key(&schedule.id) {
            schedules.insert(schedule.id.clone(), schedule.clone());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn delete(&self, id: &str) -> ConveyorResult<bool> {
        Ok(self.schedules.lock().remove(id).is_some())
    }

    async fn find_due(&self, now: DateTime<Utc>, limit: u32) -> ConveyorResult<Vec<Schedule>> {
        let mut due: Vec<Schedule> = self
            .schedules
            .lock()
            .values()
            .filter(|s| s.enabled && s.next_run_at.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        due.sort_by_key(|s| s.next_run_at);
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn record_firing(
        &self,
        id: &str,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> ConveyorResult<bool> {
        let mut schedules = self.schedules.lock();
        match schedules.get_mut(id) {
            Some(s) => {
                s.last_run_at = Some(last_run_at);
                s.next_run_at = next_run_at;
                s.run_count += 1;
                s.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn advance_next_run(
        &self,
        id: &str,
        next_run_at: Option<DateTime<Utc>>,
    ) -> ConveyorResult<bool> {
        let mut schedules = self.schedules.lock();
        match schedules.get_mut(id) {
            Some(s) => {
                s.next_run_at = next_run_at;
                s.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Worker repository
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryWorkers {
    workers: Mutex<HashMap<String, WorkerRecord>>,
}

impl InMemoryWorkers {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> WorkerRecord {
        self.workers.lock().get(id).cloned().expect("worker exists")
    }
}

#[async_trait]
impl WorkerRepository for InMemoryWorkers {
    async fn insert(&self, worker: &WorkerRecord) -> ConveyorResult<()> {
        self.workers.lock().insert(worker.id.clone(), worker.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> ConveyorResult<Option<WorkerRecord>> {
        Ok(self.workers.lock().get(id).cloned())
    }

    async fn list(&self) -> ConveyorResult<Vec<WorkerRecord>> {
        Ok(self.workers.lock().values().cloned().collect())
    }

    async fn heartbeat(&self, id: &str, now: DateTime<Utc>) -> ConveyorResult<bool> {
        let mut workers = self.workers.lock();
        match workers.get_mut(id) {
            Some(w) if w.last_heartbeat <= now => {
                w.last_heartbeat = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_active_jobs(&self, id: &str, active_jobs: u32) -> ConveyorResult<bool> {
        let mut workers = self.workers.lock();
        match workers.get_mut(id) {
            Some(w) => {
                w.active_jobs = active_jobs;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_outcome(&self, id: &str, success: bool) -> ConveyorResult<bool> {
        let mut workers = self.workers.lock();
        match workers.get_mut(id) {
            Some(w) => {
                if success {
                    w.processed_count += 1;
                } else {
                    w.failed_count += 1;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_stopped(&self, id: &str, now: DateTime<Utc>) -> ConveyorResult<bool> {
        let mut workers = self.workers.lock();
        match workers.get_mut(id) {
            Some(w) if w.status != WorkerStatus::Stopped => {
                w.status = WorkerStatus::Stopped;
                w.stopped_at = Some(now);
                w.active_jobs = 0;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_stale(&self, cutoff: DateTime<Utc>) -> ConveyorResult<Vec<WorkerRecord>> {
        Ok(self
            .workers
            .lock()
            .values()
            .filter(|w| w.status == WorkerStatus::Active && w.last_heartbeat < cutoff)
            .cloned()
            .collect())
    }

    async fn count_active(&self) -> ConveyorResult<u64> {
        Ok(self
            .workers
            .lock()
            .values()
            .filter(|w| w.status == WorkerStatus::Active)
            .count() as u64)
    }
}

// ---------------------------------------------------------------------------
// Dead-letter repository
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryDeadLetters {
    entries: Mutex<HashMap<String, DeadLetterJob>>,
}

impl InMemoryDeadLetters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<DeadLetterJob> {
        self.entries.lock().values().cloned().collect()
    }
}

#[async_trait]
impl DeadLetterRepository for InMemoryDeadLetters {
    async fn insert(&self, entry: &DeadLetterJob) -> ConveyorResult<()> {
        self.entries.lock().insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> ConveyorResult<Option<DeadLetterJob>> {
        Ok(self.entries.lock().get(id).cloned())
    }

    async fn list(&self, limit: u32, offset: u32) -> ConveyorResult<Vec<DeadLetterJob>> {
        let mut all: Vec<DeadLetterJob> = self.entries.lock().values().cloned().collect();
        all.sort_by(|a, b| b.failed_at.cmp(&a.failed_at));
        Ok(all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn delete(&self, id: &str) -> ConveyorResult<bool> {
        Ok(self.entries.lock().remove(id).is_some())
    }

    async fn stats(&self) -> ConveyorResult<DeadLetterStats> {
        let entries = self.entries.lock();
        Ok(DeadLetterStats {
            total: entries.len() as u64,
            oldest_failed_at: entries.values().map(|e| e.failed_at).min(),
            newest_failed_at: entries.values().map(|e| e.failed_at).max(),
        })
    }
}

// ---------------------------------------------------------------------------
// Webhook event repository
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryWebhookEvents {
    events: Mutex<HashMap<String, WebhookEvent>>,
}

impl InMemoryWebhookEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<WebhookEvent> {
        self.events.lock().values().cloned().collect()
    }
}

#[async_trait]
impl WebhookEventRepository for InMemoryWebhookEvents {
    async fn insert(&self, event: &WebhookEvent) -> ConveyorResult<()> {
        self.events.lock().insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> ConveyorResult<Option<WebhookEvent>> {
        Ok(self.events.lock().get(id).cloned())
    }

    async fn find_by_job(&self, job_id: &str) -> ConveyorResult<Vec<WebhookEvent>> {
        let mut events: Vec<WebhookEvent> = self
            .events
            .lock()
            .values()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(events)
    }

    async fn update(&self, event: &WebhookEvent) -> ConveyorResult<bool> {
        let mut events = self.events.lock();
        if events.contains_key(&event.id) {
            events.insert(event.id.clone(), event.clone());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn find_retryable(&self, limit: u32) -> ConveyorResult<Vec<WebhookEvent>> {
        let mut events: Vec<WebhookEvent> = self
            .events
            .lock()
            .values()
            .filter(|e| {
                matches!(e.status, WebhookStatus::Pending | WebhookStatus::Retrying)
                    && e.attempts < e.max_attempts
            })
            .cloned()
            .collect();
        events.sort_by_key(|e| e.last_attempt_at.unwrap_or(e.created_at));
        events.truncate(limit as usize);
        Ok(events)
    }
}
