//! Job processor: the state machine of a single job execution.

use crate::error::JobResult;
use crate::handler::{HandlerError, HandlerRegistry};
use crate::metrics;
use crate::queue::QueueIndex;
use crate::webhook::{JobOutcome, WebhookDispatcher};
use chrono::Utc;
use conveyor_core::{DeadLetterJob, Job, JobStatus};
use conveyor_repository::{DeadLetterRepository, JobRepository};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What happened to the job this invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Handler succeeded; the job is COMPLETED.
    Completed,
    /// Handler failed; the job waits in the delayed index for its backoff.
    Retrying,
    /// Retries exhausted or failure was permanent; the job is FAILED and
    /// archived.
    DeadLettered,
    /// The job was not ours to finish (cancelled in flight, or reclaimed by
    /// recovery); nothing was written.
    Discarded,
}

/// Drives one job through PROCESSING to a terminal or retrying state.
pub struct JobProcessor {
    jobs: Arc<dyn JobRepository>,
    dead_letters: Arc<dyn DeadLetterRepository>,
    queue: Arc<dyn QueueIndex>,
    registry: Arc<HandlerRegistry>,
    webhooks: Arc<WebhookDispatcher>,
}

impl JobProcessor {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        dead_letters: Arc<dyn DeadLetterRepository>,
        queue: Arc<dyn QueueIndex>,
        registry: Arc<HandlerRegistry>,
        webhooks: Arc<WebhookDispatcher>,
    ) -> Self {
        Self {
            jobs,
            dead_letters,
            queue,
            registry,
            webhooks,
        }
    }

    /// Processes one dequeued job on behalf of `worker_id`.
    ///
    /// Infrastructure errors after the PROCESSING transition are propagated;
    /// the job stays PROCESSING and orphan recovery will heal it.
    pub async fn process(&self, job: &Job, worker_id: &str) -> JobResult<ProcessOutcome> {
        let Some(handler) = self.registry.get(&job.job_type) else {
            // No handler can ever succeed, so this failure is permanent on
            // first sight.
            let reason = format!("no handler for type {}", job.job_type);
            warn!(job_id = %job.id, job_type = %job.job_type, "Missing handler");
            self.record_permanent_failure(job, worker_id, &reason).await?;
            return Ok(ProcessOutcome::DeadLettered);
        };

        if !job.status.can_transition_to(JobStatus::Processing) {
            debug!(job_id = %job.id, status = %job.status, "Job is not runnable, discarding");
            return Ok(ProcessOutcome::Discarded);
        }

        if !self.jobs.mark_processing(&job.id, worker_id).await? {
            // Lost the race against a cancellation; drop the reference.
            debug!(job_id = %job.id, "Job no longer dequeueable, discarding");
            return Ok(ProcessOutcome::Discarded);
        }
        self.queue.mark_processing(&job.id, worker_id).await?;

        debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            worker_id = %worker_id,
            attempt = job.retry_count + 1,
            "Processing job"
        );

        let started = Instant::now();
        let result = handler.run(job).await;
        let elapsed = started.elapsed();

        match result {
            Ok(value) => {
                let accepted = self
                    .jobs
                    .complete_if_processing(&job.id, worker_id, &value)
                    .await?;

                if !accepted {
                    // Recovery reclaimed the job while the handler ran; the
                    // late result is discarded.
                    warn!(job_id = %job.id, worker_id = %worker_id, "Job was reclaimed, discarding result");
                    return Ok(ProcessOutcome::Discarded);
                }

                self.queue.mark_completed(&job.id).await?;
                metrics::record_completed(elapsed);

                info!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    duration_ms = elapsed.as_millis() as u64,
                    "Job completed"
                );

                let mut finished = job.clone();
                finished.result = Some(value);
                finished.completed_at = Some(Utc::now());
                self.notify(&finished, JobOutcome::Completed).await;

                Ok(ProcessOutcome::Completed)
            }
            Err(HandlerError::Transient(msg)) if !job.retries_exhausted() => {
                let backoff_ms = job.next_backoff_ms();

                self.jobs.mark_retrying(&job.id, &msg).await?;
                self.queue.requeue(&job.id, job.priority, backoff_ms).await?;
                metrics::record_failed();
                metrics::record_retried();

                info!(
                    job_id = %job.id,
                    attempt = job.retry_count + 1,
                    max_retries = job.max_retries,
                    backoff_ms = backoff_ms,
                    error = %msg,
                    "Job failed, retry scheduled"
                );

                Ok(ProcessOutcome::Retrying)
            }
            Err(HandlerError::Transient(msg)) => {
                self.record_permanent_failure(job, worker_id, &msg).await?;
                Ok(ProcessOutcome::DeadLettered)
            }
            Err(HandlerError::Permanent(msg)) => {
                // Retrying cannot help; skip the remaining budget.
                self.record_permanent_failure(job, worker_id, &msg).await?;
                Ok(ProcessOutcome::DeadLettered)
            }
        }
    }

    /// Terminal failure: FAILED row, dead-letter index entry, archive row,
    /// and a "failed" notification.
    async fn record_permanent_failure(
        &self,
        job: &Job,
        worker_id: &str,
        reason: &str,
    ) -> JobResult<()> {
        self.jobs.mark_failed(&job.id, reason).await?;
        self.queue.move_to_dlq(&job.id, reason).await?;

        let mut failed = job.clone();
        failed.error = Some(reason.to_string());
        failed.worker_id = Some(worker_id.to_string());
        failed.completed_at = Some(Utc::now());

        let entry = DeadLetterJob::from_failed_job(&failed, reason, None);
        self.dead_letters.insert(&entry).await?;
        metrics::record_failed();
        metrics::record_dead_lettered();

        error!(
            job_id = %job.id,
            job_type = %job.job_type,
            failure_count = entry.failure_count,
            reason = %reason,
            "Job failed permanently"
        );

        self.notify(&failed, JobOutcome::Failed).await;
        Ok(())
    }

    /// Submits the terminal notification. Delivery problems are logged and
    /// never affect job state.
    async fn notify(&self, job: &Job, outcome: JobOutcome) {
        if let Err(e) = self.webhooks.dispatch(job, outcome).await {
            warn!(job_id = %job.id, error = %e, "Webhook dispatch failed");
        }
    }
}

impl std::fmt::Debug for JobProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobProcessor").finish_non_exhaustive()
    }
}
