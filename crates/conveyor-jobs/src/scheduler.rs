//! Schedule executor: turns due cron schedules into jobs.
//!
//! Exactly one executor instance may run against a deployment; a second
//! one would create duplicate jobs for every firing.

use crate::cron::CronRule;
use crate::error::JobResult;
use crate::metrics;
use crate::queue::QueueIndex;
use chrono::Utc;
use conveyor_config::{QueueConfig, SchedulerConfig};
use conveyor_core::{Job, Schedule};
use conveyor_repository::{JobRepository, ScheduleRepository};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

const DUE_BATCH_SIZE: u32 = 100;

/// Periodic loop that fires due schedules.
pub struct ScheduleExecutor {
    schedules: Arc<dyn ScheduleRepository>,
    jobs: Arc<dyn JobRepository>,
    queue: Arc<dyn QueueIndex>,
    config: SchedulerConfig,
    queue_config: QueueConfig,
    shutdown_tx: broadcast::Sender<()>,
    running: Arc<AtomicBool>,
}

impl ScheduleExecutor {
    pub fn new(
        schedules: Arc<dyn ScheduleRepository>,
        jobs: Arc<dyn JobRepository>,
        queue: Arc<dyn QueueIndex>,
        config: SchedulerConfig,
        queue_config: QueueConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            schedules,
            jobs,
            queue,
            config,
            queue_config,
            shutdown_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Runs until stopped, checking for due schedules each tick.
    pub async fn run(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Schedule executor already running");
            return;
        }

        if !self.config.enabled {
            info!("Schedule executor disabled by configuration");
            self.running.store(false, Ordering::SeqCst);
            return;
        }

        info!(
            check_interval_ms = self.config.check_interval_ms,
            "Starting schedule executor"
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut ticker = interval(self.config.check_interval());

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "Schedule check failed");
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Schedule executor stopped");
    }

    /// Stops the loop after the in-flight tick.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// One pass: fire every currently due schedule.
    pub async fn tick(&self) -> JobResult<()> {
        let now = Utc::now();
        let due = self.schedules.find_due(now, DUE_BATCH_SIZE).await?;

        for schedule in due {
            if let Err(e) = self.fire(&schedule).await {
                error!(
                    schedule_id = %schedule.id,
                    schedule_name = %schedule.name,
                    error = %e,
                    "Failed to fire schedule"
                );
            }
        }

        Ok(())
    }

    /// Fires one due schedule: create the job, enqueue it, advance the
    /// firing state.
    async fn fire(&self, schedule: &Schedule) -> JobResult<()> {
        let now = Utc::now();

        let rule = match CronRule::parse(&schedule.cron_expr, &schedule.timezone) {
            Ok(rule) => rule,
            Err(e) => {
                // Stored rules are validated at creation, so this only
                // happens after manual row edits. Skip; the operator has to
                // fix the expression.
                error!(
                    schedule_id = %schedule.id,
                    cron_expr = %schedule.cron_expr,
                    error = %e,
                    "Stored cron expression no longer parses"
                );
                return Ok(());
            }
        };
        let next_run_at = rule.next_after(now);

        match self.create_job(schedule).await {
            Ok(job_id) => {
                self.schedules
                    .record_firing(&schedule.id, now, next_run_at)
                    .await?;
                metrics::record_schedule_fired();

                debug!(
                    schedule_id = %schedule.id,
                    schedule_name = %schedule.name,
                    job_id = %job_id,
                    next_run_at = ?next_run_at,
                    "Schedule fired"
                );
            }
            Err(e) => {
                // Skip this firing rather than replay it forever: advance
                // next_run_at without counting a run.
                warn!(
                    schedule_id = %schedule.id,
                    error = %e,
                    "Job creation failed, advancing schedule anyway"
                );
                self.schedules
                    .advance_next_run(&schedule.id, next_run_at)
                    .await?;
            }
        }

        Ok(())
    }

    async fn create_job(&self, schedule: &Schedule) -> JobResult<String> {
        let mut job = Job::new(
            format!("{} (scheduled)", schedule.name),
            schedule.job_type.clone(),
            schedule.job_payload.clone(),
        );
        job.priority = schedule.job_priority;
        job.max_retries = self.queue_config.default_max_retries;
        job.retry_delay_ms = self.queue_config.default_retry_delay_ms;
        job.schedule_id = Some(schedule.id.clone());

        // Durable row first, then the index, then the visible status flip.
        self.jobs.insert(&job).await?;
        self.queue.enqueue(&job.id, job.priority).await?;
        self.jobs.mark_queued(&job.id).await?;
        metrics::record_enqueued();

        Ok(job.id)
    }
}

impl std::fmt::Debug for ScheduleExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleExecutor").finish_non_exhaustive()
    }
}
