//! Worker runtime.
//!
//! One worker process runs three cooperating activities: the heartbeat
//! ticker, the delayed-job promoter, and the sequential main loop. All
//! three observe the same shutdown signal and the loop never dies on
//! handler or infrastructure errors.

use crate::error::JobResult;
use crate::metrics;
use crate::processor::{JobProcessor, ProcessOutcome};
use crate::queue::QueueIndex;
use chrono::Utc;
use conveyor_config::WorkerConfig;
use conveyor_core::WorkerRecord;
use conveyor_repository::{JobRepository, WorkerRepository};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// A single worker with one in-flight slot.
pub struct Worker {
    record: WorkerRecord,
    config: WorkerConfig,
    jobs: Arc<dyn JobRepository>,
    workers: Arc<dyn WorkerRepository>,
    queue: Arc<dyn QueueIndex>,
    processor: Arc<JobProcessor>,
    shutdown_tx: broadcast::Sender<()>,
    running: Arc<AtomicBool>,
}

impl Worker {
    /// Creates a worker; `run` registers it and starts the loops.
    pub fn new(
        name: impl Into<String>,
        config: WorkerConfig,
        jobs: Arc<dyn JobRepository>,
        workers: Arc<dyn WorkerRepository>,
        queue: Arc<dyn QueueIndex>,
        processor: Arc<JobProcessor>,
    ) -> Self {
        let hostname =
            std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let mut record = WorkerRecord::new(name, hostname, std::process::id());
        record.concurrency = config.concurrency;

        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            record,
            config,
            jobs,
            workers,
            queue,
            processor,
            shutdown_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The worker's registration id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.record.id
    }

    /// Registers the worker and runs until stopped.
    pub async fn run(&self) -> JobResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!(worker_id = %self.id(), "Worker already running");
            return Ok(());
        }

        self.workers.insert(&self.record).await?;
        info!(
            worker_id = %self.id(),
            hostname = %self.record.hostname,
            pid = self.record.pid,
            "Worker registered"
        );

        let heartbeat = self.spawn_heartbeat();
        let promoter = self.spawn_promoter();

        self.main_loop().await;

        // Tickers observe the same shutdown signal; join them before the
        // final row write.
        let _ = heartbeat.await;
        let _ = promoter.await;

        if let Err(e) = self.workers.mark_stopped(self.id(), Utc::now()).await {
            error!(worker_id = %self.id(), error = %e, "Failed to mark worker stopped");
        }

        self.running.store(false, Ordering::SeqCst);
        info!(worker_id = %self.id(), "Worker stopped");
        Ok(())
    }

    /// Signals all three activities to stop.
    pub fn stop(&self) {
        info!(worker_id = %self.id(), "Stopping worker...");
        self.running.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    fn spawn_heartbeat(&self) -> tokio::task::JoinHandle<()> {
        let workers = self.workers.clone();
        let worker_id = self.record.id.clone();
        let period = self.config.heartbeat_interval();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = workers.heartbeat(&worker_id, Utc::now()).await {
                            warn!(worker_id = %worker_id, error = %e, "Heartbeat write failed");
                        }
                    }
                }
            }
        })
    }

    fn spawn_promoter(&self) -> tokio::task::JoinHandle<()> {
        let queue = self.queue.clone();
        let worker_id = self.record.id.clone();
        let period = self.config.promote_interval();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        match queue.promote_delayed().await {
                            Ok(0) => {}
                            Ok(count) => {
                                metrics::record_promoted(count);
                                debug!(worker_id = %worker_id, count = count, "Promoted delayed jobs");
                            }
                            Err(e) => {
                                warn!(worker_id = %worker_id, error = %e, "Delayed promotion failed");
                            }
                        }
                    }
                }
            }
        })
    }

    async fn main_loop(&self) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        while self.running.load(Ordering::SeqCst) {
            let worked = match self.run_one().await {
                Ok(worked) => worked,
                Err(e) => {
                    // The loop survives everything; the next tick retries.
                    error!(worker_id = %self.id(), error = %e, "Worker iteration failed");
                    false
                }
            };

            if !worked {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(self.config.poll_interval()) => {}
                }
            }
        }
    }

    /// One iteration: dequeue, load, validate, delegate. Returns true when
    /// a reference was consumed, so the loop polls again immediately.
    async fn run_one(&self) -> JobResult<bool> {
        let Some(job_id) = self.queue.dequeue().await? else {
            return Ok(false);
        };

        let Some(job) = self.jobs.find_by_id(&job_id).await? else {
            // Stale reference: the row is gone.
            warn!(worker_id = %self.id(), job_id = %job_id, "Dequeued unknown job id");
            return Ok(true);
        };

        if !job.status.is_dequeueable() {
            // Absorbs cancellations racing with dequeue.
            debug!(
                worker_id = %self.id(),
                job_id = %job_id,
                status = %job.status,
                "Dequeued job is not runnable, discarding reference"
            );
            return Ok(true);
        }

        if let Err(e) = self.workers.set_active_jobs(self.id(), 1).await {
            warn!(worker_id = %self.id(), error = %e, "Failed to update active job count");
        }

        let outcome = self.processor.process(&job, self.id()).await;

        match &outcome {
            Ok(ProcessOutcome::Completed) => {
                let _ = self.workers.record_outcome(self.id(), true).await;
            }
            Ok(ProcessOutcome::Retrying | ProcessOutcome::DeadLettered) => {
                let _ = self.workers.record_outcome(self.id(), false).await;
            }
            Ok(ProcessOutcome::Discarded) | Err(_) => {}
        }

        if let Err(e) = self.workers.set_active_jobs(self.id(), 0).await {
            warn!(worker_id = %self.id(), error = %e, "Failed to clear active job count");
        }

        outcome?;
        Ok(true)
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.record.id)
            .field("name", &self.record.name)
            .finish_non_exhaustive()
    }
}
