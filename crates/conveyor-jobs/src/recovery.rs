//! Orphan recovery: reclaims jobs stranded by dead workers.

use crate::error::JobResult;
use crate::metrics;
use crate::queue::QueueIndex;
use chrono::Utc;
use conveyor_config::RecoveryConfig;
use conveyor_core::WorkerRecord;
use conveyor_repository::{JobRepository, WorkerRepository};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{error, info, warn};

const RECOVERY_ERROR: &str = "Worker died, job recovered automatically";

/// Periodic loop that detects silent workers and requeues their in-flight
/// jobs.
pub struct OrphanRecovery {
    workers: Arc<dyn WorkerRepository>,
    jobs: Arc<dyn JobRepository>,
    queue: Arc<dyn QueueIndex>,
    config: RecoveryConfig,
    shutdown_tx: broadcast::Sender<()>,
    running: Arc<AtomicBool>,
}

impl OrphanRecovery {
    pub fn new(
        workers: Arc<dyn WorkerRepository>,
        jobs: Arc<dyn JobRepository>,
        queue: Arc<dyn QueueIndex>,
        config: RecoveryConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            workers,
            jobs,
            queue,
            config,
            shutdown_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Runs until stopped.
    pub async fn run(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Orphan recovery already running");
            return;
        }

        info!(
            check_interval_ms = self.config.check_interval_ms,
            stale_threshold_ms = self.config.stale_threshold_ms,
            "Starting orphan recovery"
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut ticker = interval(self.config.check_interval());

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "Orphan recovery tick failed");
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Orphan recovery stopped");
    }

    /// Stops the loop after the in-flight tick.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// One pass: find stale workers, reclaim their jobs, retire them.
    pub async fn tick(&self) -> JobResult<u64> {
        let cutoff = Utc::now() - self.config.stale_threshold();
        let stale = self.workers.find_stale(cutoff).await?;

        let mut total_recovered = 0u64;

        for worker in stale {
            match self.reclaim_worker(&worker).await {
                Ok(recovered) => {
                    total_recovered += recovered;
                }
                Err(e) => {
                    // Leave the worker active; the next tick retries it.
                    error!(
                        worker_id = %worker.id,
                        error = %e,
                        "Failed to reclaim dead worker"
                    );
                }
            }
        }

        if total_recovered > 0 {
            metrics::record_recovered(total_recovered);
            info!(count = total_recovered, "Recovered orphaned jobs");
        }

        Ok(total_recovered)
    }

    async fn reclaim_worker(&self, worker: &WorkerRecord) -> JobResult<u64> {
        warn!(
            worker_id = %worker.id,
            hostname = %worker.hostname,
            last_heartbeat = %worker.last_heartbeat,
            "Worker heartbeat aged out, reclaiming its jobs"
        );

        let mut recovered = 0u64;

        // Page through everything the worker still owns before retiring it;
        // a stopped worker is never scanned again.
        loop {
            let stranded = self
                .jobs
                .find_processing_by_worker(&worker.id, self.config.page_size)
                .await?;
            let page_len = stranded.len();

            for job in &stranded {
                // The retry bump makes a hang-then-resume worker lose the
                // completion compare-and-set.
                self.jobs.mark_retrying(&job.id, RECOVERY_ERROR).await?;
                self.queue
                    .requeue(&job.id, job.priority, self.config.recovery_delay_ms)
                    .await?;
                recovered += 1;

                info!(
                    job_id = %job.id,
                    worker_id = %worker.id,
                    delay_ms = self.config.recovery_delay_ms,
                    "Recovered orphaned job"
                );
            }

            if page_len < self.config.page_size as usize {
                break;
            }
        }

        self.workers.mark_stopped(&worker.id, Utc::now()).await?;
        Ok(recovered)
    }
}

impl std::fmt::Debug for OrphanRecovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrphanRecovery").finish_non_exhaustive()
    }
}
