//! Queue index abstraction.
//!
//! A thin algebra over the sorted-set store: four indexes (ready, delayed,
//! processing, dead-letter) with individually atomic operations. The
//! durable store stays authoritative; everything here is derived and could
//! be rebuilt from it.

use crate::error::JobResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conveyor_core::JobPriority;
use serde::{Deserialize, Serialize};

/// Computes the ready-index score for an enqueue at `at`.
///
/// Enqueue-time millis plus the band offset, so ZPOPMIN yields strict
/// priority across bands and FIFO within one band. The offset is added,
/// never subtracted: subtracting would serve LOW before CRITICAL.
#[must_use]
pub fn ready_score(at: DateTime<Utc>, priority: JobPriority) -> f64 {
    (at.timestamp_millis() as u64).saturating_add(priority.offset_ms()) as f64
}

/// Cardinalities of the four indexes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueDepths {
    pub ready: u64,
    pub delayed: u64,
    pub processing: u64,
    pub deadletter: u64,
}

/// Operations over the queue index.
///
/// Callers that need both stores to agree order their writes
/// durable-store-first for creation and queue-first for removal. There is
/// no multi-step atomicity here; a crash between stores is reconciled by
/// orphan recovery or accepted as a lost enqueue.
#[async_trait]
pub trait QueueIndex: Send + Sync {
    /// Adds a job to the ready index.
    async fn enqueue(&self, job_id: &str, priority: JobPriority) -> JobResult<()>;

    /// Adds a job to the delayed index with an absolute fire time.
    async fn enqueue_delayed(
        &self,
        job_id: &str,
        fire_at: DateTime<Utc>,
        priority: JobPriority,
    ) -> JobResult<()>;

    /// Atomically pops the minimum-score entry of the ready index.
    async fn dequeue(&self) -> JobResult<Option<String>>;

    /// Moves every due delayed entry into the ready index.
    ///
    /// Returns the number promoted. Safe under concurrent promoters: each
    /// member is removed before it is re-added, so a member is promoted at
    /// most once.
    async fn promote_delayed(&self) -> JobResult<u64>;

    /// Records the owning worker in the processing set.
    async fn mark_processing(&self, job_id: &str, worker_id: &str) -> JobResult<()>;

    /// Removes a job from the processing set.
    async fn mark_completed(&self, job_id: &str) -> JobResult<()>;

    /// Removes a job from the processing set and schedules it into the
    /// delayed index after `delay_ms`. Used for retries and recovery.
    async fn requeue(&self, job_id: &str, priority: JobPriority, delay_ms: u64) -> JobResult<()>;

    /// Adds a dead-letter entry and removes the job from the processing
    /// set.
    async fn move_to_dlq(&self, job_id: &str, reason: &str) -> JobResult<()>;

    /// Removes the dead-letter entries whose embedded job id matches.
    ///
    /// Returns the number of members removed.
    async fn remove_from_dlq(&self, job_id: &str) -> JobResult<u64>;

    /// Index cardinalities.
    async fn stats(&self) -> JobResult<QueueDepths>;

    /// Round-trips the underlying store.
    async fn health_check(&self) -> JobResult<()>;
}
