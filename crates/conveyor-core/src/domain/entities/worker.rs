//! Worker registration entity.

use crate::domain::value_objects::WorkerStatus;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row per live (or historical) processing process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: String,
    pub name: String,
    pub hostname: String,
    pub pid: u32,
    pub status: WorkerStatus,

    /// Advisory; the runtime keeps a single in-flight slot.
    pub concurrency: u32,
    pub active_jobs: u32,

    pub processed_count: u64,
    pub failed_count: u64,

    pub last_heartbeat: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl WorkerRecord {
    /// Creates a freshly registered active worker.
    #[must_use]
    pub fn new(name: impl Into<String>, hostname: impl Into<String>, pid: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            hostname: hostname.into(),
            pid,
            status: WorkerStatus::Active,
            concurrency: 1,
            active_jobs: 0,
            processed_count: 0,
            failed_count: 0,
            last_heartbeat: now,
            started_at: now,
            stopped_at: None,
        }
    }

    /// Returns true when the last heartbeat is older than `threshold`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.status == WorkerStatus::Active && self.last_heartbeat < now - threshold
    }
}
