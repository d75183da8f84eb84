//! Readiness and liveness evaluation.

use crate::queue::QueueIndex;
use conveyor_repository::{DatabasePool, WorkerRepository};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Readiness verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Both stores respond and at least one active worker exists.
    Healthy,
    /// Both stores respond but no worker is active; jobs will queue up.
    Degraded,
    /// The durable store or the queue index is unreachable.
    Unhealthy,
}

/// Evaluates health over the two stores and the worker table.
pub struct HealthCheck {
    db: DatabasePool,
    queue: Arc<dyn QueueIndex>,
    workers: Arc<dyn WorkerRepository>,
}

impl HealthCheck {
    pub fn new(
        db: DatabasePool,
        queue: Arc<dyn QueueIndex>,
        workers: Arc<dyn WorkerRepository>,
    ) -> Self {
        Self { db, queue, workers }
    }

    /// Readiness: both stores must answer; worker presence decides between
    /// healthy and degraded.
    pub async fn readiness(&self) -> HealthStatus {
        if let Err(e) = self.db.health_check().await {
            warn!(error = %e, "Database health check failed");
            return HealthStatus::Unhealthy;
        }

        if let Err(e) = self.queue.health_check().await {
            warn!(error = %e, "Queue index health check failed");
            return HealthStatus::Unhealthy;
        }

        match self.workers.count_active().await {
            Ok(0) => HealthStatus::Degraded,
            Ok(_) => HealthStatus::Healthy,
            Err(e) => {
                warn!(error = %e, "Worker count query failed");
                HealthStatus::Unhealthy
            }
        }
    }

    /// Liveness is trivially healthy: the process answers, therefore it
    /// lives.
    #[must_use]
    pub const fn liveness(&self) -> HealthStatus {
        HealthStatus::Healthy
    }
}

impl std::fmt::Debug for HealthCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthCheck").finish_non_exhaustive()
    }
}
