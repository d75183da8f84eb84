//! Schedule entity.

use crate::domain::value_objects::JobPriority;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A recurring job template driven by a cron rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub name: String,

    /// Five-field cron expression (minute, hour, day-of-month, month,
    /// day-of-week).
    pub cron_expr: String,

    /// IANA timezone the expression is evaluated in.
    pub timezone: String,

    pub enabled: bool,

    /// Template for produced jobs.
    pub job_type: String,
    pub job_payload: Value,
    pub job_priority: JobPriority,

    /// Next firing instant; null iff disabled.
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub run_count: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    /// Creates a new enabled schedule. `next_run_at` must be filled in by
    /// the caller from the cron rule before the row is stored.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        cron_expr: impl Into<String>,
        timezone: impl Into<String>,
        job_type: impl Into<String>,
        job_payload: Value,
        job_priority: JobPriority,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            cron_expr: cron_expr.into(),
            timezone: timezone.into(),
            enabled: true,
            job_type: job_type.into(),
            job_payload,
            job_priority,
            next_run_at: None,
            last_run_at: None,
            run_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Disables the schedule; a disabled schedule has no next firing.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.next_run_at = None;
        self.updated_at = Utc::now();
    }

    /// Returns true when the schedule is due at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_run_at.is_some_and(|at| at <= now)
    }
}
