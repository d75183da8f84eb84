//! Cron rule parsing and evaluation.
//!
//! Schedules carry five-field expressions (minute, hour, day-of-month,
//! month, day-of-week). Evaluation happens in the schedule's IANA timezone
//! so DST transitions shift firings with local wall-clock time.

use crate::error::{JobError, JobResult};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::str::FromStr;

/// A parsed, timezone-aware cron rule.
#[derive(Debug, Clone)]
pub struct CronRule {
    expr: String,
    schedule: Schedule,
    timezone: Tz,
}

impl CronRule {
    /// Parses a five-field expression in the given IANA timezone.
    ///
    /// Intervals (`*/N`), ranges (`A-B`), lists (`A,B`), and wildcards are
    /// all accepted.
    pub fn parse(expr: &str, timezone: &str) -> JobResult<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(JobError::Cron(format!(
                "expected 5 fields (minute hour day month weekday), got {}: {:?}",
                fields.len(),
                expr
            )));
        }

        // The evaluator wants a seconds field; pin it to zero.
        let normalized = format!("0 {}", fields.join(" "));
        let schedule = Schedule::from_str(&normalized)
            .map_err(|e| JobError::Cron(format!("{}: {}", expr, e)))?;

        let timezone: Tz = timezone
            .parse()
            .map_err(|_| JobError::Cron(format!("unknown timezone: {}", timezone)))?;

        Ok(Self {
            expr: expr.to_string(),
            schedule,
            timezone,
        })
    }

    /// The original five-field expression.
    #[must_use]
    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// First firing strictly after `from`.
    ///
    /// Never returns `from` itself: a schedule that fires exactly at a tick
    /// must not fire twice.
    #[must_use]
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = from.with_timezone(&self.timezone);
        self.schedule
            .after(&local)
            .next()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// The next `count` firings strictly after `from`.
    #[must_use]
    pub fn upcoming(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        let local = from.with_timezone(&self.timezone);
        self.schedule
            .after(&local)
            .take(count)
            .map(|dt| dt.with_timezone(&Utc))
            .collect()
    }
}
