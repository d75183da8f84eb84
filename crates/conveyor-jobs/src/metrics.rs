//! Prometheus-style metrics for the queueing engine.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names.
pub mod names {
    pub const JOBS_ENQUEUED_TOTAL: &str = "conveyor_jobs_enqueued_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "conveyor_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "conveyor_jobs_failed_total";
    pub const JOBS_RETRIED_TOTAL: &str = "conveyor_jobs_retried_total";
    pub const JOBS_DEAD_LETTERED_TOTAL: &str = "conveyor_jobs_dead_lettered_total";
    pub const JOBS_RECOVERED_TOTAL: &str = "conveyor_jobs_recovered_total";
    pub const JOBS_PROMOTED_TOTAL: &str = "conveyor_jobs_promoted_total";
    pub const SCHEDULES_FIRED_TOTAL: &str = "conveyor_schedules_fired_total";
    pub const WEBHOOK_ATTEMPTS_TOTAL: &str = "conveyor_webhook_attempts_total";
    pub const WEBHOOK_DELIVERIES_TOTAL: &str = "conveyor_webhook_deliveries_total";

    pub const QUEUE_READY: &str = "conveyor_queue_ready";
    pub const QUEUE_DELAYED: &str = "conveyor_queue_delayed";
    pub const QUEUE_PROCESSING: &str = "conveyor_queue_processing";
    pub const QUEUE_DEADLETTER: &str = "conveyor_queue_deadletter";

    pub const JOB_DURATION_SECONDS: &str = "conveyor_job_duration_seconds";
}

/// Register all metric descriptions. Call once at startup.
pub fn register_metrics() {
    describe_counter!(names::JOBS_ENQUEUED_TOTAL, "Jobs placed in the ready or delayed index");
    describe_counter!(names::JOBS_COMPLETED_TOTAL, "Jobs completed successfully");
    describe_counter!(names::JOBS_FAILED_TOTAL, "Handler invocations that failed");
    describe_counter!(names::JOBS_RETRIED_TOTAL, "Jobs rescheduled for retry");
    describe_counter!(names::JOBS_DEAD_LETTERED_TOTAL, "Jobs archived to the dead-letter store");
    describe_counter!(names::JOBS_RECOVERED_TOTAL, "Jobs reclaimed from dead workers");
    describe_counter!(names::JOBS_PROMOTED_TOTAL, "Delayed jobs promoted to ready");
    describe_counter!(names::SCHEDULES_FIRED_TOTAL, "Schedule firings that created a job");
    describe_counter!(names::WEBHOOK_ATTEMPTS_TOTAL, "Webhook HTTP attempts");
    describe_counter!(names::WEBHOOK_DELIVERIES_TOTAL, "Webhook attempts answered with 2xx");

    describe_gauge!(names::QUEUE_READY, "Ready index depth");
    describe_gauge!(names::QUEUE_DELAYED, "Delayed index depth");
    describe_gauge!(names::QUEUE_PROCESSING, "Processing set size");
    describe_gauge!(names::QUEUE_DEADLETTER, "Dead-letter index depth");

    describe_histogram!(names::JOB_DURATION_SECONDS, "Handler execution duration");
}

pub(crate) fn record_enqueued() {
    counter!(names::JOBS_ENQUEUED_TOTAL).increment(1);
}

pub(crate) fn record_completed(duration: Duration) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    histogram!(names::JOB_DURATION_SECONDS).record(duration.as_secs_f64());
}

pub(crate) fn record_failed() {
    counter!(names::JOBS_FAILED_TOTAL).increment(1);
}

pub(crate) fn record_retried() {
    counter!(names::JOBS_RETRIED_TOTAL).increment(1);
}

pub(crate) fn record_dead_lettered() {
    counter!(names::JOBS_DEAD_LETTERED_TOTAL).increment(1);
}

pub(crate) fn record_recovered(count: u64) {
    counter!(names::JOBS_RECOVERED_TOTAL).increment(count);
}

pub(crate) fn record_promoted(count: u64) {
    counter!(names::JOBS_PROMOTED_TOTAL).increment(count);
}

pub(crate) fn record_schedule_fired() {
    counter!(names::SCHEDULES_FIRED_TOTAL).increment(1);
}

pub(crate) fn record_webhook_attempt(delivered: bool) {
    counter!(names::WEBHOOK_ATTEMPTS_TOTAL).increment(1);
    if delivered {
        counter!(names::WEBHOOK_DELIVERIES_TOTAL).increment(1);
    }
}

/// Publishes current index depths.
pub fn record_queue_depths(depths: &crate::queue::QueueDepths) {
    gauge!(names::QUEUE_READY).set(depths.ready as f64);
    gauge!(names::QUEUE_DELAYED).set(depths.delayed as f64);
    gauge!(names::QUEUE_PROCESSING).set(depths.processing as f64);
    gauge!(names::QUEUE_DEADLETTER).set(depths.deadletter as f64);
}
