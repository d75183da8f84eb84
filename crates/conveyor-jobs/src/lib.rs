//! # Conveyor Jobs
//!
//! The queueing engine of the Conveyor task-scheduling service:
//!
//! - a two-tier queue index (priority-ordered ready set plus time-ordered
//!   delayed set) over Redis sorted sets, with MySQL as the system of
//!   record,
//! - the worker runtime (heartbeat, delayed promotion, sequential dequeue
//!   loop),
//! - the job processor state machine with bounded exponential retries and
//!   a dead-letter archive,
//! - the cron schedule executor,
//! - orphan recovery for jobs stranded by crashed workers,
//! - and an outbox-based webhook pipeline with its own retry loop.
//!
//! Producers create a durable row first and an index entry second; workers
//! pop ids with `ZPOPMIN`, load the row, and drive it through its states.
//! Every long-running loop owns a shutdown signal and survives handler and
//! infrastructure errors.

pub mod app;
pub mod cron;
pub mod error;
pub mod handler;
pub mod health;
pub mod metrics;
pub mod processor;
pub mod queue;
pub mod recovery;
pub mod redis;
pub mod scheduler;
pub mod service;
pub mod webhook;
pub mod worker;

pub use app::App;
pub use cron::CronRule;
pub use error::{JobError, JobResult};
pub use handler::{HandlerError, HandlerRegistry, JobHandler};
pub use health::{HealthCheck, HealthStatus};
pub use processor::{JobProcessor, ProcessOutcome};
pub use queue::{ready_score, QueueDepths, QueueIndex};
pub use recovery::OrphanRecovery;
pub use redis::RedisQueueIndex;
pub use scheduler::ScheduleExecutor;
pub use service::{
    DashboardStats, DeadLetterService, JobService, NewJob, NewSchedule, ScheduleService,
    ScheduleUpdate,
};
pub use webhook::{JobOutcome, WebhookDispatcher, WebhookRetryProcessor};
pub use worker::Worker;
