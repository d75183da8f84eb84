//! Application assembly.
//!
//! Wires pools, repositories, the queue index, and the runtime components
//! with explicit constructors. Processes embed an `App` and spawn only the
//! roles they play (worker, schedule executor, recovery, webhook retry).

use crate::error::JobResult;
use crate::handler::HandlerRegistry;
use crate::health::HealthCheck;
use crate::processor::JobProcessor;
use crate::queue::QueueIndex;
use crate::recovery::OrphanRecovery;
use crate::redis::{create_pool, RedisQueueIndex};
use crate::scheduler::ScheduleExecutor;
use crate::service::{DeadLetterService, JobService, ScheduleService};
use crate::webhook::{WebhookDispatcher, WebhookRetryProcessor};
use crate::worker::Worker;
use conveyor_config::AppConfig;
use conveyor_repository::{
    DatabasePool, DeadLetterRepository, JobRepository, MySqlDeadLetterRepository,
    MySqlJobRepository, MySqlScheduleRepository, MySqlWebhookEventRepository,
    MySqlWorkerRepository, ScheduleRepository, WebhookEventRepository, WorkerRepository,
};
use std::sync::Arc;
use tracing::info;

/// Shared wiring for every Conveyor process.
pub struct App {
    pub config: AppConfig,
    pub db: DatabasePool,
    pub queue: Arc<dyn QueueIndex>,
    pub jobs: Arc<dyn JobRepository>,
    pub schedules: Arc<dyn ScheduleRepository>,
    pub workers: Arc<dyn WorkerRepository>,
    pub dead_letters: Arc<dyn DeadLetterRepository>,
    pub webhook_events: Arc<dyn WebhookEventRepository>,
    pub registry: Arc<HandlerRegistry>,
    pub webhook_dispatcher: Arc<WebhookDispatcher>,
    pub processor: Arc<JobProcessor>,
}

impl App {
    /// Connects both stores, runs migrations, and wires the components.
    pub async fn build(config: AppConfig) -> JobResult<Self> {
        crate::metrics::register_metrics();

        let db = DatabasePool::connect(&config.database).await?;
        db.run_migrations().await?;

        let redis_pool = create_pool(&config.redis).await?;
        let queue: Arc<dyn QueueIndex> = Arc::new(RedisQueueIndex::new(
            redis_pool,
            config.redis.key_prefix.clone(),
        ));

        let jobs: Arc<dyn JobRepository> = Arc::new(MySqlJobRepository::new(db.clone()));
        let schedules: Arc<dyn ScheduleRepository> =
            Arc::new(MySqlScheduleRepository::new(db.clone()));
        let workers: Arc<dyn WorkerRepository> = Arc::new(MySqlWorkerRepository::new(db.clone()));
        let dead_letters: Arc<dyn DeadLetterRepository> =
            Arc::new(MySqlDeadLetterRepository::new(db.clone()));
        let webhook_events: Arc<dyn WebhookEventRepository> =
            Arc::new(MySqlWebhookEventRepository::new(db.clone()));

        let registry = Arc::new(HandlerRegistry::new());
        let webhook_dispatcher = Arc::new(WebhookDispatcher::new(
            webhook_events.clone(),
            config.webhook.clone(),
        )?);
        let processor = Arc::new(JobProcessor::new(
            jobs.clone(),
            dead_letters.clone(),
            queue.clone(),
            registry.clone(),
            webhook_dispatcher.clone(),
        ));

        info!(app = %config.app.name, environment = %config.app.environment, "App assembled");

        Ok(Self {
            config,
            db,
            queue,
            jobs,
            schedules,
            workers,
            dead_letters,
            webhook_events,
            registry,
            webhook_dispatcher,
            processor,
        })
    }

    /// Builds a worker bound to this app's components.
    #[must_use]
    pub fn worker(&self, name: impl Into<String>) -> Worker {
        Worker::new(
            name,
            self.config.worker.clone(),
            self.jobs.clone(),
            self.workers.clone(),
            self.queue.clone(),
            self.processor.clone(),
        )
    }

    /// Builds the schedule executor. Run exactly one instance per
    /// deployment.
    #[must_use]
    pub fn schedule_executor(&self) -> ScheduleExecutor {
        ScheduleExecutor::new(
            self.schedules.clone(),
            self.jobs.clone(),
            self.queue.clone(),
            self.config.scheduler.clone(),
            self.config.queue.clone(),
        )
    }

    /// Builds the orphan recovery loop.
    #[must_use]
    pub fn orphan_recovery(&self) -> OrphanRecovery {
        OrphanRecovery::new(
            self.workers.clone(),
            self.jobs.clone(),
            self.queue.clone(),
            self.config.recovery.clone(),
        )
    }

    /// Builds the webhook retry processor.
    #[must_use]
    pub fn webhook_retry_processor(&self) -> WebhookRetryProcessor {
        WebhookRetryProcessor::new(
            self.webhook_events.clone(),
            self.webhook_dispatcher.clone(),
            self.config.webhook.clone(),
        )
    }

    /// Builds the job service.
    #[must_use]
    pub fn job_service(&self) -> JobService {
        JobService::new(
            self.jobs.clone(),
            self.workers.clone(),
            self.queue.clone(),
            self.config.queue.clone(),
        )
    }

    /// Builds the schedule service.
    #[must_use]
    pub fn schedule_service(&self) -> ScheduleService {
        ScheduleService::new(
            self.schedules.clone(),
            self.jobs.clone(),
            self.queue.clone(),
            self.config.queue.clone(),
        )
    }

    /// Builds the dead-letter service.
    #[must_use]
    pub fn dead_letter_service(&self) -> DeadLetterService {
        DeadLetterService::new(
            self.dead_letters.clone(),
            self.jobs.clone(),
            self.queue.clone(),
            self.config.queue.clone(),
        )
    }

    /// Builds the health check.
    #[must_use]
    pub fn health_check(&self) -> HealthCheck {
        HealthCheck::new(self.db.clone(), self.queue.clone(), self.workers.clone())
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("app", &self.config.app.name)
            .finish_non_exhaustive()
    }
}
