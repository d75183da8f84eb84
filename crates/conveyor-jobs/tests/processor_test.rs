//! End-to-end tests for the job processor state machine, run against the
//! in-memory store fakes.

mod common;

use common::{InMemoryDeadLetters, InMemoryJobs, InMemoryQueue, InMemoryWebhookEvents};
use conveyor_config::WebhookConfig;
use conveyor_core::{Job, JobPriority, JobStatus, WebhookStatus};
use conveyor_jobs::handler::{HandlerError, HandlerRegistry};
use conveyor_jobs::processor::{JobProcessor, ProcessOutcome};
use conveyor_jobs::queue::QueueIndex;
use conveyor_jobs::webhook::WebhookDispatcher;
use conveyor_repository::JobRepository;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

struct Harness {
    jobs: Arc<InMemoryJobs>,
    queue: Arc<InMemoryQueue>,
    dead_letters: Arc<InMemoryDeadLetters>,
    events: Arc<InMemoryWebhookEvents>,
    registry: Arc<HandlerRegistry>,
    processor: JobProcessor,
}

impl Harness {
    fn new() -> Self {
        let jobs = Arc::new(InMemoryJobs::new());
        let queue = Arc::new(InMemoryQueue::new());
        let dead_letters = Arc::new(InMemoryDeadLetters::new());
        let events = Arc::new(InMemoryWebhookEvents::new());
        let registry = Arc::new(HandlerRegistry::new());

        let dispatcher = Arc::new(
            WebhookDispatcher::new(events.clone(), WebhookConfig::default()).unwrap(),
        );
        let processor = JobProcessor::new(
            jobs.clone(),
            dead_letters.clone(),
            queue.clone(),
            registry.clone(),
            dispatcher,
        );

        Self {
            jobs,
            queue,
            dead_letters,
            events,
            registry,
            processor,
        }
    }

    /// Inserts a queued job and places it in the ready index.
    async fn queued_job(&self, mut job: Job) -> Job {
        self.jobs.insert(&job).await.unwrap();
        self.jobs.mark_queued(&job.id).await.unwrap();
        self.queue.enqueue(&job.id, job.priority).await.unwrap();
        job.status = JobStatus::Queued;
        job
    }

    /// Pops the next ready id and loads its row.
    async fn dequeue_job(&self) -> Job {
        let id = self.queue.dequeue().await.unwrap().expect("queue not empty");
        self.jobs.get(&id).await
    }
}

#[tokio::test]
async fn test_happy_path_completes_job() {
    let h = Harness::new();
    h.registry.register_fn("echo", |job| {
        Box::pin(async move { Ok(json!({"echoed": job.payload})) })
    });

    h.queued_job(Job::new("echo it", "echo", json!({"x": 1}))).await;

    let job = h.dequeue_job().await;
    let outcome = h.processor.process(&job, "worker-1").await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Completed);

    let row = h.jobs.get(&job.id).await;
    assert_eq!(row.status, JobStatus::Completed);
    assert_eq!(row.result, Some(json!({"echoed": {"x": 1}})));
    assert!(row.error.is_none());
    assert!(row.completed_at.is_some());
    assert!(row.worker_id.is_none());
    assert!(h.queue.processing_ids().is_empty());
    assert!(h.dead_letters.all().is_empty());
}

#[tokio::test]
async fn test_retry_then_succeed() {
    let h = Harness::new();
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    h.registry.register_fn("flaky", move |_| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if n < 2 {
                Err(HandlerError::transient("not yet"))
            } else {
                Ok(json!({"attempt": n + 1}))
            }
        })
    });

    let mut job = Job::new("flaky job", "flaky", json!({}));
    job.max_retries = 3;
    job.retry_delay_ms = 1;
    let job = h.queued_job(job).await;

    // Attempt 1 fails: RETRYING, sitting in the delayed index.
    let loaded = h.dequeue_job().await;
    assert_eq!(
        h.processor.process(&loaded, "worker-1").await.unwrap(),
        ProcessOutcome::Retrying
    );
    let row = h.jobs.get(&job.id).await;
    assert_eq!(row.status, JobStatus::Retrying);
    assert_eq!(row.retry_count, 1);
    assert_eq!(h.queue.delayed_members().len(), 1);

    // Attempt 2 fails again.
    h.queue.make_delayed_due();
    assert_eq!(h.queue.promote_delayed().await.unwrap(), 1);
    let loaded = h.dequeue_job().await;
    assert_eq!(
        h.processor.process(&loaded, "worker-1").await.unwrap(),
        ProcessOutcome::Retrying
    );
    assert_eq!(h.jobs.get(&job.id).await.retry_count, 2);

    // Attempt 3 succeeds.
    h.queue.make_delayed_due();
    h.queue.promote_delayed().await.unwrap();
    let loaded = h.dequeue_job().await;
    assert_eq!(
        h.processor.process(&loaded, "worker-1").await.unwrap(),
        ProcessOutcome::Completed
    );

    let row = h.jobs.get(&job.id).await;
    assert_eq!(row.status, JobStatus::Completed);
    assert_eq!(row.retry_count, 2);
    assert!(h.dead_letters.all().is_empty());
}

#[tokio::test]
async fn test_retry_exhausted_dead_letters_job() {
    let h = Harness::new();
    h.registry.register_fn("doomed", |_| {
        Box::pin(async { Err(HandlerError::transient("always broken")) })
    });

    let mut job = Job::new("doomed job", "doomed", json!({"payload": "original"}));
    job.max_retries = 1;
    job.retry_delay_ms = 1;
    let job = h.queued_job(job).await;

    let loaded = h.dequeue_job().await;
    assert_eq!(
        h.processor.process(&loaded, "worker-1").await.unwrap(),
        ProcessOutcome::Retrying
    );

    h.queue.make_delayed_due();
    h.queue.promote_delayed().await.unwrap();
    let loaded = h.dequeue_job().await;
    assert_eq!(
        h.processor.process(&loaded, "worker-1").await.unwrap(),
        ProcessOutcome::DeadLettered
    );

    let row = h.jobs.get(&job.id).await;
    assert_eq!(row.status, JobStatus::Failed);
    assert_eq!(row.retry_count, 1);
    assert_eq!(row.error.as_deref(), Some("always broken"));

    let entries = h.dead_letters.all();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].original_job_id, job.id);
    assert_eq!(entries[0].failure_count, 2);
    assert_eq!(entries[0].job_payload, json!({"payload": "original"}));

    let dlq_index = h.queue.dead_letters();
    assert_eq!(dlq_index.len(), 1);
    assert_eq!(dlq_index[0].0, job.id);
}

#[tokio::test]
async fn test_missing_handler_is_permanent_failure() {
    let h = Harness::new();

    let job = h
        .queued_job(Job::new("orphan type", "nobody.registered", json!({})))
        .await;

    let loaded = h.dequeue_job().await;
    assert_eq!(
        h.processor.process(&loaded, "worker-1").await.unwrap(),
        ProcessOutcome::DeadLettered
    );

    let row = h.jobs.get(&job.id).await;
    assert_eq!(row.status, JobStatus::Failed);
    assert!(row
        .error
        .as_deref()
        .unwrap()
        .contains("no handler for type nobody.registered"));
    assert_eq!(h.dead_letters.all().len(), 1);
}

#[tokio::test]
async fn test_permanent_error_skips_remaining_retries() {
    let h = Harness::new();
    h.registry.register_fn("malformed", |_| {
        Box::pin(async { Err(HandlerError::permanent("payload can never parse")) })
    });

    let mut job = Job::new("bad payload", "malformed", json!({}));
    job.max_retries = 5;
    let job = h.queued_job(job).await;

    let loaded = h.dequeue_job().await;
    assert_eq!(
        h.processor.process(&loaded, "worker-1").await.unwrap(),
        ProcessOutcome::DeadLettered
    );

    let row = h.jobs.get(&job.id).await;
    assert_eq!(row.status, JobStatus::Failed);
    // No retry was consumed; the budget was skipped outright.
    assert_eq!(row.retry_count, 0);
    assert!(h.queue.delayed_members().is_empty());
}

#[tokio::test]
async fn test_cancelled_job_is_discarded() {
    let h = Harness::new();
    h.registry
        .register_fn("echo", |_| Box::pin(async { Ok(json!({})) }));

    let job = h.queued_job(Job::new("to cancel", "echo", json!({}))).await;
    h.jobs.cancel(&job.id).await.unwrap();

    // The stale reference is still popped, but processing refuses it.
    let id = h.queue.dequeue().await.unwrap().unwrap();
    let loaded = h.jobs.get(&id).await;
    assert_eq!(
        h.processor.process(&loaded, "worker-1").await.unwrap(),
        ProcessOutcome::Discarded
    );

    let row = h.jobs.get(&job.id).await;
    assert_eq!(row.status, JobStatus::Cancelled);
    assert!(row.result.is_none());
}

#[tokio::test]
async fn test_completion_writes_webhook_outbox_row() {
    let h = Harness::new();
    h.registry
        .register_fn("echo", |_| Box::pin(async { Ok(json!({"ok": true})) }));

    // Nothing listens on discard; the inline attempt fails at transport
    // level, which must not affect the job.
    let mut job = Job::new("notify me", "echo", json!({}));
    job.webhook_url = Some("http://127.0.0.1:9/hooks".to_string());
    let job = h.queued_job(job).await;

    let loaded = h.dequeue_job().await;
    assert_eq!(
        h.processor.process(&loaded, "worker-1").await.unwrap(),
        ProcessOutcome::Completed
    );

    assert_eq!(h.jobs.get(&job.id).await.status, JobStatus::Completed);

    let events = h.events.all();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.job_id, job.id);
    assert_eq!(event.status, WebhookStatus::Retrying);
    assert_eq!(event.attempts, 1);
    assert!(event.last_status_code.is_none());
    assert_eq!(event.payload["status"], json!("completed"));
}

#[tokio::test]
async fn test_critical_dequeued_before_earlier_low() {
    let h = Harness::new();

    let low = h
        .queued_job({
            let mut j = Job::new("low", "echo", json!({}));
            j.priority = JobPriority::Low;
            j
        })
        .await;
    let critical = h
        .queued_job({
            let mut j = Job::new("critical", "echo", json!({}));
            j.priority = JobPriority::Critical;
            j
        })
        .await;

    assert_eq!(h.queue.dequeue().await.unwrap().unwrap(), critical.id);
    assert_eq!(h.queue.dequeue().await.unwrap().unwrap(), low.id);
}

#[tokio::test]
async fn test_promotion_is_idempotent() {
    let h = Harness::new();
    let job = Job::new("delayed", "echo", json!({}));
    h.jobs.insert(&job).await.unwrap();
    h.queue
        .enqueue_delayed(&job.id, chrono::Utc::now(), JobPriority::Normal)
        .await
        .unwrap();

    h.queue.make_delayed_due();
    assert_eq!(h.queue.promote_delayed().await.unwrap(), 1);
    // A second pass with no new delayed entries promotes nothing.
    assert_eq!(h.queue.promote_delayed().await.unwrap(), 0);
}
