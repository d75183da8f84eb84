//! Worker runtime tests: the full dequeue loop against in-memory fakes.

mod common;

use common::{InMemoryDeadLetters, InMemoryJobs, InMemoryQueue, InMemoryWebhookEvents, InMemoryWorkers};
use conveyor_config::{WebhookConfig, WorkerConfig};
use conveyor_core::{Job, JobStatus, WorkerStatus};
use conveyor_jobs::handler::HandlerRegistry;
use conveyor_jobs::processor::JobProcessor;
use conveyor_jobs::queue::QueueIndex;
use conveyor_jobs::webhook::WebhookDispatcher;
use conveyor_jobs::worker::Worker;
use conveyor_repository::JobRepository;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn fast_worker_config() -> WorkerConfig {
    WorkerConfig {
        concurrency: 1,
        poll_interval_ms: 10,
        heartbeat_interval_ms: 50,
        promote_interval_ms: 20,
    }
}

async fn wait_until<F, Fut>(mut predicate: F, timeout: Duration)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if predicate().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within {:?}", timeout);
}

#[tokio::test]
async fn test_worker_drains_queue_and_stops_cleanly() {
    let jobs = Arc::new(InMemoryJobs::new());
    let workers = Arc::new(InMemoryWorkers::new());
    let queue = Arc::new(InMemoryQueue::new());
    let dead_letters = Arc::new(InMemoryDeadLetters::new());
    let events = Arc::new(InMemoryWebhookEvents::new());

    let registry = Arc::new(HandlerRegistry::new());
    registry.register_fn("echo", |job| {
        Box::pin(async move { Ok(json!({"echoed": job.payload})) })
    });

    let dispatcher =
        Arc::new(WebhookDispatcher::new(events.clone(), WebhookConfig::default()).unwrap());
    let processor = Arc::new(JobProcessor::new(
        jobs.clone(),
        dead_letters.clone(),
        queue.clone(),
        registry.clone(),
        dispatcher,
    ));

    let mut ids = Vec::new();
    for i in 0..3 {
        let job = Job::new(format!("job-{i}"), "echo", json!({"i": i}));
        jobs.insert(&job).await.unwrap();
        jobs.mark_queued(&job.id).await.unwrap();
        queue.enqueue(&job.id, job.priority).await.unwrap();
        ids.push(job.id);
    }

    let worker = Arc::new(Worker::new(
        "test-worker",
        fast_worker_config(),
        jobs.clone(),
        workers.clone(),
        queue.clone(),
        processor,
    ));
    let worker_id = worker.id().to_string();

    let runner = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run().await })
    };

    wait_until(
        || {
            let jobs = jobs.clone();
            let ids = ids.clone();
            async move {
                let mut done = true;
                for id in &ids {
                    done &= jobs.get(id).await.status == JobStatus::Completed;
                }
                done
            }
        },
        Duration::from_secs(5),
    )
    .await;

    worker.stop();
    runner.await.unwrap().unwrap();

    let record = workers.get(&worker_id).await;
    assert_eq!(record.status, WorkerStatus::Stopped);
    assert_eq!(record.processed_count, 3);
    assert_eq!(record.failed_count, 0);
    assert_eq!(record.active_jobs, 0);
    assert!(record.stopped_at.is_some());
}

#[tokio::test]
async fn test_worker_promotes_delayed_jobs() {
    let jobs = Arc::new(InMemoryJobs::new());
    let workers = Arc::new(InMemoryWorkers::new());
    let queue = Arc::new(InMemoryQueue::new());
    let dead_letters = Arc::new(InMemoryDeadLetters::new());
    let events = Arc::new(InMemoryWebhookEvents::new());

    let registry = Arc::new(HandlerRegistry::new());
    registry.register_fn("echo", |_| Box::pin(async { Ok(json!({})) }));

    let dispatcher =
        Arc::new(WebhookDispatcher::new(events.clone(), WebhookConfig::default()).unwrap());
    let processor = Arc::new(JobProcessor::new(
        jobs.clone(),
        dead_letters.clone(),
        queue.clone(),
        registry.clone(),
        dispatcher,
    ));

    // Due 50ms from now; the promoter ticker must move it to ready and the
    // main loop must then run it.
    let job = Job::new("delayed", "echo", json!({}));
    jobs.insert(&job).await.unwrap();
    jobs.mark_queued(&job.id).await.unwrap();
    queue
        .enqueue_delayed(
            &job.id,
            chrono::Utc::now() + chrono::Duration::milliseconds(50),
            job.priority,
        )
        .await
        .unwrap();

    let worker = Arc::new(Worker::new(
        "promoter-worker",
        fast_worker_config(),
        jobs.clone(),
        workers.clone(),
        queue.clone(),
        processor,
    ));

    let runner = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run().await })
    };

    wait_until(
        || {
            let jobs = jobs.clone();
            let id = job.id.clone();
            async move { jobs.get(&id).await.status == JobStatus::Completed }
        },
        Duration::from_secs(5),
    )
    .await;

    worker.stop();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_worker_survives_failing_handler() {
    let jobs = Arc::new(InMemoryJobs::new());
    let workers = Arc::new(InMemoryWorkers::new());
    let queue = Arc::new(InMemoryQueue::new());
    let dead_letters = Arc::new(InMemoryDeadLetters::new());
    let events = Arc::new(InMemoryWebhookEvents::new());

    let registry = Arc::new(HandlerRegistry::new());
    registry.register_fn("broken", |_| {
        Box::pin(async { Err(conveyor_jobs::handler::HandlerError::permanent("nope")) })
    });
    registry.register_fn("echo", |_| Box::pin(async { Ok(json!({})) }));

    let dispatcher =
        Arc::new(WebhookDispatcher::new(events.clone(), WebhookConfig::default()).unwrap());
    let processor = Arc::new(JobProcessor::new(
        jobs.clone(),
        dead_letters.clone(),
        queue.clone(),
        registry.clone(),
        dispatcher,
    ));

    let bad = Job::new("bad", "broken", json!({}));
    jobs.insert(&bad).await.unwrap();
    jobs.mark_queued(&bad.id).await.unwrap();
    queue.enqueue(&bad.id, bad.priority).await.unwrap();

    let good = Job::new("good", "echo", json!({}));
    jobs.insert(&good).await.unwrap();
    jobs.mark_queued(&good.id).await.unwrap();
    queue.enqueue(&good.id, good.priority).await.unwrap();

    let worker = Arc::new(Worker::new(
        "resilient-worker",
        fast_worker_config(),
        jobs.clone(),
        workers.clone(),
        queue.clone(),
        processor,
    ));
    let worker_id = worker.id().to_string();

    let runner = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run().await })
    };

    wait_until(
        || {
            let jobs = jobs.clone();
            let good_id = good.id.clone();
            async move { jobs.get(&good_id).await.status == JobStatus::Completed }
        },
        Duration::from_secs(5),
    )
    .await;

    worker.stop();
    runner.await.unwrap().unwrap();

    assert_eq!(jobs.get(&bad.id).await.status, JobStatus::Failed);
    let record = workers.get(&worker_id).await;
    assert_eq!(record.processed_count, 1);
    assert_eq!(record.failed_count, 1);
}
