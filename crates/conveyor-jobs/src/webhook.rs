//! Webhook pipeline: outbox dispatcher and retry processor.
//!
//! Notifications follow the outbox pattern. The event row is persisted
//! before the first send, every attempt is written back, and delivery state
//! is observable only through the rows. Nothing here ever blocks or fails
//! job completion.

use crate::error::JobResult;
use crate::metrics;
use chrono::{SecondsFormat, Utc};
use conveyor_config::WebhookConfig;
use conveyor_core::{Job, WebhookEvent, WebhookStatus};
use conveyor_repository::WebhookEventRepository;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Terminal job outcome being notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
}

impl JobOutcome {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Builds the wire payload for a terminal job notification.
///
/// The body is frozen into the event row at creation and re-sent verbatim
/// on every retry.
#[must_use]
pub fn notification_payload(job: &Job, outcome: JobOutcome) -> Value {
    let completed_at = job
        .completed_at
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Millis, true);

    json!({
        "jobId": job.id,
        "jobType": job.job_type,
        "status": outcome.as_str(),
        "result": job.result,
        "error": job.error,
        "completedAt": completed_at,
    })
}

/// Creates outbox rows and executes HTTP attempts.
pub struct WebhookDispatcher {
    events: Arc<dyn WebhookEventRepository>,
    client: reqwest::Client,
    config: WebhookConfig,
}

impl WebhookDispatcher {
    /// Builds the dispatcher with a pooled HTTP client bounded by the
    /// configured per-request timeout.
    pub fn new(
        events: Arc<dyn WebhookEventRepository>,
        config: WebhookConfig,
    ) -> JobResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                crate::error::JobError::Configuration(format!(
                    "Failed to create HTTP client: {}",
                    e
                ))
            })?;

        Ok(Self {
            events,
            client,
            config,
        })
    }

    /// Writes the outbox row and runs the first attempt inline.
    ///
    /// Returns the created event. Jobs without a webhook URL produce no
    /// event.
    pub async fn dispatch(
        &self,
        job: &Job,
        outcome: JobOutcome,
    ) -> JobResult<Option<WebhookEvent>> {
        let Some(url) = &job.webhook_url else {
            return Ok(None);
        };

        let mut event = WebhookEvent::new(
            &job.id,
            &job.job_type,
            url,
            notification_payload(job, outcome),
            self.config.max_attempts,
        );
        self.events.insert(&event).await?;

        self.execute_attempt(&mut event).await?;
        Ok(Some(event))
    }

    /// Runs one HTTP attempt and writes the classified outcome back.
    ///
    /// The attempt counter is persisted before the send so a crash
    /// mid-request cannot repeat attempts beyond the budget.
    pub(crate) async fn execute_attempt(&self, event: &mut WebhookEvent) -> JobResult<()> {
        event.begin_attempt();
        self.events.update(event).await?;

        let response = self
            .client
            .post(&event.url)
            .header(CONTENT_TYPE, "application/json")
            .header("X-Webhook-Event", "job.status")
            .header("X-Job-Id", event.job_id.clone())
            .json(&event.payload)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                event.record_success(resp.status().as_u16());
                debug!(
                    event_id = %event.id,
                    job_id = %event.job_id,
                    status_code = resp.status().as_u16(),
                    "Webhook delivered"
                );
            }
            Ok(resp) => {
                let code = resp.status().as_u16();
                event.record_failure(Some(code), format!("HTTP {}", resp.status()));
                warn!(
                    event_id = %event.id,
                    job_id = %event.job_id,
                    status_code = code,
                    attempt = event.attempts,
                    "Webhook attempt failed"
                );
            }
            Err(e) if e.is_timeout() => {
                event.record_failure(None, "Request timeout");
                warn!(
                    event_id = %event.id,
                    job_id = %event.job_id,
                    attempt = event.attempts,
                    "Webhook attempt timed out"
                );
            }
            Err(e) => {
                event.record_failure(None, e.to_string());
                warn!(
                    event_id = %event.id,
                    job_id = %event.job_id,
                    attempt = event.attempts,
                    error = %e,
                    "Webhook transport error"
                );
            }
        }

        self.events.update(event).await?;
        metrics::record_webhook_attempt(event.status == WebhookStatus::Success);

        Ok(())
    }
}

impl std::fmt::Debug for WebhookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookDispatcher").finish_non_exhaustive()
    }
}

/// Background loop that drains the outbox.
pub struct WebhookRetryProcessor {
    events: Arc<dyn WebhookEventRepository>,
    dispatcher: Arc<WebhookDispatcher>,
    config: WebhookConfig,
    shutdown_tx: broadcast::Sender<()>,
    running: Arc<AtomicBool>,
}

impl WebhookRetryProcessor {
    pub fn new(
        events: Arc<dyn WebhookEventRepository>,
        dispatcher: Arc<WebhookDispatcher>,
        config: WebhookConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            events,
            dispatcher,
            config,
            shutdown_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Runs until stopped, re-sending owed notifications each tick.
    pub async fn run(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Webhook retry processor already running");
            return;
        }

        info!(
            interval_ms = self.config.retry_interval_ms,
            batch_size = self.config.retry_batch_size,
            "Starting webhook retry processor"
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut ticker = interval(self.config.retry_interval());

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "Webhook retry tick failed");
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Webhook retry processor stopped");
    }

    /// Stops the loop after the in-flight tick.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    async fn tick(&self) -> JobResult<()> {
        let batch = self
            .events
            .find_retryable(self.config.retry_batch_size)
            .await?;

        let now = Utc::now();

        for mut event in batch {
            // Exponential backoff gate per event.
            if let Some(next_at) = event.next_attempt_at(
                self.config.retry_base_delay_ms,
                self.config.retry_max_delay_ms,
            ) {
                if now < next_at {
                    continue;
                }
            }

            if let Err(e) = self.dispatcher.execute_attempt(&mut event).await {
                error!(event_id = %event.id, error = %e, "Webhook retry attempt errored");
            }
        }

        Ok(())
    }
}
