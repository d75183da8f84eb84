//! Job handlers and the type registry.

use async_trait::async_trait;
use conveyor_core::Job;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Outcome of a handler invocation that did not succeed.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Worth retrying; counts against the job's retry budget.
    #[error("{0}")]
    Transient(String),

    /// Retrying cannot help; the job goes straight to the dead-letter
    /// store.
    #[error("{0}")]
    Permanent(String),
}

impl HandlerError {
    /// Convenience constructor for transient failures.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Convenience constructor for permanent failures.
    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }
}

/// User code bound to a job type.
///
/// Handlers receive a snapshot of the job and return a structured result.
/// They may run for long periods; the worker never interrupts them.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, job: &Job) -> Result<Value, HandlerError>;
}

/// Adapter so plain async closures can serve as handlers.
struct FnHandler<F>(F);

#[async_trait]
impl<F> JobHandler for FnHandler<F>
where
    F: Fn(Job) -> BoxFuture<'static, Result<Value, HandlerError>> + Send + Sync,
{
    async fn run(&self, job: &Job) -> Result<Value, HandlerError> {
        (self.0)(job.clone()).await
    }
}

/// Registry mapping job type strings to handlers.
///
/// Populated at startup before any worker runs; lookups afterwards are
/// read-only.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a job type, replacing any previous one.
    pub fn register(&self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let job_type = job_type.into();
        self.handlers.write().insert(job_type.clone(), handler);
        info!(job_type = %job_type, "Registered job handler");
    }

    /// Registers an async closure as a handler.
    pub fn register_fn<F>(&self, job_type: impl Into<String>, f: F)
    where
        F: Fn(Job) -> BoxFuture<'static, Result<Value, HandlerError>> + Send + Sync + 'static,
    {
        self.register(job_type, Arc::new(FnHandler(f)));
    }

    /// Looks up the handler for a job type.
    #[must_use]
    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.read().get(job_type).cloned()
    }

    /// Returns true if a handler is registered for the type.
    #[must_use]
    pub fn contains(&self, job_type: &str) -> bool {
        self.handlers.read().contains_key(job_type)
    }

    /// Registered type names.
    #[must_use]
    pub fn job_types(&self) -> Vec<String> {
        self.handlers.read().keys().cloned().collect()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}
