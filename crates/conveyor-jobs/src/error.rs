//! Error types for the queueing engine.

use conveyor_core::ConveyorError;
use thiserror::Error;

/// Result type for queue operations.
pub type JobResult<T> = Result<T, JobError>;

/// Errors raised by the queueing engine and its runtime loops.
#[derive(Debug, Error)]
pub enum JobError {
    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Redis pool error.
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// Durable store error.
    #[error("Store error: {0}")]
    Store(#[from] ConveyorError),

    /// Job not found.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// Invalid state for the requested operation.
    #[error("Invalid job state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid cron expression.
    #[error("Invalid cron expression: {0}")]
    Cron(String),

    /// Webhook delivery error.
    #[error("Webhook error: {0}")]
    Webhook(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<JobError> for ConveyorError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Store(inner) => inner,
            JobError::Redis(e) => ConveyorError::Cache(e.to_string()),
            JobError::Pool(e) => ConveyorError::Cache(e.to_string()),
            JobError::Serialization(e) => ConveyorError::Serialization(e.to_string()),
            JobError::NotFound(id) => ConveyorError::not_found("job", id),
            JobError::Cron(msg) => ConveyorError::Validation(msg),
            JobError::InvalidState { expected, actual } => {
                ConveyorError::Conflict(format!("expected {expected}, got {actual}"))
            }
            JobError::Configuration(msg) => ConveyorError::Configuration(msg),
            other => ConveyorError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_pass_through_unwrapped() {
        let err = JobError::Store(ConveyorError::Validation("bad cron".into()));
        match ConveyorError::from(err) {
            ConveyorError::Validation(msg) => assert_eq!(msg, "bad cron"),
            other => panic!("expected Validation, got {other}"),
        }
    }

    #[test]
    fn test_invalid_state_display() {
        let err = JobError::InvalidState {
            expected: "QUEUED".into(),
            actual: "COMPLETED".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("QUEUED") && msg.contains("COMPLETED"));
    }
}
