//! Unified error types for all layers of the service.

use thiserror::Error;

/// Unified error type for Conveyor.
///
/// Covers domain, persistence, and infrastructure failures. The queueing
/// engine wraps these into its own error type where needed.
#[derive(Error, Debug)]
pub enum ConveyorError {
    /// Resource not found.
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict, e.g. an invalid state transition.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Redis/queue-index error.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// External service error.
    #[error("External service error: {service} - {message}")]
    ExternalService { service: String, message: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConveyorError {
    /// Convenience constructor for not-found errors.
    #[must_use]
    pub fn not_found(resource_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type,
            id: id.into(),
        }
    }

    /// Returns true if this error indicates a missing resource.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if this error maps to a caller mistake rather than an
    /// infrastructure failure.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Validation(_) | Self::Conflict(_)
        )
    }
}

impl From<serde_json::Error> for ConveyorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for ConveyorError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound {
                resource_type: "row",
                id: String::new(),
            },
            other => Self::Database(other.to_string()),
        }
    }
}
