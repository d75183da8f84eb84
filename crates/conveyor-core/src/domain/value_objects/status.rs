//! Job status value object and the transition table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Job row exists but is not yet visible to workers.
    #[default]
    Pending,
    /// Job is in the ready index, waiting for a worker.
    Queued,
    /// A worker owns the job and is running its handler.
    Processing,
    /// Handler returned a result; terminal.
    Completed,
    /// Retries exhausted or failure was permanent; terminal.
    Failed,
    /// Handler failed; the job sits in the delayed index until its backoff
    /// elapses.
    Retrying,
    /// Cancelled by an operator; terminal.
    Cancelled,
}

impl JobStatus {
    /// Returns true for states a job can never leave.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true for states a worker may pick up.
    ///
    /// A worker that pops an id whose row is in any other state discards
    /// the reference and moves on.
    #[must_use]
    pub const fn is_dequeueable(&self) -> bool {
        self.can_transition_to(Self::Processing)
    }

    /// Returns true for states from which an operator may cancel.
    ///
    /// Cancelling a running job is not supported; handlers are never
    /// interrupted.
    #[must_use]
    pub const fn is_cancellable(&self) -> bool {
        self.can_transition_to(Self::Cancelled)
    }

    /// The transition table, as a pure function.
    ///
    /// QUEUED and RETRYING may fail directly: a job whose type has no
    /// registered handler is failed before it ever reaches PROCESSING.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Queued | Self::Cancelled) => true,
            (Self::Queued, Self::Processing | Self::Cancelled | Self::Failed) => true,
            (Self::Processing, Self::Completed | Self::Retrying | Self::Failed) => true,
            (Self::Retrying, Self::Queued | Self::Processing | Self::Cancelled | Self::Failed) => {
                true
            }
            _ => false,
        }
    }

    /// Database string encoding.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Queued => "QUEUED",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Retrying => "RETRYING",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Parses the database string encoding.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "QUEUED" => Some(Self::Queued),
            "PROCESSING" => Some(Self::Processing),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "RETRYING" => Some(Self::Retrying),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
