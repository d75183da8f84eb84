//! Webhook event status value object.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Delivery state of a webhook outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WebhookStatus {
    /// Created, first attempt not yet classified.
    #[default]
    Pending,
    /// At least one attempt failed; more remain.
    Retrying,
    /// A 2xx response was received; terminal.
    Success,
    /// Attempts exhausted without a 2xx; terminal.
    Failed,
}

impl WebhookStatus {
    /// Returns true once no further attempts will be made.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Retrying => "retrying",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "retrying" => Some(Self::Retrying),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for WebhookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
