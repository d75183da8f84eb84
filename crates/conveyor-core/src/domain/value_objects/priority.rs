//! Job priority value object.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheduling priority of a job.
///
/// The ready index scores an entry as enqueue-time plus the band offset, so
/// lower offsets are served first. Offsets between adjacent bands are one
/// hour apart: a lower band would have to stay saturated for a full hour
/// before it could delay a freshly enqueued higher-band job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobPriority {
    /// Time-sensitive work, served before everything else.
    Critical,
    /// Important work.
    High,
    /// Default band.
    #[default]
    Normal,
    /// Background work.
    Low,
}

impl JobPriority {
    /// Score offset in milliseconds added to the enqueue timestamp.
    #[must_use]
    pub const fn offset_ms(&self) -> u64 {
        match self {
            Self::Critical => 0,
            Self::High => 3_600_000,
            Self::Normal => 7_200_000,
            Self::Low => 10_800_000,
        }
    }

    /// Database string encoding.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Normal => "NORMAL",
            Self::Low => "LOW",
        }
    }

    /// Parses the database string encoding.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CRITICAL" => Some(Self::Critical),
            "HIGH" => Some(Self::High),
            "NORMAL" => Some(Self::Normal),
            "LOW" => Some(Self::Low),
            _ => None,
        }
    }

    /// All bands, highest first.
    #[must_use]
    pub const fn all() -> [Self; 4] {
        [Self::Critical, Self::High, Self::Normal, Self::Low]
    }
}

impl fmt::Display for JobPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
