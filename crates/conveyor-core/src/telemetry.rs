//! Telemetry bootstrap.
//!
//! Initializes the `tracing` subscriber for all Conveyor processes. The
//! filter is taken from `RUST_LOG` when set, with a sensible default
//! otherwise.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name used in log output.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Whether to emit console output.
    #[serde(default = "default_console_output")]
    pub console_output: bool,

    /// Default filter directive when RUST_LOG is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_service_name() -> String {
    "conveyor".to_string()
}

fn default_console_output() -> bool {
    true
}

fn default_filter() -> String {
    "info,conveyor=debug".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            console_output: default_console_output(),
            filter: default_filter(),
        }
    }
}

/// Initialize the tracing subscriber.
///
/// Safe to call once per process; returns quietly if console output is
/// disabled.
pub fn init_telemetry(config: &TelemetryConfig) {
    if !config.console_output {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter.clone()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    tracing::info!(service_name = %config.service_name, "Telemetry initialized");
}
