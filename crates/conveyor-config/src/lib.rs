//! # Conveyor Config
//!
//! Layered configuration for every Conveyor process. Values come from
//! `config/default.toml`, an environment-specific file, an uncommitted
//! `local.toml`, and finally `CONVEYOR_`-prefixed environment variables.

pub mod app_config;
pub mod loader;
pub mod validation;

pub use app_config::{
    AppConfig, AppMetadata, DatabaseConfig, QueueConfig, RecoveryConfig, RedisConfig,
    SchedulerConfig, WebhookConfig, WorkerConfig,
};
pub use loader::load_config;
