//! Redis-backed queue index implementation.

mod queue;

pub use queue::RedisQueueIndex;

use crate::error::{JobError, JobResult};
use conveyor_config::RedisConfig;
use deadpool_redis::{Config, Pool, Runtime};
use tracing::info;

/// Create a Redis connection pool.
pub async fn create_pool(config: &RedisConfig) -> JobResult<Pool> {
    info!("Creating Redis connection pool for queue index...");

    let cfg = Config::from_url(&config.url);

    let pool = cfg
        .builder()
        .map_err(|e| JobError::Configuration(format!("Invalid Redis config: {}", e)))?
        .max_size(config.pool_size)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| JobError::Configuration(format!("Failed to create pool: {}", e)))?;

    // Test connection
    let mut conn = pool.get().await?;
    redis::cmd("PING").query_async::<String>(&mut *conn).await?;

    info!("Redis connection pool created successfully");

    Ok(pool)
}

/// Redis key builder for the queue index.
pub struct RedisKeys {
    prefix: String,
}

impl RedisKeys {
    /// Create a new key builder with the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Ready index (sorted set, score = enqueue time + priority offset).
    pub fn ready(&self) -> String {
        format!("{}:ready", self.prefix)
    }

    /// Delayed index (sorted set, score = absolute fire time in ms).
    pub fn delayed(&self) -> String {
        format!("{}:delayed", self.prefix)
    }

    /// Processing set (hash: job_id -> owner entry).
    pub fn processing(&self) -> String {
        format!("{}:processing", self.prefix)
    }

    /// Dead-letter index (sorted set, score = failure time in ms).
    pub fn deadletter(&self) -> String {
        format!("{}:deadletter", self.prefix)
    }
}

impl Default for RedisKeys {
    fn default() -> Self {
        Self::new("scheduler")
    }
}
