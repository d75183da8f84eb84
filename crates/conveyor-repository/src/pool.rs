//! MySQL connection pool.

use conveyor_config::DatabaseConfig;
use conveyor_core::{ConveyorError, ConveyorResult};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use std::time::Duration;
use tracing::{error, info};

/// Shared handle to the durable store.
///
/// Cheap to clone; every repository holds one.
#[derive(Clone)]
pub struct DatabasePool {
    pool: MySqlPool,
}

impl DatabasePool {
    /// Opens the pool and verifies the store answers before returning.
    pub async fn connect(config: &DatabaseConfig) -> ConveyorResult<Self> {
        let pool = MySqlPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .connect(&config.url)
            .await
            .map_err(|e| {
                error!(error = %e, "Could not open MySQL pool");
                ConveyorError::Database(format!("pool connect: {}", e))
            })?;

        let db = Self { pool };

        // A pool can be created against a store that refuses queries;
        // probe once so misconfiguration surfaces at startup, not on the
        // first job.
        db.health_check().await?;

        info!(
            min_connections = config.min_connections,
            max_connections = config.max_connections,
            "Durable store ready"
        );

        Ok(db)
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn with_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the underlying pool.
    #[must_use]
    pub fn inner(&self) -> &MySqlPool {
        &self.pool
    }

    /// Round-trips one trivial query through the store.
    pub async fn health_check(&self) -> ConveyorResult<()> {
        let one: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ConveyorError::Database(format!("store probe: {}", e)))?;

        if one != 1 {
            return Err(ConveyorError::Database(
                "store probe returned unexpected value".to_string(),
            ));
        }

        Ok(())
    }

    /// Applies any pending SQL migrations from the workspace `migrations/`
    /// directory.
    pub async fn run_migrations(&self) -> ConveyorResult<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ConveyorError::Database(format!("migrate: {}", e)))?;

        info!("Schema migrations applied");
        Ok(())
    }

    /// Drains and closes every connection.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Durable store connections closed");
    }
}

impl std::fmt::Debug for DatabasePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabasePool")
            .field("connections", &self.pool.size())
            .field("idle", &self.pool.num_idle())
            .field("closed", &self.pool.is_closed())
            .finish()
    }
}
