//! Configuration validation.

use crate::app_config::AppConfig;
use conveyor_core::{ConveyorError, ConveyorResult};

/// Rejects configurations that cannot work at runtime.
pub fn validate_config(config: &AppConfig) -> ConveyorResult<()> {
    if config.database.url.is_empty() {
        return Err(ConveyorError::Configuration(
            "database.url must not be empty".to_string(),
        ));
    }

    if config.redis.url.is_empty() {
        return Err(ConveyorError::Configuration(
            "redis.url must not be empty".to_string(),
        ));
    }

    if config.database.max_connections < config.database.min_connections {
        return Err(ConveyorError::Configuration(
            "database.max_connections must be >= min_connections".to_string(),
        ));
    }

    if config.queue.default_retry_delay_ms < config.queue.min_retry_delay_ms {
        return Err(ConveyorError::Configuration(format!(
            "queue.default_retry_delay_ms must be >= {}",
            config.queue.min_retry_delay_ms
        )));
    }

    if config.webhook.max_attempts == 0 {
        return Err(ConveyorError::Configuration(
            "webhook.max_attempts must be at least 1".to_string(),
        ));
    }

    // A stale threshold below the heartbeat period would reclaim live
    // workers on every recovery tick.
    if config.recovery.stale_threshold_ms <= config.worker.heartbeat_interval_ms {
        return Err(ConveyorError::Configuration(
            "recovery.stale_threshold_ms must exceed worker.heartbeat_interval_ms".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_empty_database_url_rejected() {
        let mut config = AppConfig::default();
        config.database.url.clear();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_stale_threshold_must_exceed_heartbeat() {
        let mut config = AppConfig::default();
        config.recovery.stale_threshold_ms = config.worker.heartbeat_interval_ms;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_retry_delay_floor() {
        let mut config = AppConfig::default();
        config.queue.default_retry_delay_ms = 50;
        assert!(validate_config(&config).is_err());
    }
}
