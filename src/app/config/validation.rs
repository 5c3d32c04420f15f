use super::{Config, ConfigError};
use url::Url;

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = Url::parse(&self.endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid endpoint URL '{}': {}", self.endpoint, e))
        })?;

        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl(format!(
                "Endpoint must be http or https, got '{}'",
                endpoint.scheme()
            )));
        }

        if self.batch_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if self.max_queue_size < self.batch_size {
            return Err(ConfigError::InvalidConfig(format!(
                "Max queue size ({}) must be at least as large as batch size ({})",
                self.max_queue_size, self.batch_size
            )));
        }

        if self.flush_delay_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "Flush delay must be greater than 0".to_string(),
            ));
        }

        if self.connection_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "Connection timeout must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "Request timeout must be greater than 0 when set".to_string(),
            ));
        }

        if self.retry.rearm_on_failure && self.retry.base_delay > self.retry.max_delay {
            return Err(ConfigError::InvalidConfig(format!(
                "Retry base delay ({:?}) exceeds max delay ({:?})",
                self.retry.base_delay, self.retry.max_delay
            )));
        }

        Ok(())
    }
}
