use crate::app::config::serde_helpers;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happens after a failed send.
///
/// A failed batch is always put back at the front of the queue. With
/// `rearm_on_failure` off, nothing else happens until the next event
/// arrives; with it on, the scheduler arms a backoff timer so the retry
/// does not depend on new traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub rearm_on_failure: bool,
    #[serde(with = "serde_helpers")]
    pub base_delay: Duration,
    #[serde(with = "serde_helpers")]
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            rearm_on_failure: false,
            base_delay: Duration::from_millis(5000),
            max_delay: Duration::from_secs(300),
            jitter: true,
        }
    }
}

/// Exponential backoff keyed on the number of consecutive failures.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl BackoffPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            base_delay: config.base_delay,
            max_delay: config.max_delay,
            jitter: config.jitter,
        }
    }

    /// Delay before retrying after `consecutive_failures` failed sends in a row.
    /// The first failure waits `base_delay`, each further one doubles it.
    pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures.saturating_sub(1).min(31);
        let multiplier = 2_u32.saturating_pow(exponent);
        let capped = self
            .base_delay
            .checked_mul(multiplier)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay));

        if self.jitter {
            apply_jitter(capped)
        } else {
            capped
        }
    }
}

fn apply_jitter(delay: Duration) -> Duration {
    let mut rng = rand::rng();
    let jitter_factor = rng.random_range(0.5..1.5); // ±50% jitter
    Duration::from_millis((delay.as_millis() as f64 * jitter_factor) as u64)
}
