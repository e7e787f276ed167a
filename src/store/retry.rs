use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Configuration for retry behavior against the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per remote call, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay in milliseconds for exponential backoff.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound for a single computed backoff delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Randomise each delay within its upper half.
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl RetryConfig {
    /// Calculate the delay for a given retry attempt using exponential backoff.
    /// delay = min(max_delay_ms, base_delay_ms * 2^(attempt - 1))
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let exp = attempt.saturating_sub(1).min(32);
        self.base_delay_ms
            .saturating_mul(2u64.saturating_pow(exp))
            .min(self.max_delay_ms)
    }

    /// How long to wait after `attempt` failed with `err`.
    ///
    /// A rate-limit response never waits less than the advertised
    /// `retry_after_ms`, even when that exceeds `max_delay_ms`.
    pub fn backoff(&self, attempt: u32, err: &StoreError) -> Duration {
        let ceiling = self.delay_for_attempt(attempt);
        let mut delay = if self.jitter && ceiling > 1 {
            rand::rng().random_range(ceiling / 2..=ceiling)
        } else {
            ceiling
        };
        if let StoreError::RateLimited { retry_after_ms } = err {
            delay = delay.max(*retry_after_ms);
        }
        Duration::from_millis(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryConfig {
        RetryConfig {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 5000,
            jitter: false,
        }
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let config = no_jitter();
        assert_eq!(config.delay_for_attempt(1), 1000);
        assert_eq!(config.delay_for_attempt(2), 2000);
        assert_eq!(config.delay_for_attempt(3), 4000);
        assert_eq!(config.delay_for_attempt(4), 5000);
        assert_eq!(config.delay_for_attempt(60), 5000);
    }

    #[test]
    fn jitter_stays_within_upper_half() {
        let config = RetryConfig {
            jitter: true,
            ..no_jitter()
        };
        let err = StoreError::Transient("reset".into());
        for _ in 0..100 {
            let d = config.backoff(2, &err).as_millis() as u64;
            assert!((1000..=2000).contains(&d), "delay {d} out of range");
        }
    }

    #[test]
    fn retry_after_is_a_floor() {
        let config = no_jitter();
        let err = StoreError::RateLimited {
            retry_after_ms: 9000,
        };
        assert_eq!(config.backoff(1, &err), Duration::from_millis(9000));
        let err = StoreError::RateLimited { retry_after_ms: 10 };
        assert_eq!(config.backoff(1, &err), Duration::from_millis(1000));
    }

    #[test]
    fn default_values() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_delay_ms, 500);
        assert_eq!(config.max_delay_ms, 30_000);
        assert!(config.jitter);
    }
}
