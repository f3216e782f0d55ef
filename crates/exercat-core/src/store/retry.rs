//! Bounded retry with exponential backoff and jitter for store operations.
//!
//! The catalog is a local file another process may briefly lock. Busy and
//! locked errors are retried a few times; anything else surfaces at once.

use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::StoreConfig;

/// Backoff schedule for busy store transactions. The delay doubles per
/// retry, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total tries, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Scale each delay by a random factor in `0.5..1.5`.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: StoreConfig::BUSY_RETRY_ATTEMPTS,
            base_delay: StoreConfig::BUSY_RETRY_BASE_DELAY,
            max_delay: StoreConfig::BUSY_RETRY_MAX_DELAY,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Wait before the retry that follows failed try `attempt` (0-indexed).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let cap = self.max_delay.as_secs_f64();
        let doubled = self.base_delay.as_secs_f64() * 2f64.powi(attempt.min(30) as i32);
        let mut secs = doubled.min(cap);
        if self.jitter {
            secs = (secs * rand::rng().random_range(0.5..1.5)).min(cap);
        }
        Duration::from_secs_f64(secs)
    }
}

/// What happened across the tries of one operation.
#[derive(Debug, Clone, Default)]
pub struct RetryStats {
    pub attempts: u32,
    pub total_delay: Duration,
    pub success: bool,
    pub last_error: Option<String>,
}

/// Run `operation` until it succeeds, fails with an error `should_retry`
/// rejects, or runs out of attempts. Blocks the thread between tries.
pub fn retry_blocking<F, T, E>(
    config: &RetryConfig,
    operation: F,
    should_retry: impl Fn(&E) -> bool,
) -> (Result<T, E>, RetryStats)
where
    F: FnMut() -> Result<T, E>,
    E: std::fmt::Display,
{
    retry_with_sleep(config, operation, should_retry, std::thread::sleep)
}

fn retry_with_sleep<F, T, E>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: impl Fn(&E) -> bool,
    mut sleep: impl FnMut(Duration),
) -> (Result<T, E>, RetryStats)
where
    F: FnMut() -> Result<T, E>,
    E: std::fmt::Display,
{
    let limit = config.max_attempts.max(1);
    let mut stats = RetryStats::default();
    let mut attempt = 0;

    loop {
        stats.attempts = attempt + 1;
        let err = match operation() {
            Ok(value) => {
                if attempt > 0 {
                    debug!("Store transaction went through on try {}", stats.attempts);
                }
                stats.success = true;
                return (Ok(value), stats);
            }
            Err(err) => err,
        };
        stats.last_error = Some(err.to_string());

        if !should_retry(&err) {
            return (Err(err), stats);
        }
        if stats.attempts >= limit {
            warn!("Store still busy after {} tries: {}", limit, err);
            return (Err(err), stats);
        }

        let delay = config.calculate_delay(attempt);
        warn!(
            "Store busy ({}/{}), retrying in {:?}: {}",
            stats.attempts, limit, delay, err
        );
        stats.total_delay += delay;
        sleep(delay);
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_calculation_no_jitter() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_millis(100))
            .with_jitter(false);

        assert_eq!(config.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(config.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(config.calculate_delay(2), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(3))
            .with_jitter(false);

        assert_eq!(config.calculate_delay(5), Duration::from_secs(3));
    }

    #[test]
    fn test_delay_with_jitter_stays_in_range() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(10));

        for _ in 0..20 {
            let delay = config.calculate_delay(0);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1500));
        }
    }

    #[test]
    fn test_retry_until_success() {
        let config = RetryConfig::new().with_max_attempts(4).with_jitter(false);
        let mut calls = 0;
        let mut slept = Vec::new();

        let (result, stats) = retry_with_sleep(
            &config,
            || {
                calls += 1;
                if calls < 3 {
                    Err("busy")
                } else {
                    Ok(calls)
                }
            },
            |_| true,
            |d| slept.push(d),
        );

        assert_eq!(result, Ok(3));
        assert_eq!(stats.attempts, 3);
        assert!(stats.success);
        assert_eq!(slept.len(), 2);
    }

    #[test]
    fn test_non_retryable_error_stops_immediately() {
        let config = RetryConfig::new().with_max_attempts(4);
        let mut calls = 0;

        let (result, stats): (Result<(), &str>, _) = retry_with_sleep(
            &config,
            || {
                calls += 1;
                Err("constraint failed")
            },
            |_| false,
            |_| panic!("should not sleep"),
        );

        assert!(result.is_err());
        assert_eq!(calls, 1);
        assert_eq!(stats.attempts, 1);
    }

    #[test]
    fn test_attempts_exhausted() {
        let config = RetryConfig::new().with_max_attempts(3).with_jitter(false);
        let (result, stats): (Result<(), &str>, _) =
            retry_with_sleep(&config, || Err("busy"), |_| true, |_| {});

        assert_eq!(result, Err("busy"));
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.last_error.as_deref(), Some("busy"));
    }
}
