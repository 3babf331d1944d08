//! Retry backoff policy.
//!
//! Delays grow geometrically from an initial value up to a per-delay
//! ceiling. Jobs are additionally bounded by a total retry window counted
//! from first enqueue; the attempt ceiling is derived from that window so
//! a job can never outlive it through backoff sleeps alone.

use std::time::Duration;

use chrono::{DateTime, Utc};

use courier_common::config::QueueConfig;

/// Hard ceiling on derived attempt counts. Only reachable with a
/// degenerate configuration (zero or non-growing delays) whose cumulative
/// backoff never fills the retry window.
const ATTEMPT_CEILING: u32 = 100;

/// Exponential backoff parameters plus the total retry window.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling for a single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Total window during which a job may be retried.
    pub max_retry_window: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::from_queue_config(&QueueConfig::default())
    }
}

impl BackoffConfig {
    /// Derive the policy from the application's queue configuration.
    #[must_use]
    pub fn from_queue_config(config: &QueueConfig) -> Self {
        Self {
            initial_delay: Duration::from_secs(config.initial_backoff_secs),
            max_delay: Duration::from_secs(config.max_backoff_secs),
            multiplier: config.backoff_multiplier,
            max_retry_window: config.max_retry_window(),
        }
    }

    /// The delay preceding `attempt` (1-based; attempt 1 has no delay).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        // powi overflows to infinity for large attempts; 0 * inf is NaN.
        if !secs.is_finite() {
            return self.max_delay;
        }
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// The largest attempt count whose cumulative backoff still fits
    /// inside the retry window, capped so a configuration whose delays
    /// never add up to the window cannot spin this loop forever.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        let mut cumulative = Duration::ZERO;
        let mut attempt = 1;
        while attempt < ATTEMPT_CEILING {
            let next_delay = self.delay_for_attempt(attempt + 1);
            if cumulative + next_delay > self.max_retry_window {
                return attempt;
            }
            cumulative += next_delay;
            attempt += 1;
        }
        attempt
    }

    /// How much of the retry window is left for a job first enqueued at
    /// `enqueued_at`. Zero once the window has closed.
    #[must_use]
    pub fn time_remaining(&self, enqueued_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        let elapsed = (now - enqueued_at).to_std().unwrap_or(Duration::ZERO);
        self.max_retry_window.saturating_sub(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_delays_grow_geometrically_and_cap() {
        let config = BackoffConfig::default();
        assert_eq!(config.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(60));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(120));
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(240));
        // 60 * 2^10 would be ~17 hours; the per-delay cap holds it down.
        assert_eq!(config.delay_for_attempt(12), Duration::from_secs(3_600));
    }

    #[test]
    fn test_max_attempts_respects_window() {
        let config = BackoffConfig::default();
        let attempts = config.max_attempts();

        let mut cumulative = Duration::ZERO;
        for attempt in 2..=attempts {
            cumulative += config.delay_for_attempt(attempt);
        }
        assert!(cumulative <= config.max_retry_window);
        assert!(cumulative + config.delay_for_attempt(attempts + 1) > config.max_retry_window);
    }

    #[test]
    fn test_max_attempts_with_tiny_window() {
        let config = BackoffConfig {
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(3_600),
            multiplier: 2.0,
            max_retry_window: Duration::from_secs(30),
        };
        // The window closes before the first retry is due.
        assert_eq!(config.max_attempts(), 1);
    }

    #[test]
    fn test_max_attempts_bounded_for_non_growing_delays() {
        // Shrinking delays never accumulate past the window; the attempt
        // ceiling keeps the derivation from spinning forever.
        let shrinking = BackoffConfig {
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(3_600),
            multiplier: 0.5,
            max_retry_window: Duration::from_secs(86_400),
        };
        assert_eq!(shrinking.max_attempts(), ATTEMPT_CEILING);

        // A zero initial delay stays zero for every attempt.
        let zero = BackoffConfig {
            initial_delay: Duration::ZERO,
            max_delay: Duration::from_secs(3_600),
            multiplier: 2.0,
            max_retry_window: Duration::from_secs(86_400),
        };
        assert_eq!(zero.delay_for_attempt(200), Duration::ZERO);
        assert_eq!(zero.max_attempts(), ATTEMPT_CEILING);
    }

    #[test]
    fn test_time_remaining_saturates_at_zero() {
        let config = BackoffConfig::default();
        let now = Utc::now();

        let fresh = config.time_remaining(now, now);
        assert_eq!(fresh, config.max_retry_window);

        let old = now - TimeDelta::days(2);
        assert_eq!(config.time_remaining(old, now), Duration::ZERO);

        // A job from the future still reports the whole window.
        let future = now + TimeDelta::hours(1);
        assert_eq!(config.time_remaining(future, now), config.max_retry_window);
    }
}
