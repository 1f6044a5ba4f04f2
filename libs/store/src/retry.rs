//! Backoff policy for version-conflict retries.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with jitter, bounded by count and total time.
///
/// The delay before retry `n` (0-based) is `min_delay * factor^n`, scaled by
/// a uniform random factor in `[1, 2)` when `randomize` is set and capped at
/// `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Growth factor between consecutive delays.
    pub factor: f64,

    /// Delay before the first retry (before jitter).
    pub min_delay: Duration,

    /// Upper bound on a single delay.
    pub max_delay: Option<Duration>,

    /// Maximum number of retries after the first attempt.
    pub retries: u32,

    /// Total time budget; a retry that would end past it is not taken.
    pub max_elapsed: Duration,

    /// Whether to apply jitter.
    pub randomize: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            factor: 1.2,
            min_delay: Duration::from_millis(100),
            max_delay: None,
            retries: 5,
            max_elapsed: Duration::from_secs(15),
            randomize: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn never() -> Self {
        Self {
            retries: 0,
            ..Default::default()
        }
    }

    /// Load overrides from `AGGSTORE_RETRY_*` environment variables.
    ///
    /// Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let retries = env_parse("AGGSTORE_RETRY_RETRIES").unwrap_or(defaults.retries);

        let factor = env_parse::<f64>("AGGSTORE_RETRY_FACTOR")
            .filter(|f| f.is_finite() && *f >= 1.0)
            .unwrap_or(defaults.factor);

        let min_delay = env_parse("AGGSTORE_RETRY_MIN_DELAY_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.min_delay);

        let max_delay = env_parse("AGGSTORE_RETRY_MAX_DELAY_MS")
            .map(Duration::from_millis)
            .or(defaults.max_delay);

        let max_elapsed = env_parse("AGGSTORE_RETRY_MAX_ELAPSED_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.max_elapsed);

        Self {
            factor,
            min_delay,
            max_delay,
            retries,
            max_elapsed,
            ..defaults
        }
    }

    /// Calculate the delay before retry `retry` (0-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let base = self.min_delay.as_secs_f64() * self.factor.powi(exponent);
        let jitter = if self.randomize {
            rand::rng().random_range(1.0..2.0)
        } else {
            1.0
        };

        let ceiling = self
            .max_delay
            .unwrap_or(self.max_elapsed)
            .as_secs_f64();
        let secs = (base * jitter).min(ceiling);
        let delay = if secs.is_finite() && secs >= 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            self.min_delay
        };

        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    /// Delay before retry `retry`, or `None` once the count or time budget
    /// is spent.
    pub fn next_delay(&self, retry: u32, elapsed: Duration) -> Option<Duration> {
        if retry >= self.retries {
            return None;
        }
        let delay = self.delay(retry);
        if elapsed + delay > self.max_elapsed {
            return None;
        }
        Some(delay)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn fixed() -> RetryPolicy {
        RetryPolicy {
            randomize: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retries, 5);
        assert_eq!(policy.min_delay, Duration::from_millis(100));
        assert_eq!(policy.max_elapsed, Duration::from_secs(15));
        assert!((policy.factor - 1.2).abs() < f64::EPSILON);
    }

    #[rstest]
    #[case(0, 100)]
    #[case(1, 120)]
    #[case(2, 144)]
    #[case(3, 172)]
    fn test_delay_without_jitter(#[case] retry: u32, #[case] expected_ms: u128) {
        let delay = fixed().delay(retry);
        assert!(delay.as_millis().abs_diff(expected_ms) <= 1, "{delay:?}");
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();
        for retry in 0..5 {
            let base = fixed().delay(retry);
            for _ in 0..50 {
                let delay = policy.delay(retry);
                assert!(delay >= base);
                assert!(delay < base * 2);
            }
        }
    }

    #[test]
    fn test_max_delay_caps() {
        let policy = RetryPolicy {
            factor: 10.0,
            max_delay: Some(Duration::from_millis(250)),
            ..fixed()
        };
        assert_eq!(policy.delay(4), Duration::from_millis(250));
    }

    #[test]
    fn test_retry_count_budget() {
        let policy = fixed();
        assert!(policy.next_delay(4, Duration::ZERO).is_some());
        assert!(policy.next_delay(5, Duration::ZERO).is_none());
        assert!(RetryPolicy::never().next_delay(0, Duration::ZERO).is_none());
    }

    #[test]
    fn test_elapsed_budget() {
        let policy = RetryPolicy {
            max_elapsed: Duration::from_millis(150),
            ..fixed()
        };
        assert!(policy.next_delay(0, Duration::from_millis(10)).is_some());
        assert!(policy.next_delay(0, Duration::from_millis(60)).is_none());
    }
}
