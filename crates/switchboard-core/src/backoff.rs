//! Reconnect backoff.
//!
//! - [`BackoffConfig`]: base/max delay, jitter, optional attempt cap
//! - [`calculate_backoff_delay`]: `min(max, base * 2^attempt)` with ±jitter
//! - [`Backoff`]: attempt counter driving the formula

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.3;

/// Backoff parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackoffConfig {
    /// Delay before the first retry, in ms.
    pub base_delay_ms: u64,
    /// Upper bound on the un-jittered delay, in ms.
    pub max_delay_ms: u64,
    /// Symmetric jitter fraction (0.3 = ±30%).
    pub jitter_factor: f64,
    /// Give up after this many consecutive failures (`None` = never).
    pub max_attempts: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
            max_attempts: None,
        }
    }
}

/// Exponential backoff delay with explicit randomness.
///
/// `attempt` is zero-based. `random` should be in `[0.0, 1.0)`; it maps to
/// a multiplier in `[1 - jitter, 1 + jitter]`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn calculate_backoff_delay(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(max_delay_ms);

    let jitter = 1.0 + (random * 2.0 - 1.0) * jitter_factor;
    ((capped as f64) * jitter).round().max(0.0) as u64
}

/// Attempt counter for one reconnecting connection.
#[derive(Clone, Debug)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    /// Fresh counter.
    #[must_use]
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Consecutive failures since the last reset.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether the attempt cap has been exceeded.
    #[must_use]
    pub fn exhausted(&self) -> bool {
        self.config
            .max_attempts
            .is_some_and(|max| self.attempt >= max)
    }

    /// Delay before the next retry; advances the counter.
    pub fn next_delay(&mut self, random: f64) -> Duration {
        let ms = calculate_backoff_delay(
            self.attempt,
            self.config.base_delay_ms,
            self.config.max_delay_ms,
            self.config.jitter_factor,
            random,
        );
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis(ms)
    }

    /// Back to attempt 0 after a healthy connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn exponential_growth_without_jitter() {
        let delays: Vec<u64> = (0..4)
            .map(|a| calculate_backoff_delay(a, 500, 30_000, 0.0, 0.5))
            .collect();
        assert_eq!(delays, vec![500, 1000, 2000, 4000]);
    }

    #[test]
    fn caps_at_max() {
        assert_eq!(calculate_backoff_delay(10, 500, 30_000, 0.0, 0.0), 30_000);
        assert_eq!(calculate_backoff_delay(200, 500, 30_000, 0.0, 0.0), 30_000);
    }

    #[test]
    fn jitter_bounds() {
        assert_eq!(calculate_backoff_delay(0, 1000, 30_000, 0.3, 0.0), 700);
        assert_eq!(calculate_backoff_delay(0, 1000, 30_000, 0.3, 0.5), 1000);
        assert_eq!(calculate_backoff_delay(0, 1000, 30_000, 0.3, 1.0), 1300);
    }

    #[test]
    fn counter_advances_and_resets() {
        let mut backoff = Backoff::new(BackoffConfig {
            jitter_factor: 0.0,
            ..BackoffConfig::default()
        });
        assert_eq!(backoff.next_delay(0.5), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(0.5), Duration::from_millis(1000));
        assert_eq!(backoff.attempt(), 2);
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(0.5), Duration::from_millis(500));
    }

    #[test]
    fn exhaustion_respects_cap() {
        let mut backoff = Backoff::new(BackoffConfig {
            max_attempts: Some(2),
            ..BackoffConfig::default()
        });
        assert!(!backoff.exhausted());
        let _ = backoff.next_delay(0.5);
        let _ = backoff.next_delay(0.5);
        assert!(backoff.exhausted());

        let unlimited = Backoff::new(BackoffConfig::default());
        assert!(!unlimited.exhausted());
    }

    #[test]
    fn config_serde_defaults() {
        let config: BackoffConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, BackoffConfig::default());
    }

    proptest! {
        #[test]
        fn unjittered_delay_is_monotonic_and_bounded(
            attempt in 0u32..64,
            base in 1u64..10_000,
            max in 10_000u64..120_000,
        ) {
            let here = calculate_backoff_delay(attempt, base, max, 0.0, 0.5);
            let next = calculate_backoff_delay(attempt + 1, base, max, 0.0, 0.5);
            prop_assert!(here <= next);
            prop_assert!(next <= max);
        }

        #[test]
        fn jittered_delay_stays_within_band(
            attempt in 0u32..40,
            random in 0.0f64..1.0,
            jitter in 0.0f64..=1.0,
        ) {
            let capped = calculate_backoff_delay(attempt, 500, 30_000, 0.0, 0.5);
            let delay = calculate_backoff_delay(attempt, 500, 30_000, jitter, random);
            #[allow(clippy::cast_precision_loss)]
            let (lo, hi) = (capped as f64 * (1.0 - jitter), capped as f64 * (1.0 + jitter));
            #[allow(clippy::cast_precision_loss)]
            let d = delay as f64;
            prop_assert!(d >= lo.floor() && d <= hi.ceil());
        }
    }
}
