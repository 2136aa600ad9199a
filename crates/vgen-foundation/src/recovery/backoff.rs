//! Exponential backoff between attempts on the same provider.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use vgen_kernel::config::RecoverySettings;

/// `delay(i) = min(base_delay * multiplier^i, max_delay)`, plus optional jitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Upper bound of a uniformly random extra delay; zero disables jitter
    pub jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: Duration::ZERO,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            base_delay,
            multiplier,
            max_delay,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn from_settings(settings: &RecoverySettings) -> Self {
        Self {
            base_delay: Duration::from_millis(settings.base_delay_ms),
            multiplier: settings.backoff_multiplier,
            max_delay: Duration::from_millis(settings.max_delay_ms),
            jitter: Duration::from_millis(settings.jitter_ms),
        }
    }

    /// Deterministic delay after the failed attempt with 0-based index `retry_index`.
    pub fn delay(&self, retry_index: u32) -> Duration {
        let exponent = i32::try_from(retry_index).unwrap_or(i32::MAX);
        let nanos = self.base_delay.as_nanos() as f64 * self.multiplier.max(1.0).powi(exponent);
        if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(nanos.round() as u64)
    }

    /// Delay actually slept: the backoff, raised to the provider's
    /// `retry_after` when that is longer, capped at `max_delay`, plus jitter.
    pub fn next_delay(&self, retry_index: u32, retry_after: Option<Duration>) -> Duration {
        let mut delay = self.delay(retry_index);
        if let Some(retry_after) = retry_after {
            delay = delay.max(retry_after).min(self.max_delay);
        }
        delay + self.sample_jitter()
    }

    fn sample_jitter(&self) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        use rand::Rng;
        let max_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}
