//! Circuit Breaker Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use vgen_kernel::config::CircuitSettings;

/// Configuration for one provider's circuit breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Time spent open before a single probe call is admitted
    pub reset_timeout: Duration,
    /// Window over which `window_*` statistics are counted
    pub monitoring_period: Duration,
    /// Whether the circuit breaker is enabled
    pub enabled: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            monitoring_period: Duration::from_secs(60),
            enabled: true,
        }
    }
}

impl CircuitBreakerConfig {
    /// Set the failure threshold
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Set the reset timeout
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    pub fn with_monitoring_period(mut self, period: Duration) -> Self {
        self.monitoring_period = period;
        self
    }

    /// Enable or disable the circuit breaker
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Opens quickly; for noisy or low-value providers
    pub fn strict() -> Self {
        Self {
            failure_threshold: 2,
            reset_timeout: Duration::from_secs(120),
            ..Default::default()
        }
    }

    /// Tolerates bursts; for well-tested primaries
    pub fn lenient() -> Self {
        Self {
            failure_threshold: 10,
            reset_timeout: Duration::from_secs(30),
            ..Default::default()
        }
    }

    /// Never opens
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }
}

impl From<&CircuitSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold.max(1),
            reset_timeout: settings.reset_timeout(),
            monitoring_period: settings.monitoring_period(),
            enabled: true,
        }
    }
}
