//! Orchestrator configuration schema.
//!
//! Every field has a default so a partial file (or none at all) yields a
//! working configuration. Durations are expressed in milliseconds in files
//! and exposed as [`Duration`] through accessor methods.
//!
//! ```toml
//! [default_circuit]
//! failure_threshold = 5
//! reset_timeout_ms = 60000
//!
//! [providers.primary]
//! failure_threshold = 3
//!
//! [recovery]
//! retry_attempts = 2
//! base_delay_ms = 500
//!
//! [webhooks.primary]
//! secret = "${PRIMARY_WEBHOOK_SECRET}"
//! signature_header = "x-primary-signature"
//! dialect = "primary"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use super::{ConfigError, ConfigResult};

/// Top-level configuration for the generation service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Breaker settings for providers without their own override
    pub default_circuit: CircuitSettings,
    /// Per-provider overrides, keyed by provider id
    pub providers: HashMap<String, ProviderSettings>,
    pub recovery: RecoverySettings,
    pub selection: SelectionWeights,
    /// Webhook validation material, keyed by provider id
    pub webhooks: HashMap<String, WebhookProviderConfig>,
    pub maintenance: MaintenanceSettings,
}

impl OrchestratorConfig {
    /// Effective breaker settings for `provider_id`.
    pub fn circuit_for(&self, provider_id: &str) -> CircuitSettings {
        match self.providers.get(provider_id) {
            Some(overrides) => overrides.apply_to(&self.default_circuit),
            None => self.default_circuit.clone(),
        }
    }

    pub fn provider_settings(&self, provider_id: &str) -> ProviderSettings {
        self.providers.get(provider_id).cloned().unwrap_or_default()
    }

    /// Reject values that would make the engines misbehave.
    pub fn validate(&self) -> ConfigResult<()> {
        self.default_circuit.validate("default_circuit")?;
        for (id, settings) in &self.providers {
            settings
                .apply_to(&self.default_circuit)
                .validate(&format!("providers.{id}"))?;
        }
        self.recovery.validate()?;
        self.selection.validate()?;
        for (id, hook) in &self.webhooks {
            hook.validate(id)?;
        }
        self.maintenance.validate()?;
        Ok(())
    }
}

/// Circuit breaker tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitSettings {
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    /// Window over which breaker statistics are counted
    pub monitoring_period_ms: u64,
}

impl Default for CircuitSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
            monitoring_period_ms: 60_000,
        }
    }
}

impl CircuitSettings {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn monitoring_period(&self) -> Duration {
        Duration::from_millis(self.monitoring_period_ms)
    }

    fn validate(&self, path: &str) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid(format!(
                "{path}.failure_threshold must be at least 1"
            )));
        }
        if self.monitoring_period_ms == 0 {
            return Err(ConfigError::Invalid(format!(
                "{path}.monitoring_period_ms must be positive"
            )));
        }
        Ok(())
    }
}

/// Per-provider settings. Unset breaker fields fall back to `default_circuit`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub failure_threshold: Option<u32>,
    pub reset_timeout_ms: Option<u64>,
    pub monitoring_period_ms: Option<u64>,
    /// Adapter-specific options (endpoints, account ids), passed to `initialize`
    pub options: HashMap<String, String>,
}

impl ProviderSettings {
    fn apply_to(&self, defaults: &CircuitSettings) -> CircuitSettings {
        CircuitSettings {
            failure_threshold: self.failure_threshold.unwrap_or(defaults.failure_threshold),
            reset_timeout_ms: self.reset_timeout_ms.unwrap_or(defaults.reset_timeout_ms),
            monitoring_period_ms: self
                .monitoring_period_ms
                .unwrap_or(defaults.monitoring_period_ms),
        }
    }
}

/// Retry and fallback tuning for the recovery engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    /// Attempts per provider before switching to the next one
    pub retry_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
    /// Upper bound on a single provider call
    pub attempt_timeout_ms: u64,
    /// Random extra delay added to each backoff, 0 disables
    pub jitter_ms: u64,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            base_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
            attempt_timeout_ms: 120_000,
            jitter_ms: 0,
        }
    }
}

impl RecoverySettings {
    fn validate(&self) -> ConfigResult<()> {
        if self.retry_attempts == 0 {
            return Err(ConfigError::Invalid(
                "recovery.retry_attempts must be at least 1".into(),
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "recovery.backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ConfigError::Invalid(
                "recovery.max_delay_ms must not be below base_delay_ms".into(),
            ));
        }
        if self.attempt_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "recovery.attempt_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Weights of the provider scoring function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionWeights {
    pub priority: f64,
    pub reliability: f64,
    pub speed: f64,
    /// Flat bonus for the caller's preferred provider
    pub preferred_bonus: f64,
    /// Multiplier on the speed weight for high-urgency requests
    pub urgent_speed_factor: f64,
}

impl Default for SelectionWeights {
    fn default() -> Self {
        Self {
            priority: 0.30,
            reliability: 0.50,
            speed: 0.20,
            preferred_bonus: 0.25,
            urgent_speed_factor: 2.0,
        }
    }
}

impl SelectionWeights {
    fn validate(&self) -> ConfigResult<()> {
        let weights = [
            ("priority", self.priority),
            ("reliability", self.reliability),
            ("speed", self.speed),
            ("preferred_bonus", self.preferred_bonus),
            ("urgent_speed_factor", self.urgent_speed_factor),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "selection.{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Payload vocabulary a provider uses for its callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadDialect {
    /// `queued / processing / completed / failed`, unix-second timestamps
    #[default]
    Primary,
    /// `pending / processing / succeeded / failed`, RFC 3339 timestamps
    Secondary,
}

/// Webhook validation settings for one provider.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookProviderConfig {
    pub secret: String,
    pub signature_header: String,
    pub timestamp_tolerance_seconds: u64,
    pub dialect: PayloadDialect,
    /// Provider error codes worth re-triggering generation for
    pub retryable_error_codes: Vec<String>,
    pub non_retryable_error_codes: Vec<String>,
    /// Classification for codes in neither list
    pub default_retryable: bool,
}

impl Default for WebhookProviderConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            signature_header: "x-signature".to_string(),
            timestamp_tolerance_seconds: 300,
            dialect: PayloadDialect::default(),
            retryable_error_codes: Vec::new(),
            non_retryable_error_codes: Vec::new(),
            default_retryable: false,
        }
    }
}

impl fmt::Debug for WebhookProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookProviderConfig")
            .field("secret", &"<redacted>")
            .field("signature_header", &self.signature_header)
            .field(
                "timestamp_tolerance_seconds",
                &self.timestamp_tolerance_seconds,
            )
            .field("dialect", &self.dialect)
            .field("retryable_error_codes", &self.retryable_error_codes)
            .field("non_retryable_error_codes", &self.non_retryable_error_codes)
            .field("default_retryable", &self.default_retryable)
            .finish()
    }
}

impl WebhookProviderConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ..Default::default()
        }
    }

    pub fn with_signature_header(mut self, header: impl Into<String>) -> Self {
        self.signature_header = header.into();
        self
    }

    pub fn with_dialect(mut self, dialect: PayloadDialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_tolerance_seconds(mut self, seconds: u64) -> Self {
        self.timestamp_tolerance_seconds = seconds;
        self
    }

    pub fn with_retryable_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retryable_error_codes = codes.into_iter().map(Into::into).collect();
        self
    }

    pub fn timestamp_tolerance(&self) -> Duration {
        Duration::from_secs(self.timestamp_tolerance_seconds)
    }

    fn validate(&self, provider: &str) -> ConfigResult<()> {
        if self.secret.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "webhooks.{provider}.secret must not be empty"
            )));
        }
        if self.signature_header.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "webhooks.{provider}.signature_header must not be empty"
            )));
        }
        if let Some(code) = self
            .retryable_error_codes
            .iter()
            .find(|code| self.non_retryable_error_codes.contains(code))
        {
            return Err(ConfigError::Invalid(format!(
                "webhooks.{provider}: error code '{code}' is listed as both retryable and non-retryable"
            )));
        }
        Ok(())
    }
}

/// Background maintenance schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceSettings {
    pub cleanup_interval_ms: u64,
    /// In-flight entries older than this are swept
    pub stale_after_ms: u64,
    /// Interval of the performance summary log, 0 disables
    pub rollup_interval_ms: u64,
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        Self {
            cleanup_interval_ms: 60_000,
            stale_after_ms: 15 * 60_000,
            rollup_interval_ms: 5 * 60_000,
        }
    }
}

impl MaintenanceSettings {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }

    pub fn rollup_interval(&self) -> Option<Duration> {
        (self.rollup_interval_ms > 0).then(|| Duration::from_millis(self.rollup_interval_ms))
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.cleanup_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "maintenance.cleanup_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}
