//! Error Recovery Engine
//!
//! Executes a provider operation with bounded retries, exponential backoff
//! and escalation down a fallback chain.
//!
//! ```text
//! for provider in [primary, fallback...]:
//!     circuit refuses        -> next provider
//!     for i in 0..retry_attempts:
//!         call (time-bounded, cancellable)
//!         ok                 -> done
//!         fatal              -> stop, surface error
//!         escalate           -> next provider
//!         retryable          -> sleep min(base * mult^i, max), retry
//! all exhausted              -> surface the last real provider error
//! ```
//!
//! Every call goes through the provider's circuit breaker. Cancellation
//! stops the loop and leaves breakers and performance data untouched.

mod backoff;
mod stats;

pub use backoff::BackoffPolicy;
pub use stats::{ProviderSwitch, RecoveryStatistics, SWITCH_HISTORY};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use vgen_kernel::config::RecoverySettings;
use vgen_kernel::{ErrorClass, GenerationError, ProviderError, ProviderErrorKind};

use crate::performance::PerformanceTracker;
use crate::registry::ProviderRegistry;
use stats::{ExecutionOutcome, RecoveryStats};

/// How one logical request is retried and escalated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStrategy {
    /// Calls per provider before moving on; at least 1
    pub retry_attempts: u32,
    pub backoff: BackoffPolicy,
    /// Upper bound on a single provider call
    pub attempt_timeout: Duration,
    /// Providers tried, in order, after the primary is exhausted
    pub fallback_providers: Vec<String>,
}

impl Default for RecoveryStrategy {
    fn default() -> Self {
        Self::from_settings(&RecoverySettings::default())
    }
}

impl RecoveryStrategy {
    pub fn from_settings(settings: &RecoverySettings) -> Self {
        Self {
            retry_attempts: settings.retry_attempts.max(1),
            backoff: BackoffPolicy::from_settings(settings),
            attempt_timeout: Duration::from_millis(settings.attempt_timeout_ms),
            fallback_providers: Vec::new(),
        }
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_fallback_providers(mut self, providers: Vec<String>) -> Self {
        self.fallback_providers = providers;
        self
    }
}

/// Result of one provider invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed {
        kind: ProviderErrorKind,
        class: ErrorClass,
        message: String,
    },
    /// Refused by the circuit breaker; the provider was not contacted
    CircuitRejected,
    Cancelled,
}

/// One provider invocation within a logical request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationAttempt {
    pub provider_id: String,
    /// 0-based attempt index on this provider
    pub retry_index: u32,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub outcome: AttemptOutcome,
}

impl GenerationAttempt {
    /// Whether the provider was actually called
    pub fn reached_provider(&self) -> bool {
        matches!(
            self.outcome,
            AttemptOutcome::Succeeded | AttemptOutcome::Failed { .. }
        )
    }
}

/// Everything that happened while executing one logical request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub attempts: Vec<GenerationAttempt>,
    /// Backoff delays slept, in order
    pub delays: Vec<Duration>,
    pub switches: Vec<ProviderSwitch>,
}

impl RecoveryReport {
    /// Provider calls actually made
    pub fn calls(&self) -> u64 {
        self.attempts.iter().filter(|a| a.reached_provider()).count() as u64
    }

    pub fn retry_count(&self) -> u64 {
        self.calls().saturating_sub(1)
    }
}

#[derive(Debug)]
pub struct Recovered<T> {
    pub value: T,
    /// Provider that produced `value`
    pub provider_id: String,
    pub report: RecoveryReport,
}

#[derive(Debug)]
pub struct RecoveryFailure {
    pub error: GenerationError,
    pub report: RecoveryReport,
}

/// Notified after every attempt, e.g. to feed the performance tracker.
pub trait AttemptObserver: Send + Sync {
    fn on_attempt(&self, attempt: &GenerationAttempt);
}

impl AttemptObserver for PerformanceTracker {
    fn on_attempt(&self, attempt: &GenerationAttempt) {
        match attempt.outcome {
            AttemptOutcome::Succeeded => self.record(&attempt.provider_id, true, attempt.elapsed),
            AttemptOutcome::Failed { .. } => {
                self.record(&attempt.provider_id, false, attempt.elapsed)
            }
            // Neither says anything about the provider's health
            AttemptOutcome::CircuitRejected | AttemptOutcome::Cancelled => {}
        }
    }
}

/// Per-execution inputs besides the strategy.
#[derive(Clone, Copy, Default)]
pub struct RecoveryContext<'a> {
    /// Job id, for logs only
    pub job_id: Option<&'a str>,
    pub cancel: Option<&'a CancellationToken>,
    pub observer: Option<&'a dyn AttemptObserver>,
}

enum CallResult<T> {
    Done(Result<T, ProviderError>),
    Cancelled,
}

/// Retry/fallback executor shared by all requests.
pub struct ErrorRecoveryEngine {
    registry: Arc<ProviderRegistry>,
    stats: RecoveryStats,
}

impl ErrorRecoveryEngine {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            stats: RecoveryStats::default(),
        }
    }

    pub fn recovery_statistics(&self) -> RecoveryStatistics {
        self.stats.snapshot()
    }

    pub fn reset_statistics(&self) {
        self.stats.reset();
    }

    /// Run `operation` against `primary`, then the strategy's fallbacks.
    ///
    /// `operation` receives the provider id to call.
    pub async fn execute_with_recovery<T, F, Fut>(
        &self,
        primary: &str,
        strategy: &RecoveryStrategy,
        ctx: RecoveryContext<'_>,
        operation: F,
    ) -> Result<Recovered<T>, RecoveryFailure>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let result = self.run(primary, strategy, ctx, operation).await;

        let (outcome, report) = match &result {
            Ok(recovered) => (ExecutionOutcome::Succeeded, &recovered.report),
            Err(failure) if matches!(failure.error, GenerationError::Cancelled { .. }) => {
                (ExecutionOutcome::Cancelled, &failure.report)
            }
            Err(failure) => (ExecutionOutcome::Failed, &failure.report),
        };
        self.stats
            .record_execution(outcome, report.calls(), &report.switches);

        result
    }

    async fn run<T, F, Fut>(
        &self,
        primary: &str,
        strategy: &RecoveryStrategy,
        ctx: RecoveryContext<'_>,
        operation: F,
    ) -> Result<Recovered<T>, RecoveryFailure>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let job_id = ctx.job_id.unwrap_or("-");
        let max_attempts = strategy.retry_attempts.max(1);

        let mut chain: Vec<&str> = vec![primary];
        for fallback in &strategy.fallback_providers {
            if !chain.contains(&fallback.as_str()) {
                chain.push(fallback);
            }
        }

        let mut report = RecoveryReport::default();
        let mut last_error: Option<GenerationError> = None;
        let mut circuit_error: Option<GenerationError> = None;
        let mut leave_reason = String::new();

        for (position, provider_id) in chain.iter().copied().enumerate() {
            if position > 0 {
                let switch = ProviderSwitch {
                    from: chain[position - 1].to_string(),
                    to: provider_id.to_string(),
                    reason: std::mem::take(&mut leave_reason),
                    at: Utc::now(),
                };
                info!(
                    job_id,
                    from = %switch.from,
                    to = %switch.to,
                    reason = %switch.reason,
                    "switching provider"
                );
                report.switches.push(switch);
            }

            let breaker = self.registry.get(provider_id).map(|p| p.breaker.clone());

            for retry_index in 0..max_attempts {
                if is_cancelled(&ctx) {
                    return Err(cancelled(job_id, report));
                }

                let span = info_span!(
                    "vgen.recovery_attempt",
                    job_id,
                    provider = provider_id,
                    attempt = retry_index + 1,
                    max_attempts
                );

                let permit = match breaker.as_deref().map(|b| b.try_acquire()).transpose() {
                    Ok(permit) => permit,
                    Err(open) => {
                        debug!(parent: &span, reason = %open, "circuit refused call");
                        let attempt = GenerationAttempt {
                            provider_id: provider_id.to_string(),
                            retry_index,
                            started_at: Utc::now(),
                            elapsed: Duration::ZERO,
                            outcome: AttemptOutcome::CircuitRejected,
                        };
                        notify(&ctx, &attempt);
                        report.attempts.push(attempt);
                        circuit_error = Some(GenerationError::CircuitOpen {
                            provider: provider_id.to_string(),
                        });
                        leave_reason = "circuit open".to_string();
                        break;
                    }
                };

                let started_at = Utc::now();
                let start = Instant::now();
                let call = tokio::time::timeout(strategy.attempt_timeout, operation(provider_id.to_string()));
                let result = async {
                    match ctx.cancel {
                        Some(token) => tokio::select! {
                            biased;
                            _ = token.cancelled() => CallResult::Cancelled,
                            r = call => CallResult::Done(flatten_timeout(r, strategy.attempt_timeout)),
                        },
                        None => CallResult::Done(flatten_timeout(call.await, strategy.attempt_timeout)),
                    }
                }
                .instrument(span.clone())
                .await;
                let elapsed = start.elapsed();

                match result {
                    CallResult::Cancelled => {
                        // The permit is dropped unsettled: no breaker mutation.
                        drop(permit);
                        let attempt = GenerationAttempt {
                            provider_id: provider_id.to_string(),
                            retry_index,
                            started_at,
                            elapsed,
                            outcome: AttemptOutcome::Cancelled,
                        };
                        notify(&ctx, &attempt);
                        report.attempts.push(attempt);
                        return Err(cancelled(job_id, report));
                    }
                    CallResult::Done(Ok(value)) => {
                        if let Some(permit) = permit {
                            permit.succeed();
                        }
                        let attempt = GenerationAttempt {
                            provider_id: provider_id.to_string(),
                            retry_index,
                            started_at,
                            elapsed,
                            outcome: AttemptOutcome::Succeeded,
                        };
                        notify(&ctx, &attempt);
                        report.attempts.push(attempt);
                        if report.calls() > 1 || !report.switches.is_empty() {
                            info!(
                                parent: &span,
                                calls = report.calls(),
                                switches = report.switches.len(),
                                "recovered"
                            );
                        }
                        return Ok(Recovered {
                            value,
                            provider_id: provider_id.to_string(),
                            report,
                        });
                    }
                    CallResult::Done(Err(error)) => {
                        let class = error.class();
                        match (class, permit) {
                            // Bad input says nothing about provider health
                            (ErrorClass::Fatal, permit) => drop(permit),
                            (_, Some(permit)) => permit.fail(),
                            (_, None) => {}
                        }

                        warn!(
                            parent: &span,
                            error = %error,
                            class = ?class,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "provider attempt failed"
                        );
                        let attempt = GenerationAttempt {
                            provider_id: provider_id.to_string(),
                            retry_index,
                            started_at,
                            elapsed,
                            outcome: AttemptOutcome::Failed {
                                kind: error.kind,
                                class,
                                message: error.message.clone(),
                            },
                        };
                        notify(&ctx, &attempt);
                        report.attempts.push(attempt);

                        let retry_after = error.retry_after;
                        let error_text = error.to_string();
                        let error = GenerationError::provider(provider_id, error);
                        if class == ErrorClass::Fatal {
                            return Err(RecoveryFailure { error, report });
                        }
                        last_error = Some(error);

                        match class {
                            ErrorClass::Escalate => {
                                leave_reason = format!("escalated: {error_text}");
                                break;
                            }
                            _ if retry_index + 1 >= max_attempts => {
                                leave_reason = format!(
                                    "retries exhausted after {max_attempts} attempt(s): {error_text}"
                                );
                            }
                            _ => {
                                let delay = strategy.backoff.next_delay(retry_index, retry_after);
                                debug!(
                                    parent: &span,
                                    delay_ms = delay.as_millis() as u64,
                                    "backing off before retry"
                                );
                                report.delays.push(delay);
                                if !sleep_or_cancel(delay, ctx.cancel).await {
                                    return Err(cancelled(job_id, report));
                                }
                            }
                        }
                    }
                }
            }
        }

        let error = last_error.or(circuit_error).unwrap_or_else(|| {
            GenerationError::no_eligible_provider("fallback chain is empty")
        });
        warn!(job_id, error = %error, calls = report.calls(), "fallback chain exhausted");
        Err(RecoveryFailure { error, report })
    }
}

fn flatten_timeout<T>(
    result: Result<Result<T, ProviderError>, tokio::time::error::Elapsed>,
    timeout: Duration,
) -> Result<T, ProviderError> {
    result.unwrap_or_else(|_| Err(ProviderError::timeout(timeout)))
}

fn is_cancelled(ctx: &RecoveryContext<'_>) -> bool {
    ctx.cancel.is_some_and(CancellationToken::is_cancelled)
}

fn cancelled(job_id: &str, report: RecoveryReport) -> RecoveryFailure {
    info!(job_id, "recovery cancelled");
    RecoveryFailure {
        error: GenerationError::Cancelled {
            job_id: job_id.to_string(),
        },
        report,
    }
}

fn notify(ctx: &RecoveryContext<'_>, attempt: &GenerationAttempt) {
    if let Some(observer) = ctx.observer {
        observer.on_attempt(attempt);
    }
}

/// Returns `false` if cancelled during the wait.
async fn sleep_or_cancel(delay: Duration, cancel: Option<&CancellationToken>) -> bool {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        },
        None => {
            tokio::time::sleep(delay).await;
            true
        }
    }
}
