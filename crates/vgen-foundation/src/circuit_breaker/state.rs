//! Circuit Breaker State Machine
//!
//! Three states:
//! - Closed: normal operation, calls pass through
//! - Open: calls are rejected without contacting the provider
//! - Half-Open: exactly one probe call decides between Closed and Open
//!
//! All state lives behind one mutex so each outcome is a single atomic
//! mutation. The lock is never held across an `.await`.
//!
//! Every transition starts a new generation. A [`CallPermit`] remembers the
//! generation it was issued in; outcomes from an earlier generation only
//! feed the counters and the monitoring window. Only the permit admitted by
//! the half-open window decides between Closed and Open.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::CircuitBreakerConfig;
use super::metrics::{CircuitBreakerMetrics, CircuitStatistics, StateTransition};

/// Upper bound on samples kept for window statistics
const MAX_WINDOW_SAMPLES: usize = 4096;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Normal operation - calls are allowed
    Closed,
    /// Circuit is open - calls are rejected
    Open,
    /// Testing recovery - one probe call allowed
    HalfOpen,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Closed => write!(f, "closed"),
            State::Open => write!(f, "open"),
            State::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Returned when a call is refused without reaching the provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Circuit breaker '{name}' is {state}")]
pub struct CircuitOpenError {
    pub name: String,
    pub state: State,
    /// Time until a probe will be admitted, when known
    pub retry_in: Option<Duration>,
}

#[derive(Debug)]
struct Inner {
    state: State,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    opened_at_wall: Option<DateTime<Utc>>,
    last_failure_at: Option<DateTime<Utc>>,
    probe_in_flight: bool,
    /// Bumped on every state transition
    generation: u64,
    /// (when, success) for calls within the monitoring period
    window: VecDeque<(Instant, bool)>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: State::Closed,
            consecutive_failures: 0,
            opened_at: None,
            opened_at_wall: None,
            last_failure_at: None,
            probe_in_flight: false,
            generation: 0,
            window: VecDeque::new(),
        }
    }

    fn reset_timeout_elapsed(&self, timeout: Duration, now: Instant) -> bool {
        self.opened_at
            .map(|opened| now.saturating_duration_since(opened) >= timeout)
            .unwrap_or(true)
    }

    fn push_window(&mut self, now: Instant, success: bool, period: Duration) {
        self.window.push_back((now, success));
        if self.window.len() > MAX_WINDOW_SAMPLES {
            self.window.pop_front();
        }
        self.prune_window(now, period);
    }

    fn prune_window(&mut self, now: Instant, period: Duration) {
        while let Some((at, _)) = self.window.front() {
            if now.saturating_duration_since(*at) > period {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Where a recorded outcome came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// The half-open trial call
    Trial { generation: u64 },
    /// A call admitted while closed
    Call { generation: u64 },
    /// Reported through `record_success` / `record_failure`
    External,
}

impl Origin {
    fn is_current(self, inner: &Inner) -> bool {
        match self {
            Origin::Trial { generation } | Origin::Call { generation } => {
                generation == inner.generation
            }
            Origin::External => true,
        }
    }
}

/// Per-provider circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    metrics: CircuitBreakerMetrics,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner::new()),
            metrics: CircuitBreakerMetrics::new(),
        }
    }

    /// Create with default configuration
    pub fn with_default(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &CircuitBreakerMetrics {
        &self.metrics
    }

    /// Current state. An open circuit whose reset timeout has elapsed is
    /// moved to half-open here.
    pub fn state(&self) -> State {
        let mut inner = self.inner.lock();
        if inner.state == State::Open
            && inner.reset_timeout_elapsed(self.config.reset_timeout, Instant::now())
        {
            self.transition(&mut inner, State::HalfOpen);
        }
        inner.state
    }

    /// Consecutive failures since the last success
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// Whether a call would currently be admitted. Does not reserve the
    /// half-open probe.
    pub fn is_available(&self) -> bool {
        if !self.config.enabled {
            return true;
        }
        let inner = self.inner.lock();
        match inner.state {
            State::Closed => true,
            State::Open => inner.reset_timeout_elapsed(self.config.reset_timeout, Instant::now()),
            State::HalfOpen => !inner.probe_in_flight,
        }
    }

    /// Reserve the right to make one call.
    ///
    /// In half-open state only one permit exists at a time. Dropping the
    /// permit without settling it releases the probe and records nothing,
    /// which is how cancelled calls leave the breaker untouched.
    pub fn try_acquire(&self) -> Result<CallPermit<'_>, CircuitOpenError> {
        if !self.config.enabled {
            return Ok(CallPermit::new(self, Origin::External));
        }

        let now = Instant::now();
        let mut inner = self.inner.lock();

        if inner.state == State::Open
            && inner.reset_timeout_elapsed(self.config.reset_timeout, now)
        {
            self.transition(&mut inner, State::HalfOpen);
        }

        match inner.state {
            State::Closed => Ok(CallPermit::new(
                self,
                Origin::Call {
                    generation: inner.generation,
                },
            )),
            State::HalfOpen if !inner.probe_in_flight => {
                inner.probe_in_flight = true;
                debug!(provider = %self.name, "admitting half-open probe");
                Ok(CallPermit::new(
                    self,
                    Origin::Trial {
                        generation: inner.generation,
                    },
                ))
            }
            state => {
                self.metrics.record_rejected();
                let retry_in = match state {
                    State::Open => inner.opened_at.map(|opened| {
                        self.config
                            .reset_timeout
                            .saturating_sub(now.saturating_duration_since(opened))
                    }),
                    _ => None,
                };
                Err(CircuitOpenError {
                    name: self.name.clone(),
                    state,
                    retry_in,
                })
            }
        }
    }

    /// Record a successful call made outside [`CallPermit`].
    ///
    /// Counts toward the closed-state failure record but never settles a
    /// half-open window; only the half-open permit does that.
    pub fn record_success(&self) {
        self.settle(true, Origin::External);
    }

    /// Record a failed call made outside [`CallPermit`].
    pub fn record_failure(&self) {
        self.settle(false, Origin::External);
    }

    /// Force the circuit closed and clear the failure record.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, State::Closed);
        inner.consecutive_failures = 0;
        inner.window.clear();
        info!(provider = %self.name, "circuit breaker reset");
    }

    pub fn statistics(&self) -> CircuitStatistics {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        if inner.state == State::Open
            && inner.reset_timeout_elapsed(self.config.reset_timeout, now)
        {
            self.transition(&mut inner, State::HalfOpen);
        }
        inner.prune_window(now, self.config.monitoring_period);

        let window_failures = inner.window.iter().filter(|(_, ok)| !ok).count() as u64;
        CircuitStatistics {
            state: inner.state,
            failure_count: inner.consecutive_failures,
            total_successes: self.metrics.total_successes(),
            total_failures: self.metrics.total_failures(),
            rejected_calls: self.metrics.total_rejected(),
            times_opened: self.metrics.times_opened(),
            last_failure_at: inner.last_failure_at,
            opened_at: inner.opened_at_wall,
            window_failures,
            window_requests: inner.window.len() as u64,
        }
    }

    /// Run `operation` under the breaker.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.try_acquire().map_err(CircuitBreakerError::CircuitOpen)?;
        match operation().await {
            Ok(value) => {
                permit.succeed();
                Ok(value)
            }
            Err(error) => {
                permit.fail();
                Err(CircuitBreakerError::OperationError {
                    name: self.name.clone(),
                    error,
                })
            }
        }
    }

    /// Run `operation`, or `fallback` when the circuit refuses the call.
    pub async fn execute_with_fallback<F, Fut, FB, FbFut, T, E>(
        &self,
        operation: F,
        fallback: FB,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce(CircuitOpenError) -> FbFut,
        FbFut: Future<Output = T>,
    {
        match self.execute(operation).await {
            Err(CircuitBreakerError::CircuitOpen(open)) => Ok(fallback(open).await),
            other => other,
        }
    }

    // =========================================================================
    // Private methods
    // =========================================================================

    fn settle(&self, success: bool, origin: Origin) {
        if !self.config.enabled {
            return;
        }
        let mut inner = self.inner.lock();
        if success {
            self.on_success(&mut inner, origin);
        } else {
            self.on_failure(&mut inner, origin);
        }
    }

    fn on_success(&self, inner: &mut Inner, origin: Origin) {
        self.metrics.record_success();
        inner.push_window(Instant::now(), true, self.config.monitoring_period);

        if !origin.is_current(inner) {
            debug!(provider = %self.name, state = %inner.state, "late success from an earlier state, not counted");
            return;
        }
        match inner.state {
            State::Closed => inner.consecutive_failures = 0,
            State::HalfOpen if matches!(origin, Origin::Trial { .. }) => {
                inner.consecutive_failures = 0;
                self.transition(inner, State::Closed);
            }
            State::HalfOpen | State::Open => {}
        }
    }

    fn on_failure(&self, inner: &mut Inner, origin: Origin) {
        self.metrics.record_failure();
        inner.push_window(Instant::now(), false, self.config.monitoring_period);
        inner.last_failure_at = Some(Utc::now());

        if !origin.is_current(inner) {
            debug!(provider = %self.name, state = %inner.state, "late failure from an earlier state, not counted");
            return;
        }
        if inner.state == State::Closed || matches!(origin, Origin::Trial { .. }) {
            inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        }

        match inner.state {
            State::Closed if inner.consecutive_failures >= self.config.failure_threshold => {
                self.transition(inner, State::Open);
            }
            State::Closed => {
                debug!(
                    provider = %self.name,
                    failures = inner.consecutive_failures,
                    threshold = self.config.failure_threshold,
                    "provider failure recorded"
                );
            }
            State::HalfOpen if matches!(origin, Origin::Trial { .. }) => {
                self.transition(inner, State::Open)
            }
            State::HalfOpen | State::Open => {}
        }
    }

    fn release_probe(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.generation == generation {
            inner.probe_in_flight = false;
        }
    }

    fn transition(&self, inner: &mut Inner, to: State) {
        let from = inner.state;
        if from == to {
            return;
        }

        inner.state = to;
        inner.generation = inner.generation.wrapping_add(1);
        inner.probe_in_flight = false;
        match to {
            State::Open => {
                inner.opened_at = Some(Instant::now());
                inner.opened_at_wall = Some(Utc::now());
                warn!(
                    provider = %self.name,
                    from = %from,
                    failures = inner.consecutive_failures,
                    reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
                    "circuit opened"
                );
            }
            State::HalfOpen => {
                info!(provider = %self.name, "circuit half-open, awaiting probe");
            }
            State::Closed => {
                inner.opened_at = None;
                inner.opened_at_wall = None;
                info!(provider = %self.name, from = %from, "circuit closed");
            }
        }

        self.metrics.record_transition(StateTransition::new(from, to));
    }
}

/// Admission to make one call through a [`CircuitBreaker`].
#[must_use = "a permit must be settled with succeed() or fail()"]
#[derive(Debug)]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    origin: Origin,
    settled: bool,
}

impl<'a> CallPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, origin: Origin) -> Self {
        Self {
            breaker,
            origin,
            settled: false,
        }
    }

    /// Whether this permit is the half-open probe
    pub fn is_probe(&self) -> bool {
        matches!(self.origin, Origin::Trial { .. })
    }

    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.settle(true, self.origin);
    }

    pub fn fail(mut self) {
        self.settled = true;
        self.breaker.settle(false, self.origin);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if let (false, Origin::Trial { generation }) = (self.settled, self.origin) {
            debug!(provider = %self.breaker.name, "half-open probe abandoned");
            self.breaker.release_probe(generation);
        }
    }
}

/// Circuit breaker error types
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error(transparent)]
    CircuitOpen(CircuitOpenError),

    #[error("Operation error in circuit breaker '{name}'")]
    OperationError { name: String, error: E },
}

impl<E> CircuitBreakerError<E> {
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::OperationError { error, .. } => Some(error),
            Self::CircuitOpen(_) => None,
        }
    }
}
