//! Circuit Breaker Metrics
//!
//! Lifetime counters and the recent transition history of one breaker.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use super::state::State;

/// Number of transitions kept per breaker
pub const TRANSITION_HISTORY: usize = 32;

/// State transition event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: State,
    pub to_state: State,
    /// Milliseconds since Unix epoch
    pub timestamp_ms: i64,
}

impl StateTransition {
    pub fn new(from_state: State, to_state: State) -> Self {
        Self {
            from_state,
            to_state,
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }
}

/// Lifetime counters. The state machine itself lives in [`super::CircuitBreaker`].
#[derive(Debug, Default)]
pub struct CircuitBreakerMetrics {
    total_successes: AtomicU64,
    total_failures: AtomicU64,
    /// Calls refused while open or while a probe was in flight
    total_rejected: AtomicU64,
    times_opened: AtomicU64,
    transitions: RwLock<VecDeque<StateTransition>>,
}

impl CircuitBreakerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.total_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transition(&self, transition: StateTransition) {
        if transition.to_state == State::Open {
            self.times_opened.fetch_add(1, Ordering::Relaxed);
        }

        let mut transitions = self.transitions.write();
        if transitions.len() == TRANSITION_HISTORY {
            transitions.pop_front();
        }
        transitions.push_back(transition);
    }

    pub fn total_successes(&self) -> u64 {
        self.total_successes.load(Ordering::Relaxed)
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures.load(Ordering::Relaxed)
    }

    pub fn total_rejected(&self) -> u64 {
        self.total_rejected.load(Ordering::Relaxed)
    }

    pub fn times_opened(&self) -> u64 {
        self.times_opened.load(Ordering::Relaxed)
    }

    /// Oldest first
    pub fn transitions(&self) -> Vec<StateTransition> {
        self.transitions.read().iter().cloned().collect()
    }
}

/// Read-only snapshot exposed to health dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitStatistics {
    pub state: State,
    /// Consecutive failures since the last success
    pub failure_count: u32,
    pub total_successes: u64,
    pub total_failures: u64,
    pub rejected_calls: u64,
    pub times_opened: u64,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    /// Failures within the monitoring period
    pub window_failures: u64,
    /// Calls within the monitoring period
    pub window_requests: u64,
}

impl CircuitStatistics {
    /// Failure ratio within the monitoring period, 0.0 when idle
    pub fn window_failure_rate(&self) -> f64 {
        if self.window_requests == 0 {
            0.0
        } else {
            self.window_failures as f64 / self.window_requests as f64
        }
    }
}
