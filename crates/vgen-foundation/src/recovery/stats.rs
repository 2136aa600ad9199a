//! Recovery statistics, used to tune retry and breaker thresholds.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Number of provider switches kept for inspection
pub const SWITCH_HISTORY: usize = 50;

/// One move down the fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSwitch {
    pub from: String,
    pub to: String,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Snapshot returned by `recovery_statistics()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStatistics {
    pub total_executions: u64,
    /// Provider calls actually made
    pub total_attempts: u64,
    pub first_try_successes: u64,
    /// Succeeded only after at least one retry or provider switch
    pub successful_recoveries: u64,
    pub failed_recoveries: u64,
    pub cancelled: u64,
    pub provider_switches: u64,
    /// Retries per execution (calls beyond the first)
    pub average_retry_count: f64,
    /// Oldest first
    pub recent_switches: Vec<ProviderSwitch>,
}

/// How one execution ended, for accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecutionOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Default)]
struct Counters {
    total_executions: u64,
    total_attempts: u64,
    total_retries: u64,
    first_try_successes: u64,
    successful_recoveries: u64,
    failed_recoveries: u64,
    cancelled: u64,
    provider_switches: u64,
    recent_switches: VecDeque<ProviderSwitch>,
}

#[derive(Debug, Default)]
pub(crate) struct RecoveryStats {
    counters: Mutex<Counters>,
}

impl RecoveryStats {
    pub(crate) fn record_execution(
        &self,
        outcome: ExecutionOutcome,
        calls: u64,
        switches: &[ProviderSwitch],
    ) {
        let mut c = self.counters.lock();
        c.total_executions += 1;
        c.total_attempts += calls;
        c.total_retries += calls.saturating_sub(1);

        match outcome {
            ExecutionOutcome::Succeeded if calls <= 1 && switches.is_empty() => {
                c.first_try_successes += 1
            }
            ExecutionOutcome::Succeeded => c.successful_recoveries += 1,
            ExecutionOutcome::Failed => c.failed_recoveries += 1,
            ExecutionOutcome::Cancelled => c.cancelled += 1,
        }

        c.provider_switches += switches.len() as u64;
        for switch in switches {
            if c.recent_switches.len() == SWITCH_HISTORY {
                c.recent_switches.pop_front();
            }
            c.recent_switches.push_back(switch.clone());
        }
    }

    pub(crate) fn snapshot(&self) -> RecoveryStatistics {
        let c = self.counters.lock();
        RecoveryStatistics {
            total_executions: c.total_executions,
            total_attempts: c.total_attempts,
            first_try_successes: c.first_try_successes,
            successful_recoveries: c.successful_recoveries,
            failed_recoveries: c.failed_recoveries,
            cancelled: c.cancelled,
            provider_switches: c.provider_switches,
            average_retry_count: if c.total_executions == 0 {
                0.0
            } else {
                c.total_retries as f64 / c.total_executions as f64
            },
            recent_switches: c.recent_switches.iter().cloned().collect(),
        }
    }

    pub(crate) fn reset(&self) {
        *self.counters.lock() = Counters::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn switch(n: usize) -> ProviderSwitch {
        ProviderSwitch {
            from: format!("p{n}"),
            to: format!("p{}", n + 1),
            reason: "retries exhausted".into(),
            at: Utc::now(),
        }
    }

    #[test]
    fn test_outcome_accounting() {
        let stats = RecoveryStats::default();
        stats.record_execution(ExecutionOutcome::Succeeded, 1, &[]);
        stats.record_execution(ExecutionOutcome::Succeeded, 3, &[switch(0)]);
        stats.record_execution(ExecutionOutcome::Failed, 2, &[]);
        stats.record_execution(ExecutionOutcome::Cancelled, 0, &[]);

        let snap = stats.snapshot();
        assert_eq!(snap.total_executions, 4);
        assert_eq!(snap.total_attempts, 6);
        assert_eq!(snap.first_try_successes, 1);
        assert_eq!(snap.successful_recoveries, 1);
        assert_eq!(snap.failed_recoveries, 1);
        assert_eq!(snap.cancelled, 1);
        assert_eq!(snap.provider_switches, 1);
        // retries: 0 + 2 + 1 + 0
        assert!((snap.average_retry_count - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_switch_history_is_bounded() {
        let stats = RecoveryStats::default();
        let switches: Vec<_> = (0..SWITCH_HISTORY + 10).map(switch).collect();
        stats.record_execution(ExecutionOutcome::Failed, 1, &switches);

        let snap = stats.snapshot();
        assert_eq!(snap.provider_switches, (SWITCH_HISTORY + 10) as u64);
        assert_eq!(snap.recent_switches.len(), SWITCH_HISTORY);
        assert_eq!(snap.recent_switches[0].from, "p10");

        stats.reset();
        assert_eq!(stats.snapshot().total_executions, 0);
    }
}
