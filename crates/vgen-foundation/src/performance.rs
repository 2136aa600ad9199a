//! Provider Performance Tracker
//!
//! Rolling per-provider reliability and latency statistics. The data is
//! advisory: it steers provider selection and is lost with the process.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Latency at which the speed score is 0.5
pub const REFERENCE_LATENCY_MS: f64 = 30_000.0;

/// Map a mean response time to a speed score in `(0, 1]`.
pub fn speed_score(average_response_time_ms: f64) -> f64 {
    REFERENCE_LATENCY_MS / (REFERENCE_LATENCY_MS + average_response_time_ms.max(0.0))
}

/// Tracker tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Samples kept per provider for the recent-window figures
    pub window_size: usize,
    /// Share of the composite score given to success rate; the rest is speed
    pub reliability_weight: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            window_size: 100,
            reliability_weight: 0.7,
        }
    }
}

/// One recorded provider invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub provider_id: String,
    pub success: bool,
    pub response_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Summary of a provider's observed behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderPerformance {
    pub provider_id: String,
    /// successes / total over the provider's lifetime
    pub success_rate: f64,
    /// Running mean
    pub average_response_time_ms: f64,
    pub total_requests: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_updated: DateTime<Utc>,
    /// Success rate over the recent window
    pub recent_success_rate: f64,
    pub p95_response_time_ms: u64,
    /// Reliability-weighted blend of success rate and speed
    pub composite_score: f64,
}

#[derive(Debug)]
struct ProviderStats {
    total_requests: u64,
    success_count: u64,
    mean_response_ms: f64,
    last_updated: DateTime<Utc>,
    recent: VecDeque<PerformanceSample>,
}

impl ProviderStats {
    fn new() -> Self {
        Self {
            total_requests: 0,
            success_count: 0,
            mean_response_ms: 0.0,
            last_updated: Utc::now(),
            recent: VecDeque::new(),
        }
    }

    fn record(&mut self, sample: PerformanceSample, window_size: usize) {
        self.total_requests += 1;
        if sample.success {
            self.success_count += 1;
        }
        let n = self.total_requests as f64;
        self.mean_response_ms += (sample.response_time_ms as f64 - self.mean_response_ms) / n;
        self.last_updated = sample.timestamp;

        if window_size > 0 {
            if self.recent.len() == window_size {
                self.recent.pop_front();
            }
            self.recent.push_back(sample);
        }
    }

    fn summary(&self, provider_id: &str, config: &TrackerConfig) -> ProviderPerformance {
        let success_rate = if self.total_requests == 0 {
            0.0
        } else {
            self.success_count as f64 / self.total_requests as f64
        };

        let recent_success_rate = if self.recent.is_empty() {
            success_rate
        } else {
            self.recent.iter().filter(|s| s.success).count() as f64 / self.recent.len() as f64
        };

        let mut latencies: Vec<u64> = self.recent.iter().map(|s| s.response_time_ms).collect();
        latencies.sort_unstable();
        let p95_response_time_ms = if latencies.is_empty() {
            0
        } else {
            let rank = ((latencies.len() as f64) * 0.95).ceil() as usize;
            latencies[rank.clamp(1, latencies.len()) - 1]
        };

        let composite_score = config.reliability_weight * success_rate
            + (1.0 - config.reliability_weight) * speed_score(self.mean_response_ms);

        ProviderPerformance {
            provider_id: provider_id.to_string(),
            success_rate,
            average_response_time_ms: self.mean_response_ms,
            total_requests: self.total_requests,
            success_count: self.success_count,
            failure_count: self.total_requests - self.success_count,
            last_updated: self.last_updated,
            recent_success_rate,
            p95_response_time_ms,
            composite_score,
        }
    }
}

/// Per-provider performance registry.
///
/// Each provider's aggregates sit in their own map shard entry, so
/// concurrent updates for the same provider serialize on that entry and
/// never lose a sample.
#[derive(Debug, Default)]
pub struct PerformanceTracker {
    config: TrackerConfig,
    providers: DashMap<String, ProviderStats>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TrackerConfig) -> Self {
        Self {
            config,
            providers: DashMap::new(),
        }
    }

    pub fn record_request(&self, provider_id: &str, success: bool, response_time_ms: u64) {
        let sample = PerformanceSample {
            provider_id: provider_id.to_string(),
            success,
            response_time_ms,
            timestamp: Utc::now(),
        };
        self.providers
            .entry(provider_id.to_string())
            .or_insert_with(ProviderStats::new)
            .record(sample, self.config.window_size);
    }

    /// Convenience wrapper taking a [`Duration`].
    pub fn record(&self, provider_id: &str, success: bool, elapsed: Duration) {
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.record_request(provider_id, success, ms);
    }

    /// `None` if the provider has never been recorded.
    pub fn get_performance(&self, provider_id: &str) -> Option<ProviderPerformance> {
        self.providers
            .get(provider_id)
            .map(|stats| stats.summary(provider_id, &self.config))
    }

    /// Providers ordered by composite score, best first. Ties resolve by id.
    pub fn get_top_performing_providers(&self, limit: usize) -> Vec<ProviderPerformance> {
        let mut all = self.snapshot();
        all.sort_by(|a, b| {
            b.composite_score
                .total_cmp(&a.composite_score)
                .then_with(|| a.provider_id.cmp(&b.provider_id))
        });
        all.truncate(limit);
        all
    }

    /// Clear one provider's history, or everyone's with `None`.
    pub fn reset_performance_data(&self, provider_id: Option<&str>) {
        match provider_id {
            Some(id) => {
                self.providers.remove(id);
            }
            None => self.providers.clear(),
        }
    }

    /// Every tracked provider, in no particular order.
    pub fn snapshot(&self) -> Vec<ProviderPerformance> {
        self.providers
            .iter()
            .map(|entry| entry.value().summary(entry.key(), &self.config))
            .collect()
    }

    /// Recent samples of one provider, oldest first.
    pub fn recent_samples(&self, provider_id: &str) -> Vec<PerformanceSample> {
        self.providers
            .get(provider_id)
            .map(|stats| stats.recent.iter().cloned().collect())
            .unwrap_or_default()
    }
}
