//! Background upkeep owned by the generation service.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vgen_kernel::config::MaintenanceSettings;

use super::inflight::InFlightRegistry;
use crate::performance::PerformanceTracker;

/// Number of providers included in each rollup line
const ROLLUP_TOP: usize = 5;

/// Periodic stale in-flight cleanup and performance rollup logging.
///
/// Started with the service and stopped by `shutdown()`, or when dropped.
#[derive(Debug)]
pub(crate) struct Maintenance {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Maintenance {
    pub(crate) fn start(
        settings: &MaintenanceSettings,
        inflight: Arc<InFlightRegistry>,
        tracker: Arc<PerformanceTracker>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let mut handles = vec![tokio::spawn(cleanup_loop(
            settings.cleanup_interval(),
            settings.stale_after(),
            inflight,
            cancel.clone(),
        ))];
        if let Some(period) = settings.rollup_interval() {
            handles.push(tokio::spawn(rollup_loop(period, tracker, cancel.clone())));
        }
        debug!(tasks = handles.len(), "maintenance started");
        Self { cancel, handles }
    }

    pub(crate) fn stop(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Maintenance {
    fn drop(&mut self) {
        self.cancel.cancel();
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn cleanup_loop(
    period: Duration,
    stale_after: Duration,
    inflight: Arc<InFlightRegistry>,
    cancel: CancellationToken,
) {
    let mut ticker = ticker(period);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let swept = inflight.sweep_stale(stale_after);
                if !swept.is_empty() {
                    warn!(count = swept.len(), jobs = ?swept, "cancelled stale in-flight generations");
                }
            }
        }
    }
}

async fn rollup_loop(period: Duration, tracker: Arc<PerformanceTracker>, cancel: CancellationToken) {
    let mut ticker = ticker(period);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                for perf in tracker.get_top_performing_providers(ROLLUP_TOP) {
                    info!(
                        provider = %perf.provider_id,
                        success_rate = perf.success_rate,
                        recent_success_rate = perf.recent_success_rate,
                        avg_ms = perf.average_response_time_ms,
                        p95_ms = perf.p95_response_time_ms,
                        total = perf.total_requests,
                        "provider performance rollup"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_sweeps_on_interval() {
        let inflight = Arc::new(InFlightRegistry::default());
        let ticket = inflight.register("job-1", None);
        let settings = MaintenanceSettings {
            cleanup_interval_ms: 1_000,
            stale_after_ms: 5_000,
            rollup_interval_ms: 0,
        };
        let maintenance = Maintenance::start(&settings, inflight.clone(), Arc::default());

        tokio::time::sleep(Duration::from_millis(4_500)).await;
        assert!(inflight.contains("job-1"));

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert!(!inflight.contains("job-1"));
        assert!(ticket.cancel.is_cancelled());

        maintenance.stop();
        assert!(maintenance.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_loops() {
        let inflight = Arc::new(InFlightRegistry::default());
        let settings = MaintenanceSettings {
            cleanup_interval_ms: 1_000,
            stale_after_ms: 1,
            rollup_interval_ms: 1_000,
        };
        let maintenance = Maintenance::start(&settings, inflight.clone(), Arc::default());
        maintenance.stop();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let ticket = inflight.register("job-1", None);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(inflight.contains("job-1"));
        assert!(!ticket.cancel.is_cancelled());
    }
}
