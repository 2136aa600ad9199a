//! Notifier implementations.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{trace, warn};
use vgen_kernel::{CanonicalStatus, NotifyError, StatusNotifier};

/// Default broadcast buffer; slow subscribers lag rather than block senders
pub const DEFAULT_CAPACITY: usize = 256;

/// One terminal status change, as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub job_id: String,
    pub status: CanonicalStatus,
}

/// Fans terminal status changes out to every live subscriber, e.g. the
/// websocket sessions of a client-facing server.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<StatusEvent>,
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl StatusNotifier for BroadcastNotifier {
    async fn notify(&self, job_id: &str, status: &CanonicalStatus) -> Result<(), NotifyError> {
        let event = StatusEvent {
            job_id: job_id.to_string(),
            status: status.clone(),
        };
        // No subscribers is not an error
        match self.sender.send(event) {
            Ok(receivers) => trace!(job_id, receivers, "status broadcast"),
            Err(_) => trace!(job_id, "status broadcast with no subscribers"),
        }
        Ok(())
    }
}

/// Deliver `status` in the background; failures are logged, never returned.
pub(crate) fn notify_detached(
    notifier: &Arc<dyn StatusNotifier>,
    job_id: &str,
    status: &CanonicalStatus,
) {
    let notifier = notifier.clone();
    let job_id = job_id.to_string();
    let status = status.clone();
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&job_id, &status).await {
            warn!(job_id = %job_id, state = %status.state, error = %e, "status notification failed");
        }
    });
}

/// Discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl StatusNotifier for NoopNotifier {
    async fn notify(&self, _job_id: &str, _status: &CanonicalStatus) -> Result<(), NotifyError> {
        Ok(())
    }
}
