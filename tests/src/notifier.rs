use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use vgen_kernel::{CanonicalStatus, JobState, NotifyError, StatusNotifier};

/// Records every notification; optionally fails them all.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<RwLock<Vec<(String, CanonicalStatus)>>>,
    arrived: Arc<Notify>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every call errors, after recording.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub async fn events(&self) -> Vec<(String, CanonicalStatus)> {
        self.events.read().await.clone()
    }

    pub async fn states_for(&self, job_id: &str) -> Vec<JobState> {
        self.events
            .read()
            .await
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, status)| status.state)
            .collect()
    }

    /// Wait until at least `count` notifications arrived. Notifications are
    /// delivered from spawned tasks, so tests wait rather than assert
    /// immediately.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let waited = tokio::time::timeout(timeout, async {
            loop {
                let notified = self.arrived.notified();
                if self.events.read().await.len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await;
        waited.is_ok()
    }
}

#[async_trait]
impl StatusNotifier for RecordingNotifier {
    async fn notify(&self, job_id: &str, status: &CanonicalStatus) -> Result<(), NotifyError> {
        self.events
            .write()
            .await
            .push((job_id.to_string(), status.clone()));
        self.arrived.notify_waiters();
        if self.fail {
            return Err(NotifyError("notification channel down".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_for_spawned_notifications() {
        let notifier = RecordingNotifier::new();
        let sender = notifier.clone();
        tokio::spawn(async move {
            sender
                .notify("job-1", &CanonicalStatus::completed("https://cdn/v.mp4"))
                .await
                .unwrap();
        });

        assert!(notifier.wait_for(1, Duration::from_secs(1)).await);
        assert_eq!(notifier.states_for("job-1").await, vec![JobState::Completed]);
    }

    #[tokio::test]
    async fn test_failing_notifier_still_records() {
        let notifier = RecordingNotifier::failing();
        assert!(notifier.notify("job-1", &CanonicalStatus::cancelled()).await.is_err());
        assert_eq!(notifier.events().await.len(), 1);
    }
}
