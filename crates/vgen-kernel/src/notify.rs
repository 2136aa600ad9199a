//! Notification collaborator, informed of terminal status changes.
//!
//! Notification is fire-and-forget: a failing notifier never fails the
//! generation it reports on.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::CanonicalStatus;

#[derive(Debug, Clone, Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait StatusNotifier: Send + Sync {
    async fn notify(&self, job_id: &str, status: &CanonicalStatus) -> Result<(), NotifyError>;
}
