//! Job store collaborator.
//!
//! Job metadata is owned by an external durable store. The orchestrator and
//! webhook ingestion only read and write through [`JobStore`].

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{CanonicalStatus, JobMapping};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("Job store unavailable: {0}")]
    Unavailable(String),

    #[error("Conflicting job record: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a guarded status update.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Applied,
    /// The job was already terminal; the stored status is returned unchanged
    Ignored { current: CanonicalStatus },
}

impl StatusUpdate {
    pub fn is_applied(&self) -> bool {
        matches!(self, StatusUpdate::Applied)
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist the correlation between an internal id and a provider job id.
    async fn save_job_mapping(&self, mapping: JobMapping) -> StoreResult<()>;

    /// Look up a mapping by internal id.
    async fn get_job_mapping(&self, internal_id: &str) -> StoreResult<Option<JobMapping>>;

    /// Resolve a provider-native job id back to its mapping.
    async fn find_by_provider_job(
        &self,
        provider_id: &str,
        provider_job_id: &str,
    ) -> StoreResult<Option<JobMapping>>;

    /// Unconditionally write the latest status.
    async fn update_job_status(&self, internal_id: &str, status: CanonicalStatus)
    -> StoreResult<()>;

    async fn get_job_status(&self, internal_id: &str) -> StoreResult<Option<CanonicalStatus>>;

    /// Write `status` unless the stored status is already terminal.
    ///
    /// The default implementation reads then writes. Stores that can do a
    /// conditional write should override it so concurrent updates cannot
    /// slip in between.
    async fn apply_status_update(
        &self,
        internal_id: &str,
        status: CanonicalStatus,
    ) -> StoreResult<StatusUpdate> {
        if let Some(current) = self.get_job_status(internal_id).await? {
            if current.is_terminal() {
                return Ok(StatusUpdate::Ignored { current });
            }
        }
        self.update_job_status(internal_id, status).await?;
        Ok(StatusUpdate::Applied)
    }
}
