//! In-memory [`JobStore`], the default when no durable store is injected.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use vgen_kernel::{CanonicalStatus, JobMapping, JobStore, StatusUpdate, StoreError, StoreResult};

/// Job records kept for the life of the process.
///
/// Mappings are write-once: saving a second, different mapping for the same
/// internal id or provider job id is a conflict.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    mappings: DashMap<String, JobMapping>,
    /// `(provider id, provider job id)` -> internal id
    by_provider_job: DashMap<(String, String), String>,
    statuses: DashMap<String, CanonicalStatus>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_count(&self) -> usize {
        self.statuses.len()
    }

    /// Drop everything known about `internal_id`.
    pub fn remove_job(&self, internal_id: &str) -> bool {
        let mapping = self.mappings.remove(internal_id);
        if let Some((_, mapping)) = &mapping {
            self.by_provider_job.remove(&(
                mapping.provider_id.clone(),
                mapping.provider_job_id.clone(),
            ));
        }
        let status = self.statuses.remove(internal_id);
        mapping.is_some() || status.is_some()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn save_job_mapping(&self, mapping: JobMapping) -> StoreResult<()> {
        let key = (mapping.provider_id.clone(), mapping.provider_job_id.clone());
        match self.by_provider_job.entry(key) {
            Entry::Occupied(existing) if existing.get() != &mapping.internal_id => {
                return Err(StoreError::Conflict(format!(
                    "provider job {}/{} already mapped to {}",
                    mapping.provider_id,
                    mapping.provider_job_id,
                    existing.get()
                )));
            }
            Entry::Occupied(_) => {}
            Entry::Vacant(slot) => {
                slot.insert(mapping.internal_id.clone());
            }
        }
        self.mappings.insert(mapping.internal_id.clone(), mapping);
        Ok(())
    }

    async fn get_job_mapping(&self, internal_id: &str) -> StoreResult<Option<JobMapping>> {
        Ok(self.mappings.get(internal_id).map(|m| m.clone()))
    }

    async fn find_by_provider_job(
        &self,
        provider_id: &str,
        provider_job_id: &str,
    ) -> StoreResult<Option<JobMapping>> {
        let key = (provider_id.to_string(), provider_job_id.to_string());
        let Some(internal_id) = self.by_provider_job.get(&key).map(|id| id.clone()) else {
            return Ok(None);
        };
        Ok(self.mappings.get(&internal_id).map(|m| m.clone()))
    }

    async fn update_job_status(
        &self,
        internal_id: &str,
        status: CanonicalStatus,
    ) -> StoreResult<()> {
        self.statuses.insert(internal_id.to_string(), status);
        Ok(())
    }

    async fn get_job_status(&self, internal_id: &str) -> StoreResult<Option<CanonicalStatus>> {
        Ok(self.statuses.get(internal_id).map(|s| s.clone()))
    }

    // Check and write under the shard lock.
    async fn apply_status_update(
        &self,
        internal_id: &str,
        status: CanonicalStatus,
    ) -> StoreResult<StatusUpdate> {
        match self.statuses.entry(internal_id.to_string()) {
            Entry::Occupied(current) if current.get().is_terminal() => Ok(StatusUpdate::Ignored {
                current: current.get().clone(),
            }),
            Entry::Occupied(mut current) => {
                current.insert(status);
                Ok(StatusUpdate::Applied)
            }
            Entry::Vacant(slot) => {
                slot.insert(status);
                Ok(StatusUpdate::Applied)
            }
        }
    }
}
