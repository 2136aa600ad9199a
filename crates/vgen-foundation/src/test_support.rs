//! In-crate fixtures for unit tests.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use vgen_kernel::config::ProviderSettings;
use vgen_kernel::{
    CanonicalStatus, CapabilitySet, GenerationRequest, ProviderDescriptor, ProviderError,
    ProviderErrorKind, ProviderResult, ProviderSubmission, VideoProvider,
};

/// Adapter that accepts every request asynchronously.
pub struct StaticProvider {
    descriptor: ProviderDescriptor,
    fail_initialize: bool,
    generate_error: Option<ProviderError>,
    inline_url: Option<String>,
    calls: AtomicU32,
}

impl StaticProvider {
    pub fn new(id: &str, priority: u32) -> Self {
        Self {
            descriptor: ProviderDescriptor::new(id, priority, CapabilitySet::full(600)),
            fail_initialize: false,
            generate_error: None,
            inline_url: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn arc(id: &str, priority: u32) -> Arc<dyn VideoProvider> {
        Arc::new(Self::new(id, priority))
    }

    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.descriptor.capabilities = capabilities;
        self
    }

    pub fn with_cost_per_second(mut self, cost: f64) -> Self {
        self.descriptor.cost_per_second = cost;
        self
    }

    pub fn failing_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    /// Every `generate_video` call fails with `error`.
    pub fn failing_with(mut self, error: ProviderError) -> Self {
        self.generate_error = Some(error);
        self
    }

    /// Render synchronously, returning `url`.
    pub fn inline(mut self, url: &str) -> Self {
        self.inline_url = Some(url.to_string());
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn into_arc(self) -> Arc<dyn VideoProvider> {
        Arc::new(self)
    }
}

#[async_trait]
impl VideoProvider for StaticProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn initialize(&self, _settings: &ProviderSettings) -> ProviderResult<()> {
        if self.fail_initialize {
            return Err(ProviderError::new(
                ProviderErrorKind::Authentication,
                "missing api key",
            ));
        }
        Ok(())
    }

    async fn generate_video(&self, _request: &GenerationRequest) -> ProviderResult<ProviderSubmission> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(error) = &self.generate_error {
            return Err(error.clone());
        }
        let provider_job_id = format!("{}-job-{n}", self.descriptor.id);
        Ok(match &self.inline_url {
            Some(url) => ProviderSubmission::Completed {
                provider_job_id,
                video_url: url.clone(),
                thumbnail_url: None,
            },
            None => ProviderSubmission::Accepted { provider_job_id },
        })
    }

    async fn check_status(&self, provider_job_id: &str) -> ProviderResult<CanonicalStatus> {
        Ok(CanonicalStatus::processing().with_provider(self.descriptor.id.clone(), provider_job_id))
    }
}
