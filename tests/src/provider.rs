use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use vgen_kernel::{
    CanonicalStatus, CapabilitySet, GenerationRequest, ProviderDescriptor, ProviderError,
    ProviderHealth, ProviderResult, ProviderSubmission, VideoProvider,
};

/// One scripted reaction to `generate_video`.
#[derive(Debug, Clone)]
pub enum Step {
    /// Accept for asynchronous rendering
    Accept,
    /// Render inline and return this video URL
    Complete(String),
    Fail(ProviderError),
    /// Never answer; exercises attempt timeouts
    Hang,
}

/// A mock provider adapter replaying a queue of scripted outcomes.
///
/// Once the script runs out every call is accepted. Provider job ids are
/// `"{id}-job-{n}"` with `n` counting calls from 1.
#[derive(Clone)]
pub struct ScriptedProvider {
    descriptor: ProviderDescriptor,
    script: Arc<RwLock<VecDeque<Step>>>,
    /// Track every request passed to `generate_video`
    pub call_history: Arc<RwLock<Vec<GenerationRequest>>>,
    statuses: Arc<RwLock<HashMap<String, CanonicalStatus>>>,
    health: Arc<RwLock<ProviderHealth>>,
}

impl ScriptedProvider {
    pub fn new(id: &str, priority: u32) -> Self {
        Self {
            descriptor: ProviderDescriptor::new(id, priority, CapabilitySet::full(600))
                .with_cost_per_second(0.05),
            script: Arc::default(),
            call_history: Arc::default(),
            statuses: Arc::default(),
            health: Arc::new(RwLock::new(ProviderHealth::healthy())),
        }
    }

    pub fn with_max_duration(mut self, seconds: u32) -> Self {
        self.descriptor.capabilities.max_duration_seconds = seconds;
        self
    }

    pub fn with_steps(self, steps: impl IntoIterator<Item = Step>) -> Self {
        // Not shared yet, so the lock is uncontended
        if let Ok(mut script) = self.script.try_write() {
            script.extend(steps);
        }
        self
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    /// Append outcomes to the script.
    pub async fn push_steps(&self, steps: impl IntoIterator<Item = Step>) {
        self.script.write().await.extend(steps);
    }

    /// Status returned by `check_status` for `provider_job_id`.
    pub async fn set_status(&self, provider_job_id: &str, status: CanonicalStatus) {
        self.statuses
            .write()
            .await
            .insert(provider_job_id.to_string(), status);
    }

    pub async fn set_health(&self, health: ProviderHealth) {
        *self.health.write().await = health;
    }

    pub async fn call_count(&self) -> usize {
        self.call_history.read().await.len()
    }

    pub async fn history(&self) -> Vec<GenerationRequest> {
        self.call_history.read().await.clone()
    }

    pub fn into_arc(self) -> Arc<dyn VideoProvider> {
        Arc::new(self)
    }
}

#[async_trait]
impl VideoProvider for ScriptedProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn generate_video(&self, request: &GenerationRequest) -> ProviderResult<ProviderSubmission> {
        let n = {
            let mut history = self.call_history.write().await;
            history.push(request.clone());
            history.len()
        };
        let step = self.script.write().await.pop_front().unwrap_or(Step::Accept);
        let provider_job_id = format!("{}-job-{n}", self.descriptor.id);

        match step {
            Step::Accept => Ok(ProviderSubmission::Accepted { provider_job_id }),
            Step::Complete(video_url) => Ok(ProviderSubmission::Completed {
                provider_job_id,
                video_url,
                thumbnail_url: None,
            }),
            Step::Fail(error) => Err(error),
            Step::Hang => std::future::pending().await,
        }
    }

    async fn check_status(&self, provider_job_id: &str) -> ProviderResult<CanonicalStatus> {
        Ok(self
            .statuses
            .read()
            .await
            .get(provider_job_id)
            .cloned()
            .unwrap_or_else(CanonicalStatus::processing))
    }

    async fn health_check(&self) -> ProviderResult<ProviderHealth> {
        Ok(self.health.read().await.clone())
    }
}

/// Assert how many times a scripted provider was asked to generate.
#[macro_export]
macro_rules! assert_provider_called {
    ($provider:expr, $expected_count:expr) => {
        let count = $provider.call_count().await;
        assert_eq!(
            count,
            $expected_count,
            "Expected provider '{}' to be called {} times, but was called {} times",
            $provider.id(),
            $expected_count,
            count
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use vgen_kernel::ProviderErrorKind;

    #[tokio::test]
    async fn test_script_then_default_accept() {
        let provider = ScriptedProvider::new("alpha", 1).with_steps([
            Step::Fail(ProviderError::network("reset")),
            Step::Complete("https://cdn/a.mp4".into()),
        ]);
        let request = GenerationRequest::new("hello");

        let err = provider.generate_video(&request).await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Network);

        let done = provider.generate_video(&request).await.unwrap();
        assert!(matches!(done, ProviderSubmission::Completed { .. }));

        let later = provider.generate_video(&request).await.unwrap();
        assert_eq!(later.provider_job_id(), "alpha-job-3");
        crate::assert_provider_called!(provider, 3);
    }

    #[tokio::test]
    async fn test_status_and_health() {
        let provider = ScriptedProvider::new("alpha", 1);
        assert_eq!(
            provider.check_status("x").await.unwrap().state,
            vgen_kernel::JobState::Processing
        );
        provider
            .set_status("x", CanonicalStatus::completed("https://cdn/x.mp4"))
            .await;
        assert!(provider.check_status("x").await.unwrap().is_terminal());

        provider.set_health(ProviderHealth::unhealthy("degraded")).await;
        assert!(!provider.health_check().await.unwrap().healthy);
    }
}
