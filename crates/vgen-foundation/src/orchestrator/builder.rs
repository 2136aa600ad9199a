use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};
use vgen_kernel::config::{ConfigError, OrchestratorConfig};
use vgen_kernel::{JobStore, SecretSource, StatusNotifier, VideoProvider};

use super::inflight::InFlightRegistry;
use super::maintenance::Maintenance;
use super::service::GenerationService;
use crate::notify::NoopNotifier;
use crate::performance::{PerformanceTracker, TrackerConfig};
use crate::recovery::ErrorRecoveryEngine;
use crate::registry::{ProviderRegistry, RegistryError};
use crate::selection::SelectionEngine;
use crate::store::InMemoryJobStore;
use crate::webhook::{StaticSecretSource, WebhookIngestor};

#[derive(Debug, Error)]
pub enum ServiceBuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("At least one provider must be registered")]
    NoProviders,
}

/// Assembles a [`GenerationService`] from its collaborators.
///
/// Only providers are required. The job store defaults to
/// [`InMemoryJobStore`], the notifier to [`NoopNotifier`] and the secret
/// source to a [`StaticSecretSource`] built from `config.webhooks`.
pub struct GenerationServiceBuilder {
    config: OrchestratorConfig,
    providers: Vec<Arc<dyn VideoProvider>>,
    store: Option<Arc<dyn JobStore>>,
    notifier: Option<Arc<dyn StatusNotifier>>,
    secrets: Option<Arc<dyn SecretSource>>,
    tracker_config: TrackerConfig,
    maintenance: bool,
}

impl Default for GenerationServiceBuilder {
    fn default() -> Self {
        Self::new(OrchestratorConfig::default())
    }
}

impl GenerationServiceBuilder {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            providers: Vec::new(),
            store: None,
            notifier: None,
            secrets: None,
            tracker_config: TrackerConfig::default(),
            maintenance: true,
        }
    }

    pub fn provider(mut self, provider: Arc<dyn VideoProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn providers(mut self, providers: impl IntoIterator<Item = Arc<dyn VideoProvider>>) -> Self {
        self.providers.extend(providers);
        self
    }

    pub fn job_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn StatusNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn secret_source(mut self, secrets: Arc<dyn SecretSource>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    pub fn tracker_config(mut self, config: TrackerConfig) -> Self {
        self.tracker_config = config;
        self
    }

    /// Whether to spawn the background maintenance tasks (default: true).
    pub fn maintenance(mut self, enabled: bool) -> Self {
        self.maintenance = enabled;
        self
    }

    pub fn build(self) -> Result<GenerationService, ServiceBuildError> {
        self.config.validate()?;
        if self.providers.is_empty() {
            return Err(ServiceBuildError::NoProviders);
        }

        let registry = Arc::new(ProviderRegistry::from_config(self.providers, &self.config)?);
        let tracker = Arc::new(PerformanceTracker::with_config(self.tracker_config));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryJobStore::new()));
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(NoopNotifier));
        let secrets = self
            .secrets
            .unwrap_or_else(|| Arc::new(StaticSecretSource::from_config(&self.config)));
        let webhooks = WebhookIngestor::new(secrets, store.clone(), notifier.clone())
            .with_retryability_from(&self.config)
            .with_provider_ids(registry.ids());
        let inflight = Arc::new(InFlightRegistry::default());

        let maintenance = if !self.maintenance {
            None
        } else if tokio::runtime::Handle::try_current().is_ok() {
            Some(Maintenance::start(
                &self.config.maintenance,
                inflight.clone(),
                tracker.clone(),
            ))
        } else {
            warn!("no tokio runtime at build time, background maintenance disabled");
            None
        };

        info!(providers = ?registry.ids(), "generation service ready");
        Ok(GenerationService {
            selection: SelectionEngine::new(self.config.selection.clone()),
            recovery: ErrorRecoveryEngine::new(registry.clone()),
            registry,
            tracker,
            store,
            notifier,
            webhooks,
            inflight,
            maintenance: Mutex::new(maintenance),
            config: self.config,
        })
    }
}
