//! Provider registry.
//!
//! Owns every registered adapter together with its circuit breaker. It is
//! constructed explicitly and injected; there is no global provider list.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use vgen_kernel::config::OrchestratorConfig;
use vgen_kernel::{ProviderDescriptor, ProviderError, VideoProvider};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Provider '{0}' is already registered")]
    DuplicateProvider(String),

    #[error("Provider id must not be empty")]
    EmptyId,
}

/// An adapter and the breaker guarding it.
#[derive(Clone)]
pub struct RegisteredProvider {
    pub adapter: Arc<dyn VideoProvider>,
    pub breaker: Arc<CircuitBreaker>,
}

impl RegisteredProvider {
    pub fn id(&self) -> &str {
        self.adapter.id()
    }

    pub fn descriptor(&self) -> &ProviderDescriptor {
        self.adapter.descriptor()
    }
}

impl std::fmt::Debug for RegisteredProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredProvider")
            .field("id", &self.id())
            .field("state", &self.breaker.state())
            .finish()
    }
}

/// Registered providers in registration order.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: Vec<RegisteredProvider>,
    index: HashMap<String, usize>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every adapter with breaker settings from `config`.
    pub fn from_config(
        adapters: impl IntoIterator<Item = Arc<dyn VideoProvider>>,
        config: &OrchestratorConfig,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for adapter in adapters {
            let breaker_config = CircuitBreakerConfig::from(&config.circuit_for(adapter.id()));
            registry.register(adapter, breaker_config)?;
        }
        Ok(registry)
    }

    pub fn register(
        &mut self,
        adapter: Arc<dyn VideoProvider>,
        breaker_config: CircuitBreakerConfig,
    ) -> Result<(), RegistryError> {
        let id = adapter.id().to_string();
        if id.trim().is_empty() {
            return Err(RegistryError::EmptyId);
        }
        // Webhook callbacks name providers case-insensitively
        if self.index.keys().any(|known| known.eq_ignore_ascii_case(&id)) {
            return Err(RegistryError::DuplicateProvider(id));
        }

        info!(
            provider = %id,
            priority = adapter.descriptor().priority,
            failure_threshold = breaker_config.failure_threshold,
            "registering provider"
        );
        let breaker = Arc::new(CircuitBreaker::new(id.clone(), breaker_config));
        self.index.insert(id, self.providers.len());
        self.providers.push(RegisteredProvider { adapter, breaker });
        Ok(())
    }

    pub fn get(&self, provider_id: &str) -> Option<&RegisteredProvider> {
        self.index.get(provider_id).map(|&i| &self.providers[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredProvider> {
        self.providers.iter()
    }

    pub fn ids(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Call `initialize` on every adapter. Returns the providers that failed;
    /// they stay registered so their breakers can record later failures.
    pub async fn initialize_all(&self, config: &OrchestratorConfig) -> Vec<(String, ProviderError)> {
        let mut failures = Vec::new();
        for provider in &self.providers {
            let settings = config.provider_settings(provider.id());
            if let Err(e) = provider.adapter.initialize(&settings).await {
                warn!(provider = %provider.id(), error = %e, "provider initialization failed");
                failures.push((provider.id().to_string(), e));
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StaticProvider;
    use vgen_kernel::config::ProviderSettings;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ProviderRegistry::new();
        registry
            .register(StaticProvider::arc("a", 1), CircuitBreakerConfig::default())
            .unwrap();
        registry
            .register(StaticProvider::arc("b", 2), CircuitBreakerConfig::default())
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(registry.get("b").unwrap().descriptor().priority, 2);
        assert!(registry.get("c").is_none());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut registry = ProviderRegistry::new();
        registry
            .register(StaticProvider::arc("a", 1), CircuitBreakerConfig::default())
            .unwrap();
        let err = registry
            .register(StaticProvider::arc("a", 2), CircuitBreakerConfig::default())
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateProvider("a".into()));
    }

    #[test]
    fn test_ids_differing_only_in_case_rejected() {
        let mut registry = ProviderRegistry::new();
        registry
            .register(StaticProvider::arc("alpha", 1), CircuitBreakerConfig::default())
            .unwrap();
        let err = registry
            .register(StaticProvider::arc("Alpha", 2), CircuitBreakerConfig::default())
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateProvider("Alpha".into()));
    }

    #[test]
    fn test_from_config_applies_per_provider_breaker_settings() {
        let mut config = OrchestratorConfig::default();
        config.providers.insert(
            "noisy".into(),
            ProviderSettings {
                failure_threshold: Some(2),
                ..Default::default()
            },
        );

        let registry = ProviderRegistry::from_config(
            [StaticProvider::arc("noisy", 2), StaticProvider::arc("primary", 1)],
            &config,
        )
        .unwrap();

        assert_eq!(registry.get("noisy").unwrap().breaker.config().failure_threshold, 2);
        assert_eq!(registry.get("primary").unwrap().breaker.config().failure_threshold, 5);
    }

    #[tokio::test]
    async fn test_initialize_all_reports_failures() {
        let registry = ProviderRegistry::from_config(
            [
                StaticProvider::arc("a", 1),
                Arc::new(StaticProvider::new("b", 2).failing_initialize()) as Arc<dyn VideoProvider>,
            ],
            &OrchestratorConfig::default(),
        )
        .unwrap();

        let failures = registry.initialize_all(&OrchestratorConfig::default()).await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "b");
        assert_eq!(registry.len(), 2);
    }
}
