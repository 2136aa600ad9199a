//! Config-backed [`SecretSource`] with in-place rotation.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::info;
use vgen_kernel::config::{OrchestratorConfig, WebhookProviderConfig};
use vgen_kernel::{SecretSource, WebhookSecret};

#[derive(Debug, Default)]
pub struct StaticSecretSource {
    secrets: RwLock<HashMap<String, WebhookSecret>>,
}

fn to_secret(config: &WebhookProviderConfig) -> WebhookSecret {
    WebhookSecret {
        secret: config.secret.clone(),
        signature_header: config.signature_header.to_ascii_lowercase(),
        timestamp_tolerance: config.timestamp_tolerance(),
        dialect: config.dialect,
    }
}

impl StaticSecretSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        let secrets = config
            .webhooks
            .iter()
            .map(|(provider, webhook)| (provider.to_ascii_lowercase(), to_secret(webhook)))
            .collect();
        Self {
            secrets: RwLock::new(secrets),
        }
    }

    pub fn insert(&self, provider: &str, config: &WebhookProviderConfig) {
        self.secrets
            .write()
            .insert(provider.to_ascii_lowercase(), to_secret(config));
    }

    /// Replace a provider's secret, keeping its header and tolerance.
    ///
    /// Returns `false` if the provider has no webhook configuration.
    pub fn rotate_secret(&self, provider: &str, secret: impl Into<String>) -> bool {
        let mut secrets = self.secrets.write();
        match secrets.get_mut(&provider.to_ascii_lowercase()) {
            Some(entry) => {
                entry.secret = secret.into();
                info!(provider, "webhook secret rotated");
                true
            }
            None => false,
        }
    }

    pub fn providers(&self) -> Vec<String> {
        let mut providers: Vec<_> = self.secrets.read().keys().cloned().collect();
        providers.sort();
        providers
    }
}

impl SecretSource for StaticSecretSource {
    fn webhook_secret(&self, provider: &str) -> Option<WebhookSecret> {
        self.secrets
            .read()
            .get(&provider.to_ascii_lowercase())
            .cloned()
    }
}
