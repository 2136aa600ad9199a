use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{Instrument, debug, info, info_span, warn};
use vgen_kernel::config::OrchestratorConfig;
use vgen_kernel::{CanonicalStatus, JobStore, SecretSource, StatusNotifier, StatusUpdate, StoreError};

use super::payload::{ProviderEvent, RetryabilityTable};
use super::signature::verify_signature;
use crate::notify::notify_detached;

/// Header map with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookHeaders {
    inner: HashMap<String, String>,
}

impl WebhookHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.inner
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for WebhookHeaders {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// How far an inbound call got: `received -> validated -> mapped -> applied`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStage {
    Received,
    Validated,
    Mapped,
    Applied,
}

/// What happened to a valid, mapped event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Applied,
    /// The job was already terminal; nothing changed
    AlreadyTerminal,
    /// No job mapping for the provider job id; dropped
    NoMapping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookReceipt {
    pub provider: String,
    pub provider_job_id: String,
    /// Internal job id, when the provider job id resolved
    pub job_id: Option<String>,
    pub stage: WebhookStage,
    pub disposition: Disposition,
    /// Status mapped from this event, or the stored status when the job was
    /// already terminal
    pub status: CanonicalStatus,
}

/// Rejections. None of these touch job state.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("No webhook configuration for provider '{0}'")]
    UnknownProvider(String),

    #[error("Missing signature header '{header}'")]
    MissingSignature { header: String },

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Webhook timestamp outside tolerance: skew {skew_seconds}s > {tolerance_seconds}s")]
    StaleTimestamp {
        skew_seconds: i64,
        tolerance_seconds: u64,
    },

    #[error("Malformed webhook body: {0}")]
    MalformedBody(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WebhookError {
    /// Authentication failures, as opposed to body or store problems.
    pub fn is_security_rejection(&self) -> bool {
        matches!(
            self,
            WebhookError::UnknownProvider(_)
                | WebhookError::MissingSignature { .. }
                | WebhookError::InvalidSignature
                | WebhookError::StaleTimestamp { .. }
        )
    }
}

/// Authenticates provider callbacks and applies them to the job store.
pub struct WebhookIngestor {
    secrets: Arc<dyn SecretSource>,
    retryability: HashMap<String, RetryabilityTable>,
    /// Lowercased name to registered provider id
    provider_ids: HashMap<String, String>,
    store: Arc<dyn JobStore>,
    notifier: Arc<dyn StatusNotifier>,
}

impl WebhookIngestor {
    pub fn new(
        secrets: Arc<dyn SecretSource>,
        store: Arc<dyn JobStore>,
        notifier: Arc<dyn StatusNotifier>,
    ) -> Self {
        Self {
            secrets,
            retryability: HashMap::new(),
            provider_ids: HashMap::new(),
            store,
            notifier,
        }
    }

    /// Load per-provider error-code tables from `config.webhooks`.
    pub fn with_retryability_from(mut self, config: &OrchestratorConfig) -> Self {
        self.retryability = config
            .webhooks
            .iter()
            .map(|(provider, webhook)| (provider.to_ascii_lowercase(), webhook.into()))
            .collect();
        self
    }

    pub fn with_retryability(mut self, provider: &str, table: RetryabilityTable) -> Self {
        self.retryability.insert(provider.to_ascii_lowercase(), table);
        self
    }

    /// Registered provider ids. Callback provider names are matched against
    /// them case-insensitively and job mappings are looked up under the
    /// registered spelling.
    pub fn with_provider_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.provider_ids = ids
            .into_iter()
            .map(Into::into)
            .map(|id| (id.to_ascii_lowercase(), id))
            .collect();
        self
    }

    /// The provider id a callback name refers to. Unregistered names are
    /// lowercased, matching how secrets and retryability tables are keyed.
    fn resolve_provider(&self, name: &str) -> String {
        let key = name.trim().to_ascii_lowercase();
        self.provider_ids.get(&key).cloned().unwrap_or(key)
    }

    pub async fn process_webhook(
        &self,
        provider: &str,
        headers: &WebhookHeaders,
        payload: &[u8],
    ) -> Result<WebhookReceipt, WebhookError> {
        let span = info_span!("vgen.webhook", provider, bytes = payload.len());
        self.ingest(provider, headers, payload)
            .instrument(span)
            .await
            .inspect_err(|e| {
                if e.is_security_rejection() {
                    warn!(security = true, provider, error = %e, "webhook rejected");
                } else {
                    warn!(provider, error = %e, "webhook not applied");
                }
            })
    }

    async fn ingest(
        &self,
        provider: &str,
        headers: &WebhookHeaders,
        payload: &[u8],
    ) -> Result<WebhookReceipt, WebhookError> {
        let provider = self.resolve_provider(provider);
        let provider = provider.as_str();

        // received -> validated
        let secret = self
            .secrets
            .webhook_secret(provider)
            .ok_or_else(|| WebhookError::UnknownProvider(provider.to_string()))?;
        let signature = headers.get(&secret.signature_header).ok_or_else(|| {
            WebhookError::MissingSignature {
                header: secret.signature_header.clone(),
            }
        })?;
        if !verify_signature(&secret.secret, payload, signature) {
            return Err(WebhookError::InvalidSignature);
        }

        let event = ProviderEvent::parse(secret.dialect, payload)?;
        if event.is_unrecognized() {
            warn!(provider, raw = event.raw_status(), "webhook body outside dialect, recording as unmapped");
        }
        if let Some(sent_at) = event.timestamp() {
            let skew = Utc::now().signed_duration_since(sent_at).num_seconds().saturating_abs();
            let tolerance = secret.timestamp_tolerance.as_secs();
            if u64::try_from(skew).map_or(true, |skew| skew > tolerance) {
                return Err(WebhookError::StaleTimestamp {
                    skew_seconds: skew,
                    tolerance_seconds: tolerance,
                });
            }
        }

        // validated -> mapped
        let provider_job_id = event.provider_job_id().to_string();
        let default_table = RetryabilityTable::default();
        let table = self
            .retryability
            .get(&provider.to_ascii_lowercase())
            .unwrap_or(&default_table);
        let status = event
            .to_status(table)
            .with_provider(provider, provider_job_id.clone());
        debug!(provider_job_id, state = %status.state, raw = event.raw_status(), "webhook mapped");

        let Some(mapping) = self
            .store
            .find_by_provider_job(provider, &provider_job_id)
            .await?
        else {
            warn!(provider_job_id, "no job mapping for webhook, dropping");
            return Ok(WebhookReceipt {
                provider: provider.to_string(),
                provider_job_id,
                job_id: None,
                stage: WebhookStage::Mapped,
                disposition: Disposition::NoMapping,
                status,
            });
        };

        // mapped -> applied
        let job_id = mapping.internal_id;
        let (disposition, status) = match self
            .store
            .apply_status_update(&job_id, status.clone())
            .await?
        {
            StatusUpdate::Applied => {
                info!(job_id, state = %status.state, "webhook applied");
                if status.is_terminal() {
                    notify_detached(&self.notifier, &job_id, &status);
                }
                (Disposition::Applied, status)
            }
            StatusUpdate::Ignored { current } => {
                debug!(job_id, current = %current.state, "job already terminal, webhook ignored");
                (Disposition::AlreadyTerminal, current)
            }
        };

        Ok(WebhookReceipt {
            provider: provider.to_string(),
            provider_job_id,
            job_id: Some(job_id),
            stage: WebhookStage::Applied,
            disposition,
            status,
        })
    }
}
