//! Provider adapter contract.
//!
//! Every concrete video-generation backend is wrapped in a [`VideoProvider`].
//! The orchestrator only ever talks to this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::config::ProviderSettings;
use crate::types::{CanonicalStatus, GenerationRequest, ProviderDescriptor, Requirements};

/// How the recovery engine should react to a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Retry on the same provider after backoff
    Retryable,
    /// Skip remaining attempts on this provider and move down the chain
    Escalate,
    /// Stop immediately; no provider will accept this request
    Fatal,
}

/// Provider failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    Timeout,
    Network,
    /// HTTP-style status reported by the provider API
    Server(u16),
    RateLimited,
    InvalidInput,
    Authentication,
    QuotaExceeded,
    Unsupported,
    Other,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderErrorKind::Timeout => write!(f, "timeout"),
            ProviderErrorKind::Network => write!(f, "network"),
            ProviderErrorKind::Server(status) => write!(f, "server({status})"),
            ProviderErrorKind::RateLimited => write!(f, "rate_limited"),
            ProviderErrorKind::InvalidInput => write!(f, "invalid_input"),
            ProviderErrorKind::Authentication => write!(f, "authentication"),
            ProviderErrorKind::QuotaExceeded => write!(f, "quota_exceeded"),
            ProviderErrorKind::Unsupported => write!(f, "unsupported"),
            ProviderErrorKind::Other => write!(f, "other"),
        }
    }
}

/// Error returned by a provider adapter.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    /// Provider-native error code
    pub code: Option<String>,
    pub message: String,
    /// Minimum wait the provider asked for before the next call
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ProviderErrorKind::Timeout,
            format!("no response within {}ms", after.as_millis()),
        )
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Network, message)
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Server(status), message)
    }

    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::new(ProviderErrorKind::RateLimited, "rate limit exceeded")
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn class(&self) -> ErrorClass {
        match self.kind {
            ProviderErrorKind::Timeout
            | ProviderErrorKind::Network
            | ProviderErrorKind::RateLimited => ErrorClass::Retryable,
            ProviderErrorKind::Server(status) if status >= 500 => ErrorClass::Retryable,
            ProviderErrorKind::Server(429) => ErrorClass::Retryable,
            ProviderErrorKind::Server(_) => ErrorClass::Escalate,
            ProviderErrorKind::Authentication
            | ProviderErrorKind::QuotaExceeded
            | ProviderErrorKind::Unsupported
            | ProviderErrorKind::Other => ErrorClass::Escalate,
            ProviderErrorKind::InvalidInput => ErrorClass::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// What a provider returned for a generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderSubmission {
    /// Rendered inline; the artifact is ready
    Completed {
        provider_job_id: String,
        video_url: String,
        thumbnail_url: Option<String>,
    },
    /// Accepted for asynchronous rendering; completion arrives by webhook or polling
    Accepted { provider_job_id: String },
}

impl ProviderSubmission {
    pub fn provider_job_id(&self) -> &str {
        match self {
            ProviderSubmission::Completed { provider_job_id, .. }
            | ProviderSubmission::Accepted { provider_job_id } => provider_job_id,
        }
    }

    /// Canonical status implied by this submission.
    pub fn to_status(&self, provider_id: &str) -> CanonicalStatus {
        match self {
            ProviderSubmission::Completed {
                provider_job_id,
                video_url,
                thumbnail_url,
            } => CanonicalStatus::completed(video_url.clone())
                .with_thumbnail(thumbnail_url.clone())
                .with_provider(provider_id, provider_job_id.clone()),
            ProviderSubmission::Accepted { provider_job_id } => {
                CanonicalStatus::processing().with_provider(provider_id, provider_job_id.clone())
            }
        }
    }
}

/// Self-reported adapter health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub healthy: bool,
    pub latency_ms: Option<u64>,
    pub message: Option<String>,
}

impl ProviderHealth {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            latency_ms: None,
            message: None,
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            latency_ms: None,
            message: Some(message.into()),
        }
    }
}

/// Adapter contract for a video-generation provider.
#[async_trait]
pub trait VideoProvider: Send + Sync {
    /// Static identity and capabilities.
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Provider id
    fn id(&self) -> &str {
        &self.descriptor().id
    }

    /// One-time setup with the provider's settings (credentials, endpoints).
    async fn initialize(&self, _settings: &ProviderSettings) -> ProviderResult<()> {
        Ok(())
    }

    /// Submit a generation request.
    async fn generate_video(&self, request: &GenerationRequest) -> ProviderResult<ProviderSubmission>;

    /// Ask the provider directly for the state of one of its jobs.
    async fn check_status(&self, provider_job_id: &str) -> ProviderResult<CanonicalStatus>;

    /// Whether the adapter accepts these requirements. Defaults to the
    /// declared capability set.
    fn can_handle(&self, requirements: &Requirements) -> bool {
        self.descriptor().capabilities.satisfies(requirements).is_ok()
    }

    /// Health check
    async fn health_check(&self) -> ProviderResult<ProviderHealth> {
        Ok(ProviderHealth::healthy())
    }

    /// Estimated cost of rendering `request`.
    fn estimated_cost(&self, request: &GenerationRequest) -> f64 {
        self.descriptor().cost_per_second * f64::from(request.duration.max_seconds())
    }
}
