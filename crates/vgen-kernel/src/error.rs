//! Crate-level error types for `vgen-kernel`.
//!
//! Two families live here:
//!
//! - [`KernelError`] / [`KernelResult`]: infrastructure errors (configuration,
//!   IO, serialization) propagated with [`error_stack::Report`] so context can
//!   be attached on the way up.
//! - [`GenerationError`]: what the orchestrator surfaces to callers. Every
//!   variant maps to a stable [`ErrorKind`] so callers can branch without
//!   knowing anything about individual providers.
//!
//! # Usage
//!
//! ```rust,ignore
//! use vgen_kernel::error::{KernelError, KernelResult};
//! use error_stack::ResultExt;
//!
//! fn read_settings() -> KernelResult<String> {
//!     let raw = std::fs::read_to_string("vgen.toml")
//!         .map_err(KernelError::from)
//!         .map_err(error_stack::Report::new)
//!         .attach("loading vgen.toml")?;
//!     Ok(raw)
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::provider::{ErrorClass, ProviderError, ProviderErrorKind};
use crate::store::StoreError;

/// Crate-level infrastructure error for `vgen-kernel`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KernelError {
    /// A configuration-related error.
    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// A low-level I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An internal / untyped error described by a message string.
    #[error("{0}")]
    Internal(String),
}

/// Convenience result alias using [`error_stack::Report`].
pub type KernelResult<T> = Result<T, error_stack::Report<KernelError>>;

/// Stable discriminator for [`GenerationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NoEligibleProvider,
    ProviderTransient,
    ProviderPermanent,
    CircuitOpen,
    Timeout,
    Cancelled,
    NotFound,
    Store,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NoEligibleProvider => "no_eligible_provider",
            ErrorKind::ProviderTransient => "provider_transient",
            ErrorKind::ProviderPermanent => "provider_permanent",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Store => "store",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the generation orchestrator.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum GenerationError {
    /// Malformed request, rejected before any provider is contacted.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// No registered provider can serve the request right now.
    #[error("No eligible provider: {reason}")]
    NoEligibleProvider { reason: String },

    /// A provider call failed.
    #[error("Provider '{provider}' failed: {source}")]
    Provider {
        provider: String,
        #[source]
        source: ProviderError,
    },

    /// The provider's circuit rejected the call without contacting it.
    #[error("Circuit open for provider '{provider}'")]
    CircuitOpen { provider: String },

    #[error("Generation '{job_id}' was cancelled")]
    Cancelled { job_id: String },

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Internal(String),
}

impl GenerationError {
    pub fn provider(provider: impl Into<String>, source: ProviderError) -> Self {
        Self::Provider {
            provider: provider.into(),
            source,
        }
    }

    pub fn no_eligible_provider(reason: impl Into<String>) -> Self {
        Self::NoEligibleProvider {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GenerationError::Validation(_) => ErrorKind::Validation,
            GenerationError::NoEligibleProvider { .. } => ErrorKind::NoEligibleProvider,
            GenerationError::Provider { source, .. } => match (&source.kind, source.class()) {
                (ProviderErrorKind::Timeout, _) => ErrorKind::Timeout,
                (_, ErrorClass::Retryable) => ErrorKind::ProviderTransient,
                (_, ErrorClass::Escalate) => ErrorKind::ProviderPermanent,
                (_, ErrorClass::Fatal) => ErrorKind::Validation,
            },
            GenerationError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            GenerationError::Cancelled { .. } => ErrorKind::Cancelled,
            GenerationError::NotFound(_) => ErrorKind::NotFound,
            GenerationError::Store(_) => ErrorKind::Store,
            GenerationError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether re-submitting the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ProviderTransient
                | ErrorKind::Timeout
                | ErrorKind::CircuitOpen
                | ErrorKind::Store
        )
    }

    /// The provider that produced this error, if any.
    pub fn provider_id(&self) -> Option<&str> {
        match self {
            GenerationError::Provider { provider, .. }
            | GenerationError::CircuitOpen { provider } => Some(provider),
            _ => None,
        }
    }

    /// Provider-native error code, if the provider supplied one.
    pub fn code(&self) -> Option<&str> {
        match self {
            GenerationError::Provider { source, .. } => source.code.as_deref(),
            _ => None,
        }
    }
}

pub type GenerationResult<T> = Result<T, GenerationError>;
