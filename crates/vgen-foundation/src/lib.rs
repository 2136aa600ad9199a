//! VGen Foundation
//!
//! The engines behind the video-generation orchestrator. Contracts and
//! vocabulary live in `vgen-kernel`; this crate supplies the policy:
//!
//! - [`circuit_breaker`]: per-provider failure isolation
//! - [`performance`]: rolling success rate and latency per provider
//! - [`registry`] / [`selection`]: provider ranking with fallback chains
//! - [`recovery`]: retries, backoff and escalation across providers
//! - [`webhook`]: authenticated status callbacks
//! - [`orchestrator`]: the [`GenerationService`] entry point
//! - [`store`] / [`notify`]: in-process collaborators
//! - [`logging`]: tracing bootstrap

// circuit breaker module
pub mod circuit_breaker;

// logging module
pub mod logging;

// notify module - in-process notifiers
pub mod notify;

// orchestrator module - generation entry point
pub mod orchestrator;

// performance module
pub mod performance;

// recovery module - retry and fallback execution
pub mod recovery;

// registry module
pub mod registry;

// selection module - provider ranking
pub mod selection;

// store module - in-memory job store
pub mod store;

// webhook module - provider callback ingestion
pub mod webhook;

#[cfg(test)]
mod test_support;

pub use circuit_breaker::{
    CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitOpenError,
    CircuitStatistics, State,
};
pub use notify::{BroadcastNotifier, NoopNotifier, StatusEvent};
pub use orchestrator::{
    GenerationFailure, GenerationOutcome, GenerationService, GenerationServiceBuilder,
    ProviderHealthReport, ServiceBuildError,
};
pub use performance::{PerformanceTracker, ProviderPerformance, TrackerConfig};
pub use recovery::{
    AttemptObserver, AttemptOutcome, BackoffPolicy, ErrorRecoveryEngine, GenerationAttempt,
    ProviderSwitch, Recovered, RecoveryContext, RecoveryFailure, RecoveryReport,
    RecoveryStatistics, RecoveryStrategy,
};
pub use registry::{ProviderRegistry, RegisteredProvider, RegistryError};
pub use selection::SelectionEngine;
pub use store::InMemoryJobStore;
pub use webhook::{
    Disposition, StaticSecretSource, WebhookError, WebhookHeaders, WebhookIngestor,
    WebhookReceipt, WebhookStage, sign_payload, verify_signature,
};
