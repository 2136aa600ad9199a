//! Generation Orchestrator
//!
//! Ties selection, recovery, the job store and webhook ingestion together
//! behind [`GenerationService`]:
//!
//! 1. validate the request and record the job as `queued`
//! 2. rank providers with the [`SelectionEngine`](crate::selection::SelectionEngine)
//! 3. submit through the [`ErrorRecoveryEngine`](crate::recovery::ErrorRecoveryEngine)
//!    using the ranked fallbacks, feeding every attempt into the breakers
//!    and the performance tracker
//! 4. persist the job mapping and the submission status
//!
//! Completion of asynchronous jobs arrives through
//! [`GenerationService::process_webhook`] or [`GenerationService::check_status`].

mod builder;
mod inflight;
mod maintenance;
mod service;

pub use builder::{GenerationServiceBuilder, ServiceBuildError};
pub use service::{GenerationFailure, GenerationOutcome, GenerationService, ProviderHealthReport};
