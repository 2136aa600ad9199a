//! VGen Kernel
//!
//! Contracts shared by every part of the video-generation orchestrator:
//!
//! - [`types`]: requests, provider descriptors, capability sets and the
//!   canonical job status vocabulary
//! - [`provider`]: the adapter contract every concrete provider implements
//! - [`store`], [`secrets`], [`notify`]: external collaborators the
//!   orchestrator delegates to
//! - [`error`]: the error taxonomy with a stable `kind` discriminator
//! - [`config`]: multi-format configuration loading and the orchestrator
//!   configuration schema
//!
//! The kernel holds no policy. Circuit breaking, selection, recovery and
//! webhook ingestion live in `vgen-foundation`.

// config module
pub mod config;

// error module
pub mod error;

// notify module
pub mod notify;

// provider module
pub mod provider;

// secrets module
pub mod secrets;

// store module
pub mod store;

// types module
pub mod types;

pub use error::{ErrorKind, GenerationError, GenerationResult, KernelError, KernelResult};
pub use notify::{NotifyError, StatusNotifier};
pub use provider::{
    ErrorClass, ProviderError, ProviderErrorKind, ProviderHealth, ProviderResult,
    ProviderSubmission, VideoProvider,
};
pub use secrets::{SecretSource, WebhookSecret};
pub use store::{JobStore, StatusUpdate, StoreError, StoreResult};
pub use types::{
    CanonicalStatus, CapabilityMismatch, CapabilitySet, DurationClass, GenerationRequest,
    JobMapping, JobState, ProviderDescriptor, ProviderScore, QualityLevel, RateLimitPolicy,
    Requirements, Resolution, SelectionResult, StatusError, Urgency, VideoFormat,
};
