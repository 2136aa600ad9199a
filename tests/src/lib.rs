//! VGen Testing Framework
//!
//! Deterministic stand-ins for the orchestrator's external collaborators:
//! scripted provider adapters, a recording notifier and fixture builders for
//! requests and signed webhooks.

pub mod fixtures;
pub mod notifier;
pub mod provider;

pub use notifier::RecordingNotifier;
pub use provider::{ScriptedProvider, Step};
