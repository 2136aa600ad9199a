use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;
use vgen_kernel::config::OrchestratorConfig;
use vgen_kernel::{
    CanonicalStatus, ErrorClass, ErrorKind, GenerationError, GenerationRequest, GenerationResult,
    JobMapping, JobStore, ProviderError, ProviderErrorKind, ProviderHealth, ProviderSubmission,
    SelectionResult, StatusError, StatusNotifier, StatusUpdate,
};

use super::inflight::{InFlightRegistry, InFlightTicket};
use super::maintenance::Maintenance;
use crate::circuit_breaker::{CircuitStatistics, State};
use crate::notify::notify_detached;
use crate::performance::{PerformanceTracker, ProviderPerformance};
use crate::recovery::{
    ErrorRecoveryEngine, RecoveryContext, RecoveryReport, RecoveryStatistics, RecoveryStrategy,
};
use crate::registry::ProviderRegistry;
use crate::selection::SelectionEngine;
use crate::webhook::{WebhookError, WebhookHeaders, WebhookIngestor, WebhookReceipt};

/// Immediate result of [`GenerationService::generate`].
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub job_id: String,
    /// `completed` for providers that render inline, otherwise `processing`
    /// until a webhook or poll moves it on
    pub status: CanonicalStatus,
    pub selection: SelectionResult,
    pub report: RecoveryReport,
}

/// A generation that ended without a usable provider submission.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct GenerationFailure {
    /// `None` when the request was rejected before a job was created
    pub job_id: Option<String>,
    pub error: GenerationError,
    pub report: Option<RecoveryReport>,
}

impl GenerationFailure {
    fn rejected(error: GenerationError) -> Self {
        Self {
            job_id: None,
            error,
            report: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn is_retryable(&self) -> bool {
        self.error.is_retryable()
    }
}

/// Per-provider view for health dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealthReport {
    pub provider_id: String,
    pub display_name: String,
    pub priority: u32,
    pub state: State,
    pub failure_count: u32,
    pub circuit: CircuitStatistics,
    /// `None` until the provider has served a request
    pub performance: Option<ProviderPerformance>,
}

/// The single entry point for video generation.
///
/// Built with [`GenerationServiceBuilder`](super::GenerationServiceBuilder).
/// Owns the provider registry, the engines and the background maintenance;
/// dropping it cancels everything still in flight.
pub struct GenerationService {
    pub(super) config: OrchestratorConfig,
    pub(super) registry: Arc<ProviderRegistry>,
    pub(super) selection: SelectionEngine,
    pub(super) recovery: ErrorRecoveryEngine,
    pub(super) tracker: Arc<PerformanceTracker>,
    pub(super) store: Arc<dyn JobStore>,
    pub(super) notifier: Arc<dyn StatusNotifier>,
    pub(super) webhooks: WebhookIngestor,
    pub(super) inflight: Arc<InFlightRegistry>,
    pub(super) maintenance: Mutex<Option<Maintenance>>,
}

impl GenerationService {
    pub fn builder(config: OrchestratorConfig) -> super::GenerationServiceBuilder {
        super::GenerationServiceBuilder::new(config)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn performance(&self) -> &PerformanceTracker {
        &self.tracker
    }

    pub fn recovery_statistics(&self) -> RecoveryStatistics {
        self.recovery.recovery_statistics()
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Run every adapter's `initialize` with its provider settings.
    pub async fn initialize_providers(&self) -> Vec<(String, ProviderError)> {
        self.registry.initialize_all(&self.config).await
    }

    pub async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationOutcome, GenerationFailure> {
        self.generate_with_cancel(request, None).await
    }

    /// Like [`generate`](Self::generate); cancelling `cancel` stops retries
    /// and marks the job cancelled.
    pub async fn generate_with_cancel(
        &self,
        request: GenerationRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<GenerationOutcome, GenerationFailure> {
        request.validate().map_err(GenerationFailure::rejected)?;

        let job_id = Uuid::new_v4().to_string();
        let ticket = self.inflight.register(&job_id, cancel);
        self.execute(ticket, request).await
    }

    /// Run a generation under a job id chosen by the caller, so
    /// [`cancel`](Self::cancel) and [`check_status`](Self::check_status) can
    /// reach it while it is still running. The id must not belong to a job
    /// that is in flight or already has a stored status.
    pub async fn generate_as(
        &self,
        job_id: impl Into<String>,
        request: GenerationRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<GenerationOutcome, GenerationFailure> {
        let job_id = job_id.into();
        if job_id.trim().is_empty() {
            return Err(GenerationFailure::rejected(GenerationError::Validation(
                "job id must not be empty".into(),
            )));
        }
        request.validate().map_err(GenerationFailure::rejected)?;

        let Some(ticket) = self.inflight.try_register(&job_id, cancel) else {
            return Err(GenerationFailure::rejected(GenerationError::Validation(
                format!("job '{job_id}' is already running"),
            )));
        };
        match self.store.get_job_status(&job_id).await {
            Ok(None) => self.execute(ticket, request).await,
            Ok(Some(_)) => {
                self.inflight.complete(&ticket);
                Err(GenerationFailure::rejected(GenerationError::Validation(
                    format!("job '{job_id}' already exists"),
                )))
            }
            Err(e) => {
                self.inflight.complete(&ticket);
                Err(GenerationFailure::rejected(e.into()))
            }
        }
    }

    async fn execute(
        &self,
        ticket: InFlightTicket,
        request: GenerationRequest,
    ) -> Result<GenerationOutcome, GenerationFailure> {
        let span = info_span!(
            "vgen.generate",
            job_id = %ticket.job_id,
            requirements = %request.requirements(),
            urgency = ?request.urgency,
        );
        let result = self.run(&ticket, &request).instrument(span).await;
        self.inflight.complete(&ticket);
        result
    }

    async fn run(
        &self,
        ticket: &InFlightTicket,
        request: &GenerationRequest,
    ) -> Result<GenerationOutcome, GenerationFailure> {
        let job_id = ticket.job_id.as_str();
        let fail = |error: GenerationError, report: Option<RecoveryReport>| GenerationFailure {
            job_id: Some(job_id.to_string()),
            error,
            report,
        };

        // Guarded, so a cancel that arrived first is not overwritten
        self.apply(job_id, CanonicalStatus::queued())
            .await
            .map_err(|e| fail(e, None))?;

        let selection = match self.selection.select_optimal_provider(
            request,
            &self.registry,
            &self.tracker,
        ) {
            Ok(selection) => selection,
            Err(error) => {
                self.record_failure(job_id, &error).await;
                return Err(fail(error, None));
            }
        };
        info!(
            provider = %selection.selected_provider,
            fallbacks = ?selection.fallback_providers,
            score = selection.score,
            "provider selected"
        );

        let strategy = RecoveryStrategy::from_settings(&self.config.recovery)
            .with_fallback_providers(selection.fallback_providers.clone());
        let ctx = RecoveryContext {
            job_id: Some(job_id),
            cancel: Some(&ticket.cancel),
            observer: Some(self.tracker.as_ref()),
        };
        let registry = &self.registry;
        let recovered = self
            .recovery
            .execute_with_recovery(&selection.selected_provider, &strategy, ctx, |provider_id| {
                async move {
                    match registry.get(&provider_id) {
                        Some(provider) => provider.adapter.generate_video(request).await,
                        None => Err(ProviderError::new(
                            ProviderErrorKind::Unsupported,
                            format!("provider '{provider_id}' is not registered"),
                        )),
                    }
                }
            })
            .await;

        let recovered = match recovered {
            Ok(recovered) => recovered,
            Err(failure) => {
                self.record_failure(job_id, &failure.error).await;
                return Err(fail(failure.error, Some(failure.report)));
            }
        };

        let provider_id = recovered.provider_id;
        let submission: ProviderSubmission = recovered.value;
        let mapping = JobMapping::new(job_id, &provider_id, submission.provider_job_id());
        if let Err(e) = self.store.save_job_mapping(mapping).await {
            let error = GenerationError::from(e);
            self.record_failure(job_id, &error).await;
            return Err(fail(error, Some(recovered.report)));
        }

        // A webhook may already have finished the job, or a cancel landed
        let status = self
            .apply(job_id, submission.to_status(&provider_id))
            .await
            .map_err(|e| fail(e, None))?;
        info!(provider = %provider_id, state = %status.state, "generation submitted");

        Ok(GenerationOutcome {
            job_id: job_id.to_string(),
            status,
            selection,
            report: recovered.report,
        })
    }

    /// Persist the terminal status for a failed or cancelled generation.
    /// Store errors are logged; the caller already has an error to return.
    async fn record_failure(&self, job_id: &str, error: &GenerationError) {
        let status = match error {
            GenerationError::Cancelled { .. } => CanonicalStatus::cancelled(),
            _ => {
                let mut status = CanonicalStatus::failed(
                    StatusError::new(error.to_string())
                        .with_code(error.code().map(str::to_string))
                        .with_retryable(error.is_retryable()),
                );
                status.provider_id = error.provider_id().map(str::to_string);
                status
            }
        };
        warn!(job_id, kind = %error.kind(), error = %error, "generation failed");
        if let Err(e) = self.apply(job_id, status).await {
            warn!(job_id, error = %e, "could not record failed generation");
        }
    }

    /// Guarded write; notifies on an applied terminal status. Returns the
    /// status now stored.
    async fn apply(&self, job_id: &str, status: CanonicalStatus) -> GenerationResult<CanonicalStatus> {
        match self.store.apply_status_update(job_id, status.clone()).await? {
            StatusUpdate::Applied => {
                if status.is_terminal() {
                    notify_detached(&self.notifier, job_id, &status);
                }
                Ok(status)
            }
            StatusUpdate::Ignored { current } => {
                debug!(job_id, current = %current.state, "job already terminal, update ignored");
                Ok(current)
            }
        }
    }

    /// Cancel a job. A running generation stops retrying; a submitted one is
    /// marked cancelled so late webhooks are ignored. Returns the status now
    /// stored, which stays unchanged if the job had already finished.
    pub async fn cancel(&self, job_id: &str) -> GenerationResult<CanonicalStatus> {
        let running = self.inflight.cancel(job_id);
        if !running && self.store.get_job_status(job_id).await?.is_none() {
            return Err(GenerationError::NotFound(job_id.to_string()));
        }
        info!(job_id, running, "cancelling generation");
        self.apply(job_id, CanonicalStatus::cancelled()).await
    }

    /// Latest known status. Falls back to asking the provider when the store
    /// has a job mapping but no status, and persists the answer.
    pub async fn check_status(&self, job_id: &str) -> GenerationResult<CanonicalStatus> {
        if let Some(status) = self.store.get_job_status(job_id).await? {
            return Ok(status);
        }
        let mapping = self
            .store
            .get_job_mapping(job_id)
            .await?
            .ok_or_else(|| GenerationError::NotFound(job_id.to_string()))?;
        let provider = self.registry.get(&mapping.provider_id).ok_or_else(|| {
            GenerationError::NotFound(format!(
                "provider '{}' of job {job_id}",
                mapping.provider_id
            ))
        })?;

        let permit = provider
            .breaker
            .try_acquire()
            .map_err(|_| GenerationError::CircuitOpen {
                provider: mapping.provider_id.clone(),
            })?;
        debug!(job_id, provider = %mapping.provider_id, "status not stored, asking provider");

        let started = Instant::now();
        let timeout = std::time::Duration::from_millis(self.config.recovery.attempt_timeout_ms);
        let answer = tokio::time::timeout(timeout, provider.adapter.check_status(&mapping.provider_job_id))
            .await
            .unwrap_or_else(|_| Err(ProviderError::timeout(timeout)));
        match answer {
            Ok(status) => {
                permit.succeed();
                self.tracker.record(&mapping.provider_id, true, started.elapsed());
                let status = status.with_provider(&mapping.provider_id, &mapping.provider_job_id);
                self.apply(job_id, status).await
            }
            Err(e) => {
                if e.class() == ErrorClass::Fatal {
                    drop(permit);
                } else {
                    permit.fail();
                    self.tracker.record(&mapping.provider_id, false, started.elapsed());
                }
                Err(GenerationError::provider(&mapping.provider_id, e))
            }
        }
    }

    pub async fn process_webhook(
        &self,
        provider: &str,
        headers: &WebhookHeaders,
        payload: &[u8],
    ) -> Result<WebhookReceipt, WebhookError> {
        self.webhooks.process_webhook(provider, headers, payload).await
    }

    /// Circuit and performance state of every provider, in registration order.
    pub fn provider_health(&self) -> Vec<ProviderHealthReport> {
        self.registry
            .iter()
            .map(|provider| {
                let circuit = provider.breaker.statistics();
                ProviderHealthReport {
                    provider_id: provider.id().to_string(),
                    display_name: provider.descriptor().display_name.clone(),
                    priority: provider.descriptor().priority,
                    state: circuit.state,
                    failure_count: circuit.failure_count,
                    circuit,
                    performance: self.tracker.get_performance(provider.id()),
                }
            })
            .collect()
    }

    /// Ask every adapter for its own health, concurrently and time-bounded.
    pub async fn probe_providers(&self) -> Vec<(String, ProviderHealth)> {
        let timeout = std::time::Duration::from_millis(self.config.recovery.attempt_timeout_ms);
        let probes = self.registry.iter().map(|provider| async move {
            let started = Instant::now();
            let health = match tokio::time::timeout(timeout, provider.adapter.health_check()).await {
                Ok(Ok(mut health)) => {
                    health
                        .latency_ms
                        .get_or_insert(started.elapsed().as_millis() as u64);
                    health
                }
                Ok(Err(e)) => ProviderHealth::unhealthy(e.to_string()),
                Err(_) => ProviderHealth::unhealthy(format!("health check timed out after {timeout:?}")),
            };
            if !health.healthy {
                warn!(provider = %provider.id(), message = ?health.message, "provider unhealthy");
            }
            (provider.id().to_string(), health)
        });
        join_all(probes).await
    }

    /// Stop maintenance and cancel every in-flight generation.
    pub fn shutdown(&self) {
        if let Some(maintenance) = self.maintenance.lock().take() {
            maintenance.stop();
        }
        self.inflight.cancel_all();
        info!("generation service shut down");
    }
}

impl Drop for GenerationService {
    fn drop(&mut self) {
        self.inflight.cancel_all();
    }
}
