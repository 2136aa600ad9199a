//! Requests that run out of providers, and circuits that recover.

use std::sync::Arc;
use std::time::Duration;
use vgen_foundation::{GenerationService, InMemoryJobStore, State};
use vgen_kernel::config::{OrchestratorConfig, ProviderSettings};
use vgen_kernel::{ErrorKind, JobState, JobStore, ProviderError};
use vgen_testing::fixtures::{orchestrator_config, request_seconds};
use vgen_testing::{ScriptedProvider, Step, assert_provider_called};

const IDS: [&str; 3] = ["a", "b", "c"];

fn fragile_config() -> OrchestratorConfig {
    let mut config = orchestrator_config(&IDS);
    for id in IDS {
        config.providers.insert(
            id.to_string(),
            ProviderSettings {
                failure_threshold: Some(1),
                reset_timeout_ms: Some(10_000),
                ..Default::default()
            },
        );
    }
    config
}

fn providers() -> Vec<ScriptedProvider> {
    IDS.iter()
        .enumerate()
        .map(|(i, id)| ScriptedProvider::new(id, i as u32 + 1))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_all_circuits_open_means_no_eligible_provider() {
    let scripted = providers();
    let store = Arc::new(InMemoryJobStore::new());
    let service = GenerationService::builder(fragile_config())
        .providers(scripted.iter().cloned().map(ScriptedProvider::into_arc))
        .job_store(store.clone())
        .build()
        .unwrap();

    for id in IDS {
        service.registry().get(id).unwrap().breaker.record_failure();
    }
    assert!(service.provider_health().iter().all(|h| h.state == State::Open));

    let failure = service.generate(request_seconds(30)).await.unwrap_err();
    assert_eq!(failure.kind(), ErrorKind::NoEligibleProvider);
    assert!(failure.report.is_none());
    for provider in &scripted {
        assert_provider_called!(provider, 0);
    }

    let job_id = failure.job_id.expect("failed jobs keep their id");
    let stored = store.get_job_status(&job_id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_chain_surfaces_last_provider_error() {
    let scripted = providers();
    let codes = ["A_DOWN", "B_DOWN", "FARM_BUSY"];
    for (provider, code) in scripted.iter().zip(codes) {
        let error = ProviderError::server(503, "service unavailable").with_code(code);
        provider
            .push_steps([Step::Fail(error.clone()), Step::Fail(error)])
            .await;
    }
    let service = GenerationService::builder(orchestrator_config(&IDS))
        .providers(scripted.iter().cloned().map(ScriptedProvider::into_arc))
        .build()
        .unwrap();

    let failure = service.generate(request_seconds(30)).await.unwrap_err();

    assert_eq!(failure.kind(), ErrorKind::ProviderTransient);
    assert!(failure.is_retryable());
    assert_eq!(failure.error.provider_id(), Some("c"));
    assert_eq!(failure.error.code(), Some("FARM_BUSY"));
    for provider in &scripted {
        assert_provider_called!(provider, 2);
    }

    let report = failure.report.unwrap();
    assert_eq!(report.calls(), 6);
    assert_eq!(report.switches.len(), 2);

    let status = service.check_status(&failure.job_id.unwrap()).await.unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.provider_id.as_deref(), Some("c"));
    let error = status.error.unwrap();
    assert_eq!(error.code.as_deref(), Some("FARM_BUSY"));
    assert!(error.retryable);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_probe_closes_circuit() {
    let scripted = providers();
    let service = GenerationService::builder(fragile_config())
        .providers(scripted.iter().cloned().map(ScriptedProvider::into_arc))
        .build()
        .unwrap();
    let breaker = service.registry().get("a").unwrap().breaker.clone();
    breaker.record_failure();
    assert_eq!(breaker.state(), State::Open);

    // While a is open, b takes the traffic
    let outcome = service.generate(request_seconds(30)).await.unwrap();
    assert_eq!(outcome.selection.selected_provider, "b");
    assert_provider_called!(scripted[0], 0);

    tokio::time::advance(Duration::from_millis(10_001)).await;
    assert_eq!(breaker.state(), State::HalfOpen);

    let probe = request_seconds(30).with_preferred_provider("a");
    let outcome = service.generate(probe).await.unwrap();
    assert_eq!(outcome.status.provider_id.as_deref(), Some("a"));
    assert_provider_called!(scripted[0], 1);
    assert_eq!(breaker.state(), State::Closed);
    assert_eq!(breaker.failure_count(), 0);

    let stats = breaker.statistics();
    assert_eq!(stats.times_opened, 1);
    assert_eq!(stats.total_successes, 1);
}
