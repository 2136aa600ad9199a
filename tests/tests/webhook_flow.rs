//! Provider callbacks flowing into the canonical job status.

use std::sync::Arc;
use std::time::Duration;
use vgen_foundation::{
    Disposition, GenerationService, InMemoryJobStore, StaticSecretSource, WebhookError,
    WebhookHeaders, WebhookStage,
};
use vgen_kernel::{JobState, JobStore};
use vgen_testing::fixtures::{
    SIGNATURE_HEADER, WEBHOOK_SECRET, now_ts, orchestrator_config, primary_body,
    primary_failure_body, request_seconds, signed_headers,
};
use vgen_testing::{RecordingNotifier, ScriptedProvider};

struct Harness {
    service: GenerationService,
    store: Arc<InMemoryJobStore>,
    notifier: RecordingNotifier,
    secrets: Arc<StaticSecretSource>,
}

fn harness() -> Harness {
    let config = orchestrator_config(&["alpha"]);
    let store = Arc::new(InMemoryJobStore::new());
    let notifier = RecordingNotifier::new();
    let secrets = Arc::new(StaticSecretSource::from_config(&config));
    let service = GenerationService::builder(config)
        .provider(ScriptedProvider::new("alpha", 1).into_arc())
        .job_store(store.clone())
        .notifier(Arc::new(notifier.clone()))
        .secret_source(secrets.clone())
        .build()
        .unwrap();
    Harness {
        service,
        store,
        notifier,
        secrets,
    }
}

fn signed(body: &[u8]) -> WebhookHeaders {
    signed_headers(SIGNATURE_HEADER, WEBHOOK_SECRET, body)
}

#[tokio::test]
async fn test_completion_then_replay_notifies_once() {
    let h = harness();
    let outcome = h.service.generate(request_seconds(45)).await.unwrap();
    assert_eq!(outcome.status.state, JobState::Processing);

    let body = primary_body("alpha-job-1", "completed", Some("https://cdn/alpha.mp4"), now_ts());
    let receipt = h.service.process_webhook("alpha", &signed(&body), &body).await.unwrap();
    assert_eq!(receipt.stage, WebhookStage::Applied);
    assert_eq!(receipt.disposition, Disposition::Applied);
    assert_eq!(receipt.status.video_url.as_deref(), Some("https://cdn/alpha.mp4"));

    let replay = h.service.process_webhook("alpha", &signed(&body), &body).await.unwrap();
    assert_eq!(replay.disposition, Disposition::AlreadyTerminal);
    assert_eq!(replay.status.state, JobState::Completed);

    assert!(h.notifier.wait_for(1, Duration::from_secs(1)).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        h.notifier.states_for(&outcome.job_id).await,
        vec![JobState::Completed]
    );
}

#[tokio::test]
async fn test_progress_update_does_not_notify() {
    let h = harness();
    let outcome = h.service.generate(request_seconds(20)).await.unwrap();

    let body = primary_body("alpha-job-1", "processing", None, now_ts());
    let receipt = h.service.process_webhook("alpha", &signed(&body), &body).await.unwrap();
    assert_eq!(receipt.disposition, Disposition::Applied);

    let stored = h.store.get_job_status(&outcome.job_id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Processing);
    assert!(!h.notifier.wait_for(1, Duration::from_millis(50)).await);
}

#[tokio::test]
async fn test_rejected_payloads_leave_status_untouched() {
    let h = harness();
    let outcome = h.service.generate(request_seconds(45)).await.unwrap();
    let body = primary_body("alpha-job-1", "completed", Some("https://cdn/alpha.mp4"), now_ts());

    let mut tampered = body.clone();
    let last = tampered.len() - 2;
    tampered[last] = b'x';
    let err = h
        .service
        .process_webhook("alpha", &signed(&body), &tampered)
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookError::InvalidSignature));
    assert!(err.is_security_rejection());

    let stale = primary_body(
        "alpha-job-1",
        "completed",
        Some("https://cdn/alpha.mp4"),
        now_ts() - 301,
    );
    let err = h
        .service
        .process_webhook("alpha", &signed(&stale), &stale)
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookError::StaleTimestamp { .. }));

    let err = h
        .service
        .process_webhook("alpha", &WebhookHeaders::new(), &body)
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookError::MissingSignature { .. }));

    let stored = h.store.get_job_status(&outcome.job_id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Processing);
    assert!(h.notifier.events().await.is_empty());
}

#[tokio::test]
async fn test_failure_callback_classifies_retryability() {
    let h = harness();
    let outcome = h.service.generate(request_seconds(45)).await.unwrap();

    let body = primary_failure_body("alpha-job-1", "FARM_BUSY", "render farm saturated", now_ts());
    h.service.process_webhook("alpha", &signed(&body), &body).await.unwrap();

    let status = h.service.check_status(&outcome.job_id).await.unwrap();
    assert_eq!(status.state, JobState::Failed);
    let error = status.error.unwrap();
    assert_eq!(error.code.as_deref(), Some("FARM_BUSY"));
    assert!(error.retryable);
}

#[tokio::test]
async fn test_cancelled_job_ignores_late_completion() {
    let h = harness();
    let outcome = h.service.generate(request_seconds(45)).await.unwrap();

    let cancelled = h.service.cancel(&outcome.job_id).await.unwrap();
    assert_eq!(cancelled.state, JobState::Cancelled);

    let body = primary_body("alpha-job-1", "completed", Some("https://cdn/alpha.mp4"), now_ts());
    let receipt = h.service.process_webhook("alpha", &signed(&body), &body).await.unwrap();
    assert_eq!(receipt.disposition, Disposition::AlreadyTerminal);
    assert_eq!(receipt.status.state, JobState::Cancelled);

    let status = h.service.check_status(&outcome.job_id).await.unwrap();
    assert_eq!(status.state, JobState::Cancelled);
}

#[tokio::test]
async fn test_rotated_secret_rejects_old_signature() {
    let h = harness();
    h.service.generate(request_seconds(45)).await.unwrap();
    assert!(h.secrets.rotate_secret("alpha", "whsec_rotated_91c2"));

    let body = primary_body("alpha-job-1", "completed", Some("https://cdn/alpha.mp4"), now_ts());
    let err = h
        .service
        .process_webhook("alpha", &signed(&body), &body)
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookError::InvalidSignature));

    let rotated = signed_headers(SIGNATURE_HEADER, "whsec_rotated_91c2", &body);
    let receipt = h.service.process_webhook("alpha", &rotated, &body).await.unwrap();
    assert_eq!(receipt.disposition, Disposition::Applied);
}

#[tokio::test]
async fn test_unknown_provider_job_is_dropped() {
    let h = harness();
    let body = primary_body("alpha-job-404", "completed", Some("https://cdn/alpha.mp4"), now_ts());

    let receipt = h.service.process_webhook("alpha", &signed(&body), &body).await.unwrap();
    assert_eq!(receipt.disposition, Disposition::NoMapping);
    assert_eq!(receipt.stage, WebhookStage::Mapped);
    assert!(receipt.job_id.is_none());
    assert_eq!(h.store.job_count(), 0);
}

#[tokio::test]
async fn test_provider_name_case_is_ignored() {
    let h = harness();
    let outcome = h.service.generate(request_seconds(45)).await.unwrap();

    let body = primary_body("alpha-job-1", "completed", Some("https://cdn/alpha.mp4"), now_ts());
    let receipt = h.service.process_webhook("Alpha", &signed(&body), &body).await.unwrap();
    assert_eq!(receipt.disposition, Disposition::Applied);
    assert_eq!(receipt.job_id.as_deref(), Some(outcome.job_id.as_str()));

    let status = h.service.check_status(&outcome.job_id).await.unwrap();
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.provider_id.as_deref(), Some("alpha"));
}

#[tokio::test]
async fn test_unrecognized_shape_recorded_as_unmapped() {
    let h = harness();
    let outcome = h.service.generate(request_seconds(45)).await.unwrap();

    let body = serde_json::json!({ "video_id": "alpha-job-1", "state": "done" })
        .to_string()
        .into_bytes();
    let receipt = h.service.process_webhook("alpha", &signed(&body), &body).await.unwrap();
    assert_eq!(receipt.disposition, Disposition::Applied);

    let stored = h.store.get_job_status(&outcome.job_id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Unmapped);
    assert_eq!(stored.raw_status.as_deref(), Some("done"));
}
