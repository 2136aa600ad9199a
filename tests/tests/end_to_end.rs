//! A request that outlives its first provider and finishes on the fallback.

use std::sync::Arc;
use std::time::Duration;
use vgen_foundation::{Disposition, GenerationService, InMemoryJobStore, State};
use vgen_kernel::{JobState, JobStore};
use vgen_testing::fixtures::{
    SIGNATURE_HEADER, WEBHOOK_SECRET, now_ts, orchestrator_config, primary_body, request_seconds,
    signed_headers,
};
use vgen_testing::{RecordingNotifier, ScriptedProvider, Step, assert_provider_called};

fn two_providers(b_step: Step) -> (ScriptedProvider, ScriptedProvider) {
    let a = ScriptedProvider::new("a", 1).with_steps([Step::Hang, Step::Hang]);
    let b = ScriptedProvider::new("b", 2).with_steps([b_step]);
    (a, b)
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_switch_to_fallback_which_completes() {
    let (a, b) = two_providers(Step::Complete("https://cdn.example/b/final.mp4".into()));
    let notifier = RecordingNotifier::new();
    let service = GenerationService::builder(orchestrator_config(&["a", "b"]))
        .providers([a.clone().into_arc(), b.clone().into_arc()])
        .notifier(Arc::new(notifier.clone()))
        .build()
        .unwrap();

    let outcome = service.generate(request_seconds(60)).await.unwrap();

    assert_eq!(outcome.selection.selected_provider, "a");
    assert_eq!(outcome.selection.fallback_providers, vec!["b"]);
    assert_provider_called!(a, 2);
    assert_provider_called!(b, 1);
    assert_eq!(a.history().await[0].duration.max_seconds(), 60);

    let a_perf = service.performance().get_performance("a").unwrap();
    assert_eq!(a_perf.failure_count, 2);
    assert_eq!(a_perf.success_count, 0);
    let b_perf = service.performance().get_performance("b").unwrap();
    assert_eq!(b_perf.success_count, 1);
    assert_eq!(b_perf.failure_count, 0);

    assert_eq!(outcome.status.state, JobState::Completed);
    assert_eq!(outcome.status.provider_id.as_deref(), Some("b"));
    assert_eq!(
        outcome.status.video_url.as_deref(),
        Some("https://cdn.example/b/final.mp4")
    );

    assert_eq!(outcome.report.calls(), 3);
    assert_eq!(outcome.report.delays, vec![Duration::from_millis(100)]);
    assert_eq!(outcome.report.switches.len(), 1);
    assert_eq!(outcome.report.switches[0].from, "a");
    assert_eq!(outcome.report.switches[0].to, "b");

    // Two failures stay below the default threshold of five
    let health = service.provider_health();
    assert_eq!(health[0].state, State::Closed);
    assert_eq!(health[0].failure_count, 2);

    assert!(notifier.wait_for(1, Duration::from_secs(1)).await);
    assert_eq!(
        notifier.states_for(&outcome.job_id).await,
        vec![JobState::Completed]
    );
    assert_eq!(service.recovery_statistics().provider_switches, 1);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_accepts_and_webhook_completes() {
    let (a, b) = two_providers(Step::Accept);
    let store = Arc::new(InMemoryJobStore::new());
    let notifier = RecordingNotifier::new();
    let service = GenerationService::builder(orchestrator_config(&["a", "b"]))
        .providers([a.clone().into_arc(), b.clone().into_arc()])
        .job_store(store.clone())
        .notifier(Arc::new(notifier.clone()))
        .build()
        .unwrap();

    let outcome = service.generate(request_seconds(60)).await.unwrap();
    assert_eq!(outcome.status.state, JobState::Processing);
    assert_eq!(outcome.status.provider_id.as_deref(), Some("b"));
    assert_eq!(outcome.status.provider_job_id.as_deref(), Some("b-job-1"));

    let body = primary_body(
        "b-job-1",
        "completed",
        Some("https://cdn.example/b/final.mp4"),
        now_ts(),
    );
    let receipt = service
        .process_webhook("b", &signed_headers(SIGNATURE_HEADER, WEBHOOK_SECRET, &body), &body)
        .await
        .unwrap();
    assert_eq!(receipt.disposition, Disposition::Applied);
    assert_eq!(receipt.job_id.as_deref(), Some(outcome.job_id.as_str()));

    let status = service.check_status(&outcome.job_id).await.unwrap();
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.provider_id.as_deref(), Some("b"));
    assert_eq!(store.get_job_status(&outcome.job_id).await.unwrap(), Some(status));

    assert_eq!(service.performance().get_performance("a").unwrap().failure_count, 2);
    assert_eq!(service.performance().get_performance("b").unwrap().success_count, 1);
    assert!(notifier.wait_for(1, Duration::from_secs(1)).await);
}
