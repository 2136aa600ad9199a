//! Cancelling generations that are still talking to a provider.

use std::time::Duration;
use vgen_foundation::GenerationService;
use vgen_kernel::{ErrorKind, JobState};
use vgen_testing::fixtures::{orchestrator_config, request_seconds};
use vgen_testing::{ScriptedProvider, Step, assert_provider_called};

const JOB_ID: &str = "job-cancel-1";

#[tokio::test(start_paused = true)]
async fn test_cancel_reaches_running_generation() {
    let a = ScriptedProvider::new("a", 1).with_steps([Step::Hang, Step::Hang]);
    let service = GenerationService::builder(orchestrator_config(&["a"]))
        .provider(a.clone().into_arc())
        .build()
        .unwrap();

    let (result, cancelled) = tokio::join!(
        service.generate_as(JOB_ID, request_seconds(30), None),
        async {
            // Well inside the 5s attempt timeout
            tokio::time::sleep(Duration::from_secs(1)).await;
            assert_eq!(service.in_flight(), 1);
            let during = service.check_status(JOB_ID).await.unwrap();
            assert_eq!(during.state, JobState::Queued);
            service.cancel(JOB_ID).await.unwrap()
        }
    );

    assert_eq!(cancelled.state, JobState::Cancelled);
    let failure = result.unwrap_err();
    assert_eq!(failure.kind(), ErrorKind::Cancelled);
    assert_eq!(failure.job_id.as_deref(), Some(JOB_ID));
    assert_provider_called!(a, 1);

    assert_eq!(service.in_flight(), 0);
    assert_eq!(service.recovery_statistics().cancelled, 1);
    let status = service.check_status(JOB_ID).await.unwrap();
    assert_eq!(status.state, JobState::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_caller_job_id_must_be_fresh() {
    let a = ScriptedProvider::new("a", 1);
    let service = GenerationService::builder(orchestrator_config(&["a"]))
        .provider(a.clone().into_arc())
        .build()
        .unwrap();

    let outcome = service
        .generate_as(JOB_ID, request_seconds(30), None)
        .await
        .unwrap();
    assert_eq!(outcome.job_id, JOB_ID);
    assert_eq!(outcome.status.state, JobState::Processing);

    let reused = service
        .generate_as(JOB_ID, request_seconds(30), None)
        .await
        .unwrap_err();
    assert_eq!(reused.kind(), ErrorKind::Validation);
    assert!(reused.job_id.is_none());

    let blank = service
        .generate_as("  ", request_seconds(30), None)
        .await
        .unwrap_err();
    assert_eq!(blank.kind(), ErrorKind::Validation);
    assert_provider_called!(a, 1);

    // The rejected reuse left the original job alone
    let status = service.check_status(JOB_ID).await.unwrap();
    assert_eq!(status.state, JobState::Processing);
    assert_eq!(status.provider_job_id.as_deref(), Some("a-job-1"));
}
