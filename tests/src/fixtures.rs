//! Builders for requests, configurations and signed webhook deliveries.

use chrono::Utc;
use serde_json::{Value, json};
use vgen_foundation::{WebhookHeaders, sign_payload};
use vgen_kernel::config::{OrchestratorConfig, PayloadDialect, WebhookProviderConfig};
use vgen_kernel::{DurationClass, GenerationRequest};

/// Webhook secret every fixture provider is configured with.
pub const WEBHOOK_SECRET: &str = "whsec_fixture_7f3a";

/// Signature header used by [`orchestrator_config`] providers.
pub const SIGNATURE_HEADER: &str = "x-vgen-signature";

/// A request for a video of at least `seconds` seconds.
pub fn request_seconds(seconds: u32) -> GenerationRequest {
    GenerationRequest::new("Explain the quarterly roadmap in two minutes of narration.")
        .with_duration(DurationClass::from_seconds(seconds))
}

/// Fast retry timings and primary-dialect webhooks for each provider id.
pub fn orchestrator_config(providers: &[&str]) -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.recovery.retry_attempts = 2;
    config.recovery.base_delay_ms = 100;
    config.recovery.max_delay_ms = 1_000;
    config.recovery.attempt_timeout_ms = 5_000;
    for id in providers {
        config.webhooks.insert(
            id.to_string(),
            WebhookProviderConfig::new(WEBHOOK_SECRET)
                .with_signature_header(SIGNATURE_HEADER)
                .with_dialect(PayloadDialect::Primary)
                .with_tolerance_seconds(300)
                .with_retryable_codes(["FARM_BUSY"]),
        );
    }
    config
}

/// A primary-dialect callback body.
pub fn primary_body(video_id: &str, status: &str, video_url: Option<&str>, timestamp: i64) -> Vec<u8> {
    let mut body = json!({
        "video_id": video_id,
        "status": status,
        "timestamp": timestamp,
    });
    if let Some(url) = video_url {
        body["video_url"] = Value::String(url.to_string());
    }
    body.to_string().into_bytes()
}

/// A primary-dialect failure callback body.
pub fn primary_failure_body(video_id: &str, code: &str, message: &str, timestamp: i64) -> Vec<u8> {
    json!({
        "video_id": video_id,
        "status": "failed",
        "error": { "code": code, "message": message },
        "timestamp": timestamp,
    })
    .to_string()
    .into_bytes()
}

/// Current unix time in seconds.
pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

/// Headers carrying a valid `sha256=` signature of `body`.
pub fn signed_headers(header: &str, secret: &str, body: &[u8]) -> WebhookHeaders {
    WebhookHeaders::new().with(header, format!("sha256={}", sign_payload(secret, body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vgen_foundation::verify_signature;

    #[test]
    fn test_signed_headers_verify() {
        let body = primary_body("job-1", "completed", Some("https://cdn/v.mp4"), now_ts());
        let headers = signed_headers("X-VGen-Signature", WEBHOOK_SECRET, &body);

        let value = headers.get(SIGNATURE_HEADER).unwrap();
        assert!(verify_signature(WEBHOOK_SECRET, &body, value));
    }

    #[test]
    fn test_config_is_valid() {
        let config = orchestrator_config(&["alpha", "beta"]);
        config.validate().unwrap();
        assert_eq!(config.webhooks.len(), 2);
        assert_eq!(request_seconds(60).duration, DurationClass::Standard);
    }
}
