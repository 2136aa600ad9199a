//! Webhook Ingestion
//!
//! Providers report job progress asynchronously. Each inbound call walks
//! `received -> validated -> mapped -> applied`:
//!
//! - **validated**: the provider has a webhook secret, the HMAC-SHA256
//!   signature over the raw body matches (constant-time), and the payload
//!   timestamp, if any, is within tolerance. Failure here rejects the call
//!   and nothing downstream runs.
//! - **mapped**: the body is decoded in the provider's dialect and its status
//!   mapped to [`CanonicalStatus`](vgen_kernel::CanonicalStatus). Unknown
//!   statuses become `unmapped` instead of being dropped.
//! - **applied**: the provider job id is resolved through the job mapping and
//!   the status written unless the job is already terminal.
//!
//! ```rust,ignore
//! let ingestor = WebhookIngestor::new(secrets, store, notifier)
//!     .with_retryability_from(&config);
//! let receipt = ingestor.process_webhook("heygen", &headers, &body).await?;
//! ```

mod ingest;
mod payload;
mod secrets;
mod signature;

pub use ingest::{Disposition, WebhookError, WebhookHeaders, WebhookIngestor, WebhookReceipt, WebhookStage};
pub use payload::{
    PrimaryError, PrimaryEvent, ProviderEvent, RetryabilityTable, SecondaryEvent,
    SecondaryFailure, SecondaryResult,
};
pub use secrets::StaticSecretSource;
pub use signature::{SIGNATURE_PREFIX, sign_payload, verify_signature};
