//! Webhook secret collaborator.
//!
//! Secrets are rotated outside this crate, so they are looked up per call
//! rather than cached at construction.

use std::fmt;
use std::time::Duration;

use crate::config::PayloadDialect;

/// Validation material for one provider's webhooks.
#[derive(Clone)]
pub struct WebhookSecret {
    pub secret: String,
    /// Header carrying the HMAC signature (lowercase)
    pub signature_header: String,
    pub timestamp_tolerance: Duration,
    pub dialect: PayloadDialect,
}

impl fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookSecret")
            .field("secret", &"<redacted>")
            .field("signature_header", &self.signature_header)
            .field("timestamp_tolerance", &self.timestamp_tolerance)
            .field("dialect", &self.dialect)
            .finish()
    }
}

pub trait SecretSource: Send + Sync {
    /// Current webhook secret for `provider`, or `None` if the provider has
    /// no webhook configuration.
    fn webhook_secret(&self, provider: &str) -> Option<WebhookSecret>;
}
