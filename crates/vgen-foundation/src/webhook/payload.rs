//! Provider payload dialects and their mapping to [`CanonicalStatus`].

use std::collections::HashSet;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use vgen_kernel::config::{PayloadDialect, WebhookProviderConfig};
use vgen_kernel::{CanonicalStatus, StatusError};

/// Classifies provider error codes as worth re-triggering generation or not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryabilityTable {
    retryable: HashSet<String>,
    non_retryable: HashSet<String>,
    default_retryable: bool,
}

impl RetryabilityTable {
    pub fn new<I, J, S>(retryable: I, non_retryable: J, default_retryable: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            retryable: retryable.into_iter().map(Into::into).collect(),
            non_retryable: non_retryable.into_iter().map(Into::into).collect(),
            default_retryable,
        }
    }

    pub fn classify(&self, code: Option<&str>) -> bool {
        match code {
            Some(code) if self.retryable.contains(code) => true,
            Some(code) if self.non_retryable.contains(code) => false,
            _ => self.default_retryable,
        }
    }
}

impl From<&WebhookProviderConfig> for RetryabilityTable {
    fn from(config: &WebhookProviderConfig) -> Self {
        Self::new(
            config.retryable_error_codes.iter().cloned(),
            config.non_retryable_error_codes.iter().cloned(),
            config.default_retryable,
        )
    }
}

/// `queued / processing / completed / failed`, unix-second timestamp.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PrimaryEvent {
    pub video_id: String,
    pub status: String,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub error: Option<PrimaryError>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PrimaryError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// `pending / processing / succeeded / failed`, RFC 3339 timestamp.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SecondaryEvent {
    pub id: String,
    pub state: String,
    #[serde(default)]
    pub result: Option<SecondaryResult>,
    #[serde(default)]
    pub failure: Option<SecondaryFailure>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SecondaryResult {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SecondaryFailure {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

/// A body that names a provider job but does not fit its dialect.
#[derive(Debug, Clone, PartialEq)]
pub struct UnrecognizedEvent {
    pub provider_job_id: String,
    /// The `status` / `state` word if there is one
    pub raw_status: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl UnrecognizedEvent {
    const JOB_ID_FIELDS: [&str; 2] = ["video_id", "id"];
    const STATUS_FIELDS: [&str; 3] = ["status", "state", "event"];

    fn from_value(value: &Value) -> Option<Self> {
        let provider_job_id = Self::JOB_ID_FIELDS
            .iter()
            .find_map(|field| match value.get(field)? {
                Value::String(id) if !id.trim().is_empty() => Some(id.clone()),
                Value::Number(id) => Some(id.to_string()),
                _ => None,
            })?;
        let raw_status = Self::STATUS_FIELDS
            .iter()
            .find_map(|field| value.get(field)?.as_str())
            .unwrap_or("unrecognized_payload")
            .to_string();
        let timestamp = match value.get("timestamp").and_then(Value::as_i64) {
            Some(ts) => Some(Utc.timestamp_opt(ts, 0).single().unwrap_or(DateTime::<Utc>::MIN_UTC)),
            None => value
                .get("created_at")
                .and_then(Value::as_str)
                .and_then(|at| DateTime::parse_from_rfc3339(at).ok())
                .map(|at| at.with_timezone(&Utc)),
        };
        Some(Self {
            provider_job_id,
            raw_status,
            timestamp,
        })
    }
}

/// A decoded webhook body, one variant per dialect.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    Primary(PrimaryEvent),
    Secondary(SecondaryEvent),
    /// Valid JSON naming a job, in a shape the dialect does not describe
    Unrecognized(UnrecognizedEvent),
}

/// Status words shared by both dialects after normalization.
enum Reported<'a> {
    Queued,
    Processing,
    Completed {
        video_url: Option<&'a str>,
        thumbnail_url: Option<&'a str>,
    },
    Failed {
        code: Option<&'a str>,
        message: Option<&'a str>,
    },
    Unknown,
}

impl ProviderEvent {
    /// Decode `body` in `dialect`.
    ///
    /// JSON that does not fit the dialect but still names a provider job
    /// (`video_id` or `id`) becomes [`ProviderEvent::Unrecognized`] so it can
    /// be recorded as unmapped. Only non-JSON bodies and bodies without a job
    /// id are errors.
    pub fn parse(dialect: PayloadDialect, body: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(body)?;
        let typed = match dialect {
            PayloadDialect::Primary => {
                PrimaryEvent::deserialize(&value).map(ProviderEvent::Primary)
            }
            PayloadDialect::Secondary => {
                SecondaryEvent::deserialize(&value).map(ProviderEvent::Secondary)
            }
        };
        typed.or_else(|err| {
            UnrecognizedEvent::from_value(&value)
                .map(ProviderEvent::Unrecognized)
                .ok_or(err)
        })
    }

    pub fn provider_job_id(&self) -> &str {
        match self {
            ProviderEvent::Primary(e) => &e.video_id,
            ProviderEvent::Secondary(e) => &e.id,
            ProviderEvent::Unrecognized(e) => &e.provider_job_id,
        }
    }

    pub fn raw_status(&self) -> &str {
        match self {
            ProviderEvent::Primary(e) => &e.status,
            ProviderEvent::Secondary(e) => &e.state,
            ProviderEvent::Unrecognized(e) => &e.raw_status,
        }
    }

    pub fn is_unrecognized(&self) -> bool {
        matches!(self, ProviderEvent::Unrecognized(_))
    }

    /// When the provider says the event was produced, if it says so.
    ///
    /// An out-of-range unix timestamp yields `Some(DateTime::MIN_UTC)` so it
    /// fails the freshness check rather than skipping it.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            ProviderEvent::Primary(e) => e
                .timestamp
                .map(|ts| Utc.timestamp_opt(ts, 0).single().unwrap_or(DateTime::<Utc>::MIN_UTC)),
            ProviderEvent::Secondary(e) => e.created_at,
            ProviderEvent::Unrecognized(e) => e.timestamp,
        }
    }

    fn reported(&self) -> Reported<'_> {
        match self {
            ProviderEvent::Primary(e) => match e.status.to_ascii_lowercase().as_str() {
                "queued" => Reported::Queued,
                "processing" => Reported::Processing,
                "completed" => Reported::Completed {
                    video_url: e.video_url.as_deref(),
                    thumbnail_url: e.thumbnail_url.as_deref(),
                },
                "failed" => Reported::Failed {
                    code: e.error.as_ref().and_then(|err| err.code.as_deref()),
                    message: e.error.as_ref().and_then(|err| err.message.as_deref()),
                },
                _ => Reported::Unknown,
            },
            ProviderEvent::Secondary(e) => match e.state.to_ascii_lowercase().as_str() {
                "pending" => Reported::Queued,
                "processing" => Reported::Processing,
                "succeeded" => Reported::Completed {
                    video_url: e.result.as_ref().and_then(|r| r.url.as_deref()),
                    thumbnail_url: e.result.as_ref().and_then(|r| r.thumbnail.as_deref()),
                },
                "failed" => Reported::Failed {
                    code: e.failure.as_ref().and_then(|f| f.code.as_deref()),
                    message: e.failure.as_ref().and_then(|f| f.detail.as_deref()),
                },
                _ => Reported::Unknown,
            },
            ProviderEvent::Unrecognized(_) => Reported::Unknown,
        }
    }

    /// Map to the canonical vocabulary. Statuses outside the dialect, and
    /// completions without a video URL, become `Unmapped`.
    pub fn to_status(&self, retryability: &RetryabilityTable) -> CanonicalStatus {
        match self.reported() {
            Reported::Queued => CanonicalStatus::queued(),
            Reported::Processing => CanonicalStatus::processing(),
            Reported::Completed {
                video_url: Some(url),
                thumbnail_url,
            } => CanonicalStatus::completed(url).with_thumbnail(thumbnail_url.map(str::to_string)),
            Reported::Completed { video_url: None, .. } | Reported::Unknown => {
                CanonicalStatus::unmapped(self.raw_status())
            }
            Reported::Failed { code, message } => CanonicalStatus::failed(
                StatusError::new(message.unwrap_or("provider reported failure"))
                    .with_code(code.map(str::to_string))
                    .with_retryable(retryability.classify(code)),
            ),
        }
    }
}
