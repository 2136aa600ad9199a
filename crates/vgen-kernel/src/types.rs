//! Domain types for video-generation orchestration.
//!
//! Requests, provider descriptors and the canonical status vocabulary every
//! provider-specific status is mapped into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GenerationError;

/// Maximum accepted script length, in characters.
pub const MAX_SCRIPT_CHARS: usize = 20_000;

// ============================================================================
// Request vocabulary
// ============================================================================

/// Requested video length bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DurationClass {
    /// Up to 30 seconds
    Short,
    /// Up to 60 seconds
    #[default]
    Standard,
    /// Up to 3 minutes
    Long,
    /// Up to 10 minutes
    Extended,
}

impl DurationClass {
    /// Upper bound of the bucket, in seconds.
    pub fn max_seconds(&self) -> u32 {
        match self {
            DurationClass::Short => 30,
            DurationClass::Standard => 60,
            DurationClass::Long => 180,
            DurationClass::Extended => 600,
        }
    }

    /// Smallest bucket able to hold `seconds`.
    pub fn from_seconds(seconds: u32) -> Self {
        match seconds {
            0..=30 => DurationClass::Short,
            31..=60 => DurationClass::Standard,
            61..=180 => DurationClass::Long,
            _ => DurationClass::Extended,
        }
    }
}

/// Output resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Sd480,
    Hd720,
    FullHd1080,
    Uhd2160,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Sd480 => write!(f, "480p"),
            Resolution::Hd720 => write!(f, "720p"),
            Resolution::FullHd1080 => write!(f, "1080p"),
            Resolution::Uhd2160 => write!(f, "2160p"),
        }
    }
}

/// Container format of the rendered artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoFormat {
    #[default]
    Mp4,
    Webm,
    Mov,
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoFormat::Mp4 => write!(f, "mp4"),
            VideoFormat::Webm => write!(f, "webm"),
            VideoFormat::Mov => write!(f, "mov"),
        }
    }
}

/// Quality level requested by the caller. Determines the minimum resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    Draft,
    #[default]
    Standard,
    High,
    Ultra,
}

impl QualityLevel {
    pub fn resolution(&self) -> Resolution {
        match self {
            QualityLevel::Draft => Resolution::Sd480,
            QualityLevel::Standard => Resolution::Hd720,
            QualityLevel::High => Resolution::FullHd1080,
            QualityLevel::Ultra => Resolution::Uhd2160,
        }
    }
}

/// How urgently the caller needs the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    #[default]
    Normal,
    High,
}

/// Canonical generation request. Immutable input to provider selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Narration / avatar script
    pub script: String,
    pub duration: DurationClass,
    pub quality: QualityLevel,
    pub urgency: Urgency,
    pub format: VideoFormat,
    /// Whether the narration must use a cloned voice
    #[serde(default)]
    pub voice_cloning: bool,
    /// Provider the caller would like, if it can satisfy the request
    #[serde(default)]
    pub preferred_provider: Option<String>,
    /// Maximum acceptable estimated cost
    #[serde(default)]
    pub cost_ceiling: Option<f64>,
}

impl GenerationRequest {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            duration: DurationClass::default(),
            quality: QualityLevel::default(),
            urgency: Urgency::default(),
            format: VideoFormat::default(),
            voice_cloning: false,
            preferred_provider: None,
            cost_ceiling: None,
        }
    }

    pub fn with_duration(mut self, duration: DurationClass) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_quality(mut self, quality: QualityLevel) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    pub fn with_format(mut self, format: VideoFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_voice_cloning(mut self, enabled: bool) -> Self {
        self.voice_cloning = enabled;
        self
    }

    pub fn with_preferred_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.preferred_provider = Some(provider_id.into());
        self
    }

    pub fn with_cost_ceiling(mut self, ceiling: f64) -> Self {
        self.cost_ceiling = Some(ceiling);
        self
    }

    /// Hard requirements a provider must satisfy to be considered at all.
    pub fn requirements(&self) -> Requirements {
        Requirements {
            min_duration_seconds: self.duration.max_seconds(),
            resolution: self.quality.resolution(),
            format: self.format,
            voice_cloning: self.voice_cloning,
        }
    }

    /// Reject malformed requests before any provider is contacted.
    pub fn validate(&self) -> Result<(), GenerationError> {
        let script = self.script.trim();
        if script.is_empty() {
            return Err(GenerationError::Validation("script must not be empty".into()));
        }
        let chars = script.chars().count();
        if chars > MAX_SCRIPT_CHARS {
            return Err(GenerationError::Validation(format!(
                "script is {chars} characters, limit is {MAX_SCRIPT_CHARS}"
            )));
        }
        if let Some(ceiling) = self.cost_ceiling {
            if !ceiling.is_finite() || ceiling <= 0.0 {
                return Err(GenerationError::Validation(format!(
                    "cost ceiling must be a positive number, got {ceiling}"
                )));
            }
        }
        if let Some(preferred) = &self.preferred_provider {
            if preferred.trim().is_empty() {
                return Err(GenerationError::Validation(
                    "preferred provider must not be blank".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Hard requirements derived from a [`GenerationRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    pub min_duration_seconds: u32,
    pub resolution: Resolution,
    pub format: VideoFormat,
    pub voice_cloning: bool,
}

impl fmt::Display for Requirements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}s {} {}{}",
            self.min_duration_seconds,
            self.resolution,
            self.format,
            if self.voice_cloning { " +voice-cloning" } else { "" }
        )
    }
}

// ============================================================================
// Provider description
// ============================================================================

/// What a provider declares it can render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub max_duration_seconds: u32,
    pub resolutions: Vec<Resolution>,
    pub formats: Vec<VideoFormat>,
    #[serde(default)]
    pub voice_cloning: bool,
    #[serde(default)]
    pub custom_avatars: bool,
}

/// Why a capability set does not satisfy a set of requirements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityMismatch {
    DurationTooLong { requested: u32, supported: u32 },
    ResolutionUnsupported(Resolution),
    FormatUnsupported(VideoFormat),
    VoiceCloningUnsupported,
}

impl fmt::Display for CapabilityMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityMismatch::DurationTooLong { requested, supported } => {
                write!(f, "duration {requested}s exceeds limit {supported}s")
            }
            CapabilityMismatch::ResolutionUnsupported(r) => write!(f, "resolution {r} unsupported"),
            CapabilityMismatch::FormatUnsupported(fmt_) => write!(f, "format {fmt_} unsupported"),
            CapabilityMismatch::VoiceCloningUnsupported => write!(f, "voice cloning unsupported"),
        }
    }
}

impl CapabilitySet {
    /// Everything up to `max_duration_seconds`, every resolution and format.
    pub fn full(max_duration_seconds: u32) -> Self {
        Self {
            max_duration_seconds,
            resolutions: vec![
                Resolution::Sd480,
                Resolution::Hd720,
                Resolution::FullHd1080,
                Resolution::Uhd2160,
            ],
            formats: vec![VideoFormat::Mp4, VideoFormat::Webm, VideoFormat::Mov],
            voice_cloning: true,
            custom_avatars: true,
        }
    }

    pub fn satisfies(&self, requirements: &Requirements) -> Result<(), CapabilityMismatch> {
        if requirements.min_duration_seconds > self.max_duration_seconds {
            return Err(CapabilityMismatch::DurationTooLong {
                requested: requirements.min_duration_seconds,
                supported: self.max_duration_seconds,
            });
        }
        if !self.resolutions.contains(&requirements.resolution) {
            return Err(CapabilityMismatch::ResolutionUnsupported(requirements.resolution));
        }
        if !self.formats.contains(&requirements.format) {
            return Err(CapabilityMismatch::FormatUnsupported(requirements.format));
        }
        if requirements.voice_cloning && !self.voice_cloning {
            return Err(CapabilityMismatch::VoiceCloningUnsupported);
        }
        Ok(())
    }
}

/// Provider-declared request budget. Advisory; enforced by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub requests_per_minute: u32,
    pub max_concurrent_jobs: u32,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            max_concurrent_jobs: 10,
        }
    }
}

/// Identity and static properties of a provider. Immutable after registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: String,
    pub display_name: String,
    /// Static priority rank, 1 is the most preferred
    pub priority: u32,
    pub capabilities: CapabilitySet,
    #[serde(default)]
    pub rate_limit: RateLimitPolicy,
    /// Estimated cost per rendered second
    #[serde(default)]
    pub cost_per_second: f64,
}

impl ProviderDescriptor {
    pub fn new(id: impl Into<String>, priority: u32, capabilities: CapabilitySet) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            priority,
            capabilities,
            rate_limit: RateLimitPolicy::default(),
            cost_per_second: 0.0,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_cost_per_second(mut self, cost: f64) -> Self {
        self.cost_per_second = cost;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitPolicy) -> Self {
        self.rate_limit = rate_limit;
        self
    }
}

// ============================================================================
// Selection output
// ============================================================================

/// Score assigned to one candidate during selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderScore {
    pub provider_id: String,
    pub score: f64,
}

/// Outcome of provider selection. Produced once per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub selected_provider: String,
    /// Remaining candidates in descending score order
    pub fallback_providers: Vec<String>,
    pub score: f64,
    /// Factors behind the top choice, strongest first
    pub reasoning: Vec<String>,
    pub estimated_cost: f64,
    /// Every scored candidate, in the same order as the chain
    pub candidates: Vec<ProviderScore>,
}

impl SelectionResult {
    /// Selected provider followed by the fallback chain.
    pub fn provider_chain(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.selected_provider.as_str())
            .chain(self.fallback_providers.iter().map(String::as_str))
    }
}

// ============================================================================
// Job tracking
// ============================================================================

/// Correlates an internal request id with a provider-native job id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMapping {
    pub internal_id: String,
    pub provider_id: String,
    pub provider_job_id: String,
    pub created_at: DateTime<Utc>,
}

impl JobMapping {
    pub fn new(
        internal_id: impl Into<String>,
        provider_id: impl Into<String>,
        provider_job_id: impl Into<String>,
    ) -> Self {
        Self {
            internal_id: internal_id.into(),
            provider_id: provider_id.into(),
            provider_job_id: provider_job_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// Provider-agnostic job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
    /// A provider reported something outside its known vocabulary
    Unmapped,
}

impl JobState {
    /// Terminal states are never overwritten.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
            JobState::Unmapped => "unmapped",
        };
        f.write_str(s)
    }
}

/// Error details attached to a failed status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusError {
    pub code: Option<String>,
    pub message: String,
    /// Whether re-triggering generation may succeed
    pub retryable: bool,
}

impl StatusError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn with_code(mut self, code: Option<String>) -> Self {
        self.code = code;
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}

/// The status contract surfaced to callers regardless of provider vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalStatus {
    pub state: JobState,
    pub provider_id: Option<String>,
    pub provider_job_id: Option<String>,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub error: Option<StatusError>,
    /// Provider status string when `state` is `Unmapped`
    pub raw_status: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl CanonicalStatus {
    pub fn new(state: JobState) -> Self {
        Self {
            state,
            provider_id: None,
            provider_job_id: None,
            video_url: None,
            thumbnail_url: None,
            error: None,
            raw_status: None,
            updated_at: Utc::now(),
        }
    }

    pub fn queued() -> Self {
        Self::new(JobState::Queued)
    }

    pub fn processing() -> Self {
        Self::new(JobState::Processing)
    }

    pub fn completed(video_url: impl Into<String>) -> Self {
        let mut status = Self::new(JobState::Completed);
        status.video_url = Some(video_url.into());
        status
    }

    pub fn failed(error: StatusError) -> Self {
        let mut status = Self::new(JobState::Failed);
        status.error = Some(error);
        status
    }

    pub fn cancelled() -> Self {
        Self::new(JobState::Cancelled)
    }

    pub fn unmapped(raw_status: impl Into<String>) -> Self {
        let mut status = Self::new(JobState::Unmapped);
        status.raw_status = Some(raw_status.into());
        status
    }

    pub fn with_provider(
        mut self,
        provider_id: impl Into<String>,
        provider_job_id: impl Into<String>,
    ) -> Self {
        self.provider_id = Some(provider_id.into());
        self.provider_job_id = Some(provider_job_id.into());
        self
    }

    pub fn with_thumbnail(mut self, thumbnail_url: Option<String>) -> Self {
        self.thumbnail_url = thumbnail_url;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
