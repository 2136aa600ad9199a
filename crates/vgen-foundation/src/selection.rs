//! Provider Selection Engine
//!
//! Chooses the provider most likely to satisfy a request, plus an ordered
//! fallback chain.
//!
//! # Algorithm
//!
//! 1. Hard filter: declared capabilities, the adapter's own `can_handle`,
//!    and the request's cost ceiling. Excluded providers are never ranked.
//! 2. Availability filter: providers whose circuit refuses calls are skipped.
//! 3. Score each remaining provider:
//!
//! ```text
//! score = w_priority    * (1 / priority_rank)
//!       + w_reliability * success_rate          (0.9 when unobserved)
//!       + w_speed       * speed_score(mean ms)  (0.5 when unobserved)
//!       + preferred_bonus                       (preferred provider only)
//! ```
//!
//!    `w_speed` is multiplied by `urgent_speed_factor` for high-urgency
//!    requests. Defaults: 0.30 / 0.50 / 0.20, bonus 0.25, factor 2.0.
//! 4. Sort by score descending; equal scores go to the lower priority rank,
//!    then to the lower id. There is no randomness.

use tracing::{debug, info};
use vgen_kernel::config::SelectionWeights;
use vgen_kernel::{
    GenerationError, GenerationRequest, GenerationResult, ProviderScore, SelectionResult, Urgency,
};

use crate::performance::{PerformanceTracker, speed_score};
use crate::registry::{ProviderRegistry, RegisteredProvider};

/// Success rate assumed for providers with no recorded calls
pub const UNOBSERVED_SUCCESS_RATE: f64 = 0.9;
/// Speed score assumed for providers with no recorded calls
pub const UNOBSERVED_SPEED_SCORE: f64 = 0.5;

const SCORE_EPSILON: f64 = 1e-9;

/// Per-factor contributions behind one provider's score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    pub provider_id: String,
    pub priority_rank: u32,
    pub priority: f64,
    pub reliability: f64,
    pub speed: f64,
    pub preferred: f64,
    pub success_rate: f64,
    pub speed_score: f64,
    /// Whether the tracker had data for this provider
    pub observed: bool,
    pub estimated_cost: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.priority + self.reliability + self.speed + self.preferred
    }

    fn reasoning(&self, urgent: bool) -> Vec<String> {
        let source = if self.observed { "observed" } else { "no history" };
        let mut factors = vec![
            (
                self.reliability,
                format!(
                    "success rate {:.2} ({source}) contributes {:.3}",
                    self.success_rate, self.reliability
                ),
            ),
            (
                self.priority,
                format!(
                    "priority rank {} contributes {:.3}",
                    self.priority_rank, self.priority
                ),
            ),
            (
                self.speed,
                format!(
                    "speed score {:.2}{} contributes {:.3}",
                    self.speed_score,
                    if urgent { " (urgent)" } else { "" },
                    self.speed
                ),
            ),
        ];
        if self.preferred > 0.0 {
            factors.push((
                self.preferred,
                format!("preferred provider bonus contributes {:.3}", self.preferred),
            ));
        }
        factors.sort_by(|a, b| b.0.total_cmp(&a.0));
        factors.into_iter().map(|(_, text)| text).collect()
    }
}

/// Stateless ranking policy. Live data comes from the registry (circuits)
/// and the tracker (performance) passed to each call.
#[derive(Debug, Clone, Default)]
pub struct SelectionEngine {
    weights: SelectionWeights,
}

impl SelectionEngine {
    pub fn new(weights: SelectionWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &SelectionWeights {
        &self.weights
    }

    pub fn select_optimal_provider(
        &self,
        request: &GenerationRequest,
        registry: &ProviderRegistry,
        tracker: &PerformanceTracker,
    ) -> GenerationResult<SelectionResult> {
        let requirements = request.requirements();
        let mut exclusions: Vec<String> = Vec::new();

        let capable: Vec<&RegisteredProvider> = registry
            .iter()
            .filter(|provider| match self.exclusion_reason(provider, request) {
                Some(reason) => {
                    debug!(provider = %provider.id(), %reason, "provider excluded");
                    exclusions.push(format!("{}: {reason}", provider.id()));
                    false
                }
                None => true,
            })
            .collect();

        if capable.is_empty() {
            let detail = if exclusions.is_empty() {
                "no providers registered".to_string()
            } else {
                exclusions.join("; ")
            };
            return Err(GenerationError::no_eligible_provider(format!(
                "no provider satisfies {requirements}: {detail}"
            )));
        }

        let available: Vec<&RegisteredProvider> = capable
            .iter()
            .copied()
            .filter(|provider| {
                let open = !provider.breaker.is_available();
                if open {
                    exclusions.push(format!("{}: circuit open", provider.id()));
                }
                !open
            })
            .collect();

        if available.is_empty() {
            return Err(GenerationError::no_eligible_provider(format!(
                "all {} capable providers have open circuits",
                capable.len()
            )));
        }

        let mut ranked: Vec<ScoreBreakdown> = available
            .iter()
            .map(|provider| self.score(provider, request, tracker))
            .collect();
        ranked.sort_by(|a, b| {
            let (sa, sb) = (a.total(), b.total());
            if (sa - sb).abs() <= SCORE_EPSILON {
                a.priority_rank
                    .cmp(&b.priority_rank)
                    .then_with(|| a.provider_id.cmp(&b.provider_id))
            } else {
                sb.total_cmp(&sa)
            }
        });

        let top = &ranked[0];
        let mut reasoning = top.reasoning(request.urgency == Urgency::High);
        if let Some(preferred) = request.preferred_provider.as_deref() {
            if preferred != top.provider_id {
                let why = exclusions
                    .iter()
                    .find(|e| e.starts_with(&format!("{preferred}: ")))
                    .cloned()
                    .unwrap_or_else(|| format!("{preferred}: outscored"));
                reasoning.push(format!("preferred provider not selected ({why})"));
            }
        }
        if !exclusions.is_empty() {
            reasoning.push(format!(
                "{} provider(s) excluded: {}",
                exclusions.len(),
                exclusions.join("; ")
            ));
        }

        let result = SelectionResult {
            selected_provider: top.provider_id.clone(),
            fallback_providers: ranked[1..].iter().map(|s| s.provider_id.clone()).collect(),
            score: top.total(),
            reasoning,
            estimated_cost: top.estimated_cost,
            candidates: ranked
                .iter()
                .map(|s| ProviderScore {
                    provider_id: s.provider_id.clone(),
                    score: s.total(),
                })
                .collect(),
        };

        info!(
            provider = %result.selected_provider,
            score = result.score,
            fallbacks = result.fallback_providers.len(),
            "provider selected"
        );
        Ok(result)
    }

    /// Score breakdown for one provider, without any filtering.
    pub fn score(
        &self,
        provider: &RegisteredProvider,
        request: &GenerationRequest,
        tracker: &PerformanceTracker,
    ) -> ScoreBreakdown {
        let descriptor = provider.descriptor();
        let rank = descriptor.priority.max(1);
        let performance = tracker.get_performance(provider.id());

        let (success_rate, speed) = match &performance {
            Some(perf) if perf.total_requests > 0 => {
                (perf.success_rate, speed_score(perf.average_response_time_ms))
            }
            _ => (UNOBSERVED_SUCCESS_RATE, UNOBSERVED_SPEED_SCORE),
        };

        let speed_weight = if request.urgency == Urgency::High {
            self.weights.speed * self.weights.urgent_speed_factor
        } else {
            self.weights.speed
        };

        let preferred = match request.preferred_provider.as_deref() {
            Some(id) if id == provider.id() => self.weights.preferred_bonus,
            _ => 0.0,
        };

        ScoreBreakdown {
            provider_id: provider.id().to_string(),
            priority_rank: rank,
            priority: self.weights.priority / f64::from(rank),
            reliability: self.weights.reliability * success_rate,
            speed: speed_weight * speed,
            preferred,
            success_rate,
            speed_score: speed,
            observed: performance.is_some(),
            estimated_cost: provider.adapter.estimated_cost(request),
        }
    }

    fn exclusion_reason(
        &self,
        provider: &RegisteredProvider,
        request: &GenerationRequest,
    ) -> Option<String> {
        let requirements = request.requirements();
        if let Err(mismatch) = provider.descriptor().capabilities.satisfies(&requirements) {
            return Some(mismatch.to_string());
        }
        if !provider.adapter.can_handle(&requirements) {
            return Some("adapter declined requirements".to_string());
        }
        if let Some(ceiling) = request.cost_ceiling {
            let cost = provider.adapter.estimated_cost(request);
            if cost > ceiling {
                return Some(format!("estimated cost {cost:.2} exceeds ceiling {ceiling:.2}"));
            }
        }
        None
    }
}
