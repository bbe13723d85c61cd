//! Decision orchestration: cache, provider call with pacing and retry,
//! acceptance gate, heuristic fallback.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, info, instrument, warn};

use crate::analysis::features::Features;
use crate::config::DecisionConfig;
use crate::decision::cache::{cache_key, DecisionCache};
use crate::decision::prompt::{build_prompt, parse_verdict, SYSTEM_PROMPT};
use crate::decision::provider::{LlmProvider, ProviderError};
use crate::decision::{coefficient, heuristic};
use crate::model::{MatchSnapshot, Recommendation, RecommendationKind};

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub min_request_interval: Duration,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub cache_ttl: Duration,
    /// Consecutive exhausted calls before the provider is dropped for good.
    pub max_provider_failures: u32,
}

impl From<&DecisionConfig> for EngineSettings {
    fn from(config: &DecisionConfig) -> Self {
        Self {
            min_request_interval: Duration::from_millis(config.min_request_interval_ms),
            max_attempts: config.max_attempts.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            cache_ttl: Duration::from_secs(config.cache_ttl_seconds),
            max_provider_failures: config.max_provider_failures.max(1),
        }
    }
}

pub struct DecisionEngine {
    provider: Option<Box<dyn LlmProvider>>,
    limiter: Option<Limiter>,
    settings: EngineSettings,
    cache: DecisionCache,
    consecutive_failures: u32,
}

impl DecisionEngine {
    pub fn new(provider: Option<Box<dyn LlmProvider>>, settings: EngineSettings) -> Self {
        let limiter = Quota::with_period(settings.min_request_interval)
            .map(|quota| RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN)));

        Self {
            provider,
            limiter,
            cache: DecisionCache::new(settings.cache_ttl),
            settings,
            consecutive_failures: 0,
        }
    }

    /// Heuristic-only engine.
    pub fn heuristic(settings: EngineSettings) -> Self {
        Self::new(None, settings)
    }

    pub fn provider_name(&self) -> Option<&str> {
        self.provider.as_deref().map(|p| p.name())
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Decide one eligible snapshot. Never fails: provider trouble falls back
    /// to the heuristic for this snapshot only.
    #[instrument(skip(self, snapshot, features), fields(sport = %snapshot.sport, home = %snapshot.team1, away = %snapshot.team2))]
    pub async fn decide(&mut self, snapshot: &MatchSnapshot, features: &Features) -> Option<Recommendation> {
        let key = cache_key(snapshot);
        if let Some(cached) = self.cache.get(&key) {
            debug!(hit = cached.is_some(), "Decision cache hit");
            return cached;
        }

        let decision = match heuristic::win_value(snapshot, features) {
            // Nobody leads: nothing a model could recommend either.
            None => None,
            Some(expected) => match self.ask_provider(snapshot, features, &expected).await {
                Some(Ok(text)) => self.accept_verdict(snapshot, features, &text),
                Some(Err(e)) => {
                    warn!(error = %e, "Provider failed — using heuristic for this match");
                    heuristic::decide(snapshot, features)
                }
                None => heuristic::decide(snapshot, features),
            },
        };

        self.cache.insert(key, decision.clone());
        decision
    }

    /// `None` when no provider is active.
    async fn ask_provider(
        &mut self,
        snapshot: &MatchSnapshot,
        features: &Features,
        expected: &str,
    ) -> Option<Result<String, ProviderError>> {
        let provider = self.provider.as_deref()?;
        let prompt = build_prompt(snapshot, features, expected);
        let result = call_with_retry(provider, self.limiter.as_ref(), &self.settings, &prompt).await;

        match &result {
            Ok(_) => self.consecutive_failures = 0,
            Err(_) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.settings.max_provider_failures {
                    warn!(
                        provider = provider.name(),
                        failures = self.consecutive_failures,
                        "Provider marked unavailable for the rest of the process"
                    );
                    self.provider = None;
                }
            }
        }
        Some(result)
    }

    fn accept_verdict(&self, snapshot: &MatchSnapshot, features: &Features, text: &str) -> Option<Recommendation> {
        let provider = self.provider_name().unwrap_or("llm").to_string();
        let verdict = match parse_verdict(text) {
            Ok(Some(verdict)) => verdict,
            Ok(None) => {
                debug!(provider = %provider, "Model declined");
                return None;
            }
            Err(e) => {
                warn!(provider = %provider, error = %e, "Invalid model output — no recommendation");
                return None;
            }
        };

        // Gate on the model's exact value; truncation below keeps it on the same side.
        let threshold = snapshot.sport.threshold();
        if verdict.confidence < threshold {
            debug!(confidence = %verdict.confidence, threshold = %threshold, "Model confidence below threshold");
            return None;
        }

        let confidence = verdict
            .confidence
            .min(Decimal::ONE)
            .round_dp_with_strategy(2, RoundingStrategy::ToZero);
        info!(
            provider = %provider,
            value = %verdict.value,
            %confidence,
            "Model recommendation accepted"
        );

        Some(Recommendation {
            snapshot: snapshot.clone(),
            kind: RecommendationKind::Win,
            coefficient: Some(coefficient::resolve(
                snapshot,
                coefficient::win_labels(features.leader),
                confidence,
            )),
            value: verdict.value,
            confidence,
            rationale: verdict.reasoning,
            decided_by: provider,
        })
    }
}

/// Paced, bounded retry around one provider call. Backoff is
/// `retry_backoff * attempt`.
async fn call_with_retry(
    provider: &dyn LlmProvider,
    limiter: Option<&Limiter>,
    settings: &EngineSettings,
    prompt: &str,
) -> Result<String, ProviderError> {
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        if let Some(limiter) = limiter {
            limiter.until_ready().await;
        }

        match provider.complete(SYSTEM_PROMPT, prompt).await {
            Ok(text) => return Ok(text),
            Err(e) => {
                if !e.is_retryable() || attempt >= settings.max_attempts {
                    return Err(e);
                }

                let backoff = settings.retry_backoff * attempt;
                warn!(
                    provider = provider.name(),
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Retrying after transient failure"
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
