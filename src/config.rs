//! Engine configuration.
//!
//! Central place for every tunable the pipeline reads: sub-extractor
//! confidence levels, suggestion tier thresholds, session lifetime, and
//! provider call policy. Components take the config by reference so a test
//! can tighten or loosen one knob without touching the rest.

use std::time::Duration;

/// Confidence assigned to every pattern-extracted entity.
pub const DEFAULT_PATTERN_CONFIDENCE: f32 = 0.9;

/// Confidence assigned to every model-extracted entity.
pub const DEFAULT_MODEL_CONFIDENCE: f32 = 0.7;

/// A calculator reaches the medium tier when at least this fraction of its
/// required fields is available.
pub const DEFAULT_MEDIUM_TIER_RATIO: f32 = 0.5;

/// How long an untouched session survives before the sweeper scrubs it.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Upper bound on a single LLM or retriever call.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(90);

/// Retries after a transient provider failure. Semantic failures
/// (rate limits, malformed output) are never retried.
pub const DEFAULT_PROVIDER_RETRIES: u32 = 1;

/// Cadence of the background TTL sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Evidence passages requested from the knowledge retriever per synthesis.
pub const DEFAULT_EVIDENCE_PASSAGES: usize = 4;

/// Tunables for extraction, suggestion, sessions, and provider calls.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub pattern_confidence: f32,
    pub model_confidence: f32,
    pub medium_tier_ratio: f32,
    pub session_ttl: Duration,
    pub provider_timeout: Duration,
    pub provider_retries: u32,
    pub sweep_interval: Duration,
    pub evidence_passages: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pattern_confidence: DEFAULT_PATTERN_CONFIDENCE,
            model_confidence: DEFAULT_MODEL_CONFIDENCE,
            medium_tier_ratio: DEFAULT_MEDIUM_TIER_RATIO,
            session_ttl: DEFAULT_SESSION_TTL,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            provider_retries: DEFAULT_PROVIDER_RETRIES,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            evidence_passages: DEFAULT_EVIDENCE_PASSAGES,
        }
    }
}
