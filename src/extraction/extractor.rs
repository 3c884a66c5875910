//! Hybrid extractor: patterns first, model for the remainder, dedup last.

use std::collections::HashSet;
use std::sync::Arc;

use super::model;
use super::patterns;
use super::types::{EntitySet, ExtractionOutcome};
use crate::config::EngineConfig;
use crate::fields::{FieldSpec, FIELD_CATALOG};
use crate::provider::{call_with_retry, LlmProvider};

/// Runs both sub-extractors over a narrative and merges their output.
///
/// Extraction never fails: if the model backend is unreachable the outcome
/// is flagged degraded and carries the pattern results that were still
/// obtainable.
pub struct EntityExtractor {
    provider: Arc<dyn LlmProvider>,
    config: EngineConfig,
}

impl EntityExtractor {
    pub fn new(provider: Arc<dyn LlmProvider>, config: EngineConfig) -> Self {
        Self { provider, config }
    }

    pub async fn extract(&self, narrative: &str) -> ExtractionOutcome {
        let raw_patterns = patterns::pattern_entities(narrative, self.config.pattern_confidence);
        tracing::debug!(pattern_hits = raw_patterns.len(), "pattern sub-extractor finished");

        let resolved: HashSet<&str> = raw_patterns.iter().map(|e| e.field.as_str()).collect();
        let outstanding: Vec<&'static FieldSpec> = FIELD_CATALOG
            .iter()
            .filter(|spec| !resolved.contains(spec.key))
            .collect();

        let mut raw = raw_patterns;
        let mut degraded = false;
        let mut notes = Vec::new();

        if !outstanding.is_empty() {
            let prompt = model::build_extraction_prompt(narrative, &outstanding);
            let result = call_with_retry(
                "model_extraction",
                self.config.provider_timeout,
                self.config.provider_retries,
                || self.provider.generate(&prompt, model::EXTRACTION_SYSTEM_PROMPT),
            )
            .await;

            match result {
                Ok(reply) => {
                    let model_entities =
                        model::parse_model_entities(&reply, self.config.model_confidence);
                    tracing::debug!(model_hits = model_entities.len(), "model sub-extractor finished");
                    raw.extend(model_entities);
                }
                Err(e) => {
                    degraded = true;
                    tracing::warn!(error = %e, "model sub-extractor unavailable, keeping pattern results");
                    notes.push("Model extraction unavailable; results are pattern-only.".to_string());
                }
            }
        }

        let entities = EntitySet::from_entities(raw);
        tracing::info!(fields = entities.len(), degraded, "extraction finished");

        ExtractionOutcome {
            entities,
            degraded,
            notes,
        }
    }
}
