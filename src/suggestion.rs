//! Calculator applicability ranking.
//!
//! Pure scoring over an extracted entity set and a requirement registry: no
//! provider calls, no clocks, no randomness. The same inputs always produce
//! the same ranked list, which is what makes the review step reproducible
//! and the tier rules testable in isolation.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::extraction::EntitySet;
use crate::registry::{CalculatorRegistry, CalculatorRequirement};

// ─── Public types ────────────────────────────────────────────────────────────

/// Applicability tier. Ordering is declaration order, so `High` compares
/// greater than `Medium` and sorts first when reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionTier {
    Low,
    Medium,
    High,
}

/// One ranked calculator candidate, ready for human review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub calculator_id: String,
    pub name: String,
    pub category: String,
    pub tier: SuggestionTier,
    /// Pre-ticked in the review step. Never set below the high tier.
    pub auto_selected: bool,
    /// Required fields the entity set already covers, sorted.
    pub available_fields: Vec<String>,
    /// Required fields still outstanding, sorted.
    pub missing_fields: Vec<String>,
}

// ─── Ranking ─────────────────────────────────────────────────────────────────

/// Score every registered calculator against the extracted entities and
/// return them ranked: tier first, then coverage, then id for a stable order.
pub fn suggest(
    entities: &EntitySet,
    registry: &CalculatorRegistry,
    config: &EngineConfig,
) -> Vec<Suggestion> {
    let mut suggestions: Vec<Suggestion> = registry
        .all()
        .map(|requirement| score(entities, requirement, config.medium_tier_ratio))
        .collect();

    suggestions.sort_by(|a, b| {
        b.tier
            .cmp(&a.tier)
            .then_with(|| b.available_fields.len().cmp(&a.available_fields.len()))
            .then_with(|| a.calculator_id.cmp(&b.calculator_id))
    });

    let high = suggestions
        .iter()
        .filter(|s| s.tier == SuggestionTier::High)
        .count();
    tracing::debug!(
        total = suggestions.len(),
        high,
        fields = entities.len(),
        "calculator suggestions ranked"
    );

    suggestions
}

fn score(
    entities: &EntitySet,
    requirement: &CalculatorRequirement,
    medium_tier_ratio: f32,
) -> Suggestion {
    let mut available: Vec<String> = Vec::new();
    let mut missing: Vec<String> = Vec::new();
    for key in &requirement.required_fields {
        if entities.contains(key) {
            available.push(key.clone());
        } else {
            missing.push(key.clone());
        }
    }
    available.sort();
    missing.sort();

    let tier = if missing.is_empty() {
        SuggestionTier::High
    } else if available.len() as f32
        >= medium_tier_ratio * requirement.required_fields.len() as f32
    {
        SuggestionTier::Medium
    } else {
        SuggestionTier::Low
    };

    // A calculator with no required inputs is trivially satisfied; whether
    // that should pre-tick it is the entry's own call.
    let auto_selected = tier == SuggestionTier::High
        && (!requirement.required_fields.is_empty() || requirement.default_include);

    Suggestion {
        calculator_id: requirement.calculator_id.clone(),
        name: requirement.name.clone(),
        category: requirement.category.clone(),
        tier,
        auto_selected,
        available_fields: available,
        missing_fields: missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{ClinicalEntity, EntitySet, ExtractionMethod};
    use crate::fields::FieldValue;
    use crate::registry::CalculatorRegistry;

    fn entity(field: &str, value: FieldValue) -> ClinicalEntity {
        ClinicalEntity {
            field: field.into(),
            value,
            confidence: 0.9,
            method: ExtractionMethod::Pattern,
            span: None,
        }
    }

    fn entities(fields: &[&str]) -> EntitySet {
        EntitySet::from_entities(
            fields
                .iter()
                .map(|f| entity(f, FieldValue::Number(1.0)))
                .collect(),
        )
    }

    fn requirement(id: &str, required: &[&str]) -> crate::registry::CalculatorRequirement {
        crate::registry::CalculatorRequirement {
            calculator_id: id.into(),
            name: id.to_uppercase(),
            category: "test".into(),
            required_fields: required.iter().map(|s| s.to_string()).collect(),
            optional_fields: vec![],
            default_include: false,
        }
    }

    fn registry_of(entries: Vec<crate::registry::CalculatorRequirement>) -> CalculatorRegistry {
        entries
            .into_iter()
            .fold(CalculatorRegistry::builder(), |b, r| b.register(r))
            .build()
    }

    #[test]
    fn full_coverage_is_high_and_auto_selected() {
        let registry = registry_of(vec![requirement("bmi", &["weight_kg", "height_cm"])]);
        let ranked = suggest(
            &entities(&["weight_kg", "height_cm"]),
            &registry,
            &EngineConfig::default(),
        );

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].tier, SuggestionTier::High);
        assert!(ranked[0].auto_selected);
        assert!(ranked[0].missing_fields.is_empty());
        assert_eq!(ranked[0].available_fields, vec!["height_cm", "weight_kg"]);
    }

    #[test]
    fn exactly_half_coverage_is_medium() {
        let registry = registry_of(vec![requirement("half", &["a", "b", "c", "d"])]);
        let ranked = suggest(&entities(&["a", "b"]), &registry, &EngineConfig::default());

        assert_eq!(ranked[0].tier, SuggestionTier::Medium);
        assert!(!ranked[0].auto_selected);
        assert_eq!(ranked[0].missing_fields, vec!["c", "d"]);
    }

    #[test]
    fn below_half_coverage_is_low() {
        let registry = registry_of(vec![requirement("sparse", &["a", "b", "c"])]);
        let ranked = suggest(&entities(&["a"]), &registry, &EngineConfig::default());

        assert_eq!(ranked[0].tier, SuggestionTier::Low);
        assert_eq!(ranked[0].available_fields, vec!["a"]);
        assert_eq!(ranked[0].missing_fields, vec!["b", "c"]);
    }

    #[test]
    fn zero_required_fields_respect_default_include() {
        let mut included = requirement("vitals_panel", &[]);
        included.default_include = true;
        let excluded = requirement("appendix", &[]);

        let registry = registry_of(vec![included, excluded]);
        let ranked = suggest(&entities(&[]), &registry, &EngineConfig::default());

        let vitals = ranked
            .iter()
            .find(|s| s.calculator_id == "vitals_panel")
            .unwrap();
        assert_eq!(vitals.tier, SuggestionTier::High);
        assert!(vitals.auto_selected);

        let appendix = ranked
            .iter()
            .find(|s| s.calculator_id == "appendix")
            .unwrap();
        assert_eq!(appendix.tier, SuggestionTier::High);
        assert!(!appendix.auto_selected, "opt-in summary must not pre-tick");
    }

    #[test]
    fn ranking_orders_tier_then_coverage_then_id() {
        let registry = registry_of(vec![
            requirement("zeta_full", &["a", "b"]),
            requirement("alpha_full", &["a", "b"]),
            requirement("wide_full", &["a", "b", "c"]),
            requirement("partial", &["a", "b", "c", "d"]),
            requirement("empty_handed", &["x", "y", "z"]),
        ]);
        let ranked = suggest(
            &entities(&["a", "b", "c"]),
            &registry,
            &EngineConfig::default(),
        );

        let ids: Vec<&str> = ranked.iter().map(|s| s.calculator_id.as_str()).collect();
        // wide_full covers three fields, the other high entries cover two and
        // fall back to id order; partial is medium (3 of 4); the rest is low.
        assert_eq!(
            ids,
            vec!["wide_full", "alpha_full", "zeta_full", "partial", "empty_handed"]
        );
        assert_eq!(ranked[3].tier, SuggestionTier::Medium);
        assert_eq!(ranked[4].tier, SuggestionTier::Low);
    }

    #[test]
    fn ranking_is_deterministic() {
        let registry = crate::registry::catalog::default_registry();
        let set = entities(&["age", "psa", "creatinine", "sodium"]);
        let config = EngineConfig::default();

        let first = suggest(&set, &registry, &config);
        let second = suggest(&set, &registry, &config);
        assert_eq!(first, second);
    }

    #[test]
    fn prostate_panel_puts_capra_on_top() {
        let registry = crate::registry::catalog::default_registry();
        let set = EntitySet::from_entities(vec![
            entity("age", FieldValue::Number(72.0)),
            entity("psa", FieldValue::Number(8.5)),
            entity("gleason_primary", FieldValue::Number(3.0)),
            entity("gleason_secondary", FieldValue::Number(4.0)),
            entity("clinical_stage", FieldValue::Text("T1c".into())),
            entity("percent_positive_cores", FieldValue::Number(33.3)),
        ]);

        let ranked = suggest(&set, &registry, &EngineConfig::default());
        assert_eq!(ranked[0].calculator_id, "capra");
        assert_eq!(ranked[0].tier, SuggestionTier::High);
        assert!(ranked[0].auto_selected);
        assert!(ranked[0].missing_fields.is_empty());

        // damico_risk shares four of the six fields and is high as well.
        let damico = ranked
            .iter()
            .find(|s| s.calculator_id == "damico_risk")
            .unwrap();
        assert_eq!(damico.tier, SuggestionTier::High);
    }
}
