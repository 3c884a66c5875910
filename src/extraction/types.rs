//! Extraction result types and the per-field deduplication rule.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::fields::{FieldMap, FieldValue};

/// Which sub-extractor produced an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Pattern,
    Model,
}

impl ExtractionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ExtractionMethod::Pattern => "pattern",
            ExtractionMethod::Model => "model",
        }
    }
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte range into the source narrative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub offset: usize,
    pub length: usize,
}

/// One extracted clinical field with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalEntity {
    pub field: String,
    pub value: FieldValue,
    pub confidence: f32,
    pub method: ExtractionMethod,
    /// Present when the method can point at the source text (patterns can,
    /// the model cannot).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<SourceSpan>,
}

impl Zeroize for ClinicalEntity {
    fn zeroize(&mut self) {
        self.value.zeroize();
        self.confidence = 0.0;
        self.span = None;
    }
}

/// Whether `candidate` should displace `current` for the same field:
/// higher confidence wins; on an exact tie the pattern result wins so
/// repeated runs over identical input stay reproducible.
fn displaces(current: &ClinicalEntity, candidate: &ClinicalEntity) -> bool {
    if candidate.confidence != current.confidence {
        return candidate.confidence > current.confidence;
    }
    candidate.method == ExtractionMethod::Pattern && current.method == ExtractionMethod::Model
}

// ═══════════════════════════════════════════════════════════
// EntitySet
// ═══════════════════════════════════════════════════════════

/// Deduplicated field → entity mapping, one entity per field.
///
/// Immutable once built; backed by an ordered map so iteration (and every
/// payload derived from it) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntitySet {
    entities: BTreeMap<String, ClinicalEntity>,
}

impl EntitySet {
    /// Build a set from raw sub-extractor output, resolving per-field
    /// collisions with the confidence/tie rule.
    pub fn from_entities(raw: Vec<ClinicalEntity>) -> Self {
        let mut entities: BTreeMap<String, ClinicalEntity> = BTreeMap::new();
        for candidate in raw {
            match entities.get(&candidate.field) {
                Some(current) if !displaces(current, &candidate) => {}
                _ => {
                    entities.insert(candidate.field.clone(), candidate);
                }
            }
        }
        Self { entities }
    }

    pub fn get(&self, field: &str) -> Option<&ClinicalEntity> {
        self.entities.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.entities.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Field keys in sorted order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClinicalEntity> {
        self.entities.values()
    }

    /// Flatten to plain field → value pairs for calculator input.
    pub fn field_map(&self) -> FieldMap {
        self.entities
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }
}

impl Zeroize for EntitySet {
    fn zeroize(&mut self) {
        for entity in self.entities.values_mut() {
            entity.zeroize();
        }
        self.entities.clear();
    }
}

/// What one `extract` call produced. Extraction never fails outright: when a
/// sub-extractor is unavailable the outcome is flagged degraded and carries a
/// human-readable note instead.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutcome {
    pub entities: EntitySet,
    pub degraded: bool,
    pub notes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(field: &str, value: FieldValue, confidence: f32, method: ExtractionMethod) -> ClinicalEntity {
        ClinicalEntity {
            field: field.into(),
            value,
            confidence,
            method,
            span: None,
        }
    }

    #[test]
    fn higher_confidence_wins_regardless_of_order() {
        let low = entity("psa", FieldValue::Number(7.0), 0.7, ExtractionMethod::Model);
        let high = entity("psa", FieldValue::Number(8.5), 0.9, ExtractionMethod::Pattern);

        let set = EntitySet::from_entities(vec![low.clone(), high.clone()]);
        assert_eq!(set.get("psa").unwrap().value, FieldValue::Number(8.5));

        let set = EntitySet::from_entities(vec![high, low]);
        assert_eq!(set.get("psa").unwrap().value, FieldValue::Number(8.5));
    }

    #[test]
    fn exact_tie_prefers_pattern() {
        let model = entity("age", FieldValue::Number(71.0), 0.8, ExtractionMethod::Model);
        let pattern = entity("age", FieldValue::Number(72.0), 0.8, ExtractionMethod::Pattern);

        let set = EntitySet::from_entities(vec![model.clone(), pattern.clone()]);
        assert_eq!(set.get("age").unwrap().method, ExtractionMethod::Pattern);
        assert_eq!(set.get("age").unwrap().value, FieldValue::Number(72.0));

        let set = EntitySet::from_entities(vec![pattern, model]);
        assert_eq!(set.get("age").unwrap().method, ExtractionMethod::Pattern);
    }

    #[test]
    fn same_method_tie_keeps_first() {
        let first = entity("age", FieldValue::Number(72.0), 0.9, ExtractionMethod::Pattern);
        let second = entity("age", FieldValue::Number(80.0), 0.9, ExtractionMethod::Pattern);

        let set = EntitySet::from_entities(vec![first, second]);
        assert_eq!(set.get("age").unwrap().value, FieldValue::Number(72.0));
    }

    #[test]
    fn iteration_is_sorted_by_field() {
        let set = EntitySet::from_entities(vec![
            entity("psa", FieldValue::Number(8.5), 0.9, ExtractionMethod::Pattern),
            entity("age", FieldValue::Number(72.0), 0.9, ExtractionMethod::Pattern),
            entity("clinical_stage", FieldValue::Text("T1c".into()), 0.9, ExtractionMethod::Pattern),
        ]);
        let fields: Vec<&str> = set.fields().collect();
        assert_eq!(fields, vec!["age", "clinical_stage", "psa"]);
    }

    #[test]
    fn field_map_flattens_values() {
        let set = EntitySet::from_entities(vec![
            entity("age", FieldValue::Number(72.0), 0.9, ExtractionMethod::Pattern),
            entity("smoker", FieldValue::Flag(false), 0.7, ExtractionMethod::Model),
        ]);
        let map = set.field_map();
        assert_eq!(map.get("age"), Some(&FieldValue::Number(72.0)));
        assert_eq!(map.get("smoker"), Some(&FieldValue::Flag(false)));
    }

    #[test]
    fn zeroize_empties_the_set() {
        let mut set = EntitySet::from_entities(vec![entity(
            "clinical_stage",
            FieldValue::Text("T1c".into()),
            0.9,
            ExtractionMethod::Pattern,
        )]);
        set.zeroize();
        assert!(set.is_empty());
    }

    #[test]
    fn entity_serializes_with_method_tag() {
        let e = entity("psa", FieldValue::Number(8.5), 0.9, ExtractionMethod::Pattern);
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"method\":\"pattern\""));
        assert!(json.contains("\"value\":8.5"));
        assert!(!json.contains("span"), "absent span is omitted");
    }
}
