//! Preliminary and fallback note rendering.
//!
//! Everything here is deterministic and local: no model involvement, no
//! clock reads. The preliminary note presents what was said and what was
//! extracted — it never carries an assessment or plan section, which are
//! clinical judgments and stay out of machine-rendered text.

use std::fmt::Write;

use crate::extraction::EntitySet;
use crate::orchestrator::types::CalculatorOutcome;

/// Renders the note shown to the reviewer between extraction and finalize.
pub trait NoteComposer: Send + Sync {
    fn compose_preliminary(&self, narrative: &str, entities: &EntitySet) -> String;
}

/// Default composer: markdown with a narrative section and a structured
/// findings list, one line per extracted field in sorted order.
pub struct SectionComposer;

impl NoteComposer for SectionComposer {
    fn compose_preliminary(&self, narrative: &str, entities: &EntitySet) -> String {
        let mut note = String::new();
        note.push_str("# Preliminary Clinical Note\n\n");
        note.push_str("## Narrative\n\n");
        note.push_str(narrative.trim());
        note.push_str("\n\n## Structured Findings\n\n");

        if entities.is_empty() {
            note.push_str("_No structured findings extracted._\n");
            return note;
        }
        for entity in entities.iter() {
            let _ = writeln!(
                note,
                "- {}: {} ({}, confidence {:.2})",
                entity.field, entity.value, entity.method, entity.confidence
            );
        }
        note
    }
}

/// Calculator-only final note, used when synthesis is unavailable but at
/// least one calculator produced a result.
pub fn compose_fallback_note(preliminary_note: &str, outcomes: &[CalculatorOutcome]) -> String {
    let mut note = String::from(preliminary_note.trim_end());
    note.push_str("\n\n## Calculator Results\n\n");

    if outcomes.is_empty() {
        note.push_str("_No calculators were selected._\n");
    }
    for outcome in outcomes {
        match outcome {
            CalculatorOutcome::Completed(report) => {
                let unit = report
                    .unit
                    .as_deref()
                    .map(|u| format!(" {u}"))
                    .unwrap_or_default();
                let _ = writeln!(
                    note,
                    "- {}: {:.1}{unit} — {}",
                    report.calculator_id, report.value, report.interpretation
                );
            }
            CalculatorOutcome::Failed(error) => {
                let _ = writeln!(
                    note,
                    "- {}: not computed ({})",
                    error.calculator_id, error.message
                );
            }
        }
    }

    note.push_str("\n_Final synthesis was unavailable; this note contains deterministic content only._\n");
    note
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculators::{CalculatorReport, ValidationError};
    use crate::extraction::{ClinicalEntity, ExtractionMethod};
    use crate::fields::FieldValue;

    fn prostate_entities() -> EntitySet {
        EntitySet::from_entities(vec![
            ClinicalEntity {
                field: "psa".into(),
                value: FieldValue::Number(8.5),
                confidence: 0.9,
                method: ExtractionMethod::Pattern,
                span: None,
            },
            ClinicalEntity {
                field: "age".into(),
                value: FieldValue::Number(72.0),
                confidence: 0.9,
                method: ExtractionMethod::Pattern,
                span: None,
            },
            ClinicalEntity {
                field: "clinical_stage".into(),
                value: FieldValue::Text("T1c".into()),
                confidence: 0.7,
                method: ExtractionMethod::Model,
                span: None,
            },
        ])
    }

    #[test]
    fn preliminary_note_lists_findings_in_sorted_order() {
        let note = SectionComposer
            .compose_preliminary("72 yo M with PSA 8.5, stage T1c.", &prostate_entities());

        assert!(note.contains("## Narrative"));
        assert!(note.contains("72 yo M with PSA 8.5"));
        let age_at = note.find("- age: 72 (pattern, confidence 0.90)").unwrap();
        let stage_at = note
            .find("- clinical_stage: T1c (model, confidence 0.70)")
            .unwrap();
        let psa_at = note.find("- psa: 8.5 (pattern, confidence 0.90)").unwrap();
        assert!(age_at < stage_at && stage_at < psa_at);
    }

    #[test]
    fn preliminary_note_never_contains_assessment_or_plan() {
        let note = SectionComposer
            .compose_preliminary("65 yo F, chest pain, troponin 40.", &prostate_entities());
        let lower = note.to_lowercase();
        assert!(!lower.contains("# assessment"));
        assert!(!lower.contains("# plan"));
    }

    #[test]
    fn empty_extraction_reads_as_no_findings() {
        let note =
            SectionComposer.compose_preliminary("Patient seen today.", &EntitySet::default());
        assert!(note.contains("_No structured findings extracted._"));
    }

    #[test]
    fn composition_is_deterministic() {
        let entities = prostate_entities();
        let a = SectionComposer.compose_preliminary("72 yo M.", &entities);
        let b = SectionComposer.compose_preliminary("72 yo M.", &entities);
        assert_eq!(a, b);
    }

    #[test]
    fn fallback_note_renders_successes_and_failures() {
        let outcomes = vec![
            CalculatorOutcome::Completed(CalculatorReport {
                calculator_id: "capra".into(),
                value: 3.0,
                unit: None,
                interpretation: "low-risk disease".into(),
                risk_level: None,
                recommendations: vec![],
                references: vec![],
            }),
            CalculatorOutcome::Failed(ValidationError {
                calculator_id: "psa_density".into(),
                field: Some("prostate_volume".into()),
                message: "required field 'prostate_volume' is missing".into(),
            }),
        ];

        let note = compose_fallback_note("# Preliminary Clinical Note", &outcomes);
        assert!(note.contains("- capra: 3.0 — low-risk disease"));
        assert!(note.contains("- psa_density: not computed"));
        assert!(note.contains("synthesis was unavailable"));
    }
}
