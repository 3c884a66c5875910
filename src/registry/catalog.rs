//! Built-in calculator catalog.
//!
//! Requirement data for every calculator the engine knows how to suggest.
//! Field keys must match `crate::fields::FIELD_CATALOG`; a test below keeps
//! the two vocabularies aligned.

use super::{CalculatorRegistry, CalculatorRequirement};

fn entry(
    calculator_id: &str,
    name: &str,
    category: &str,
    required: &[&str],
    optional: &[&str],
) -> CalculatorRequirement {
    CalculatorRequirement {
        calculator_id: calculator_id.into(),
        name: name.into(),
        category: category.into(),
        required_fields: required.iter().map(|s| s.to_string()).collect(),
        optional_fields: optional.iter().map(|s| s.to_string()).collect(),
        default_include: false,
    }
}

/// Summary-style entry with no required inputs. `default_include` decides
/// whether a fully-satisfied (trivially so) entry is also auto-selected.
fn summary(
    calculator_id: &str,
    name: &str,
    category: &str,
    optional: &[&str],
    default_include: bool,
) -> CalculatorRequirement {
    CalculatorRequirement {
        default_include,
        ..entry(calculator_id, name, category, &[], optional)
    }
}

/// The catalog every engine starts from. Callers who need a different set
/// build their own registry through [`CalculatorRegistry::builder`].
pub fn default_registry() -> CalculatorRegistry {
    CalculatorRegistry::builder()
        // ─── Prostate oncology ───────────────────────────────────────────
        .register(entry(
            "capra",
            "UCSF-CAPRA Score",
            "prostate_oncology",
            &[
                "age",
                "psa",
                "gleason_primary",
                "gleason_secondary",
                "clinical_stage",
                "percent_positive_cores",
            ],
            &[],
        ))
        .register(entry(
            "damico_risk",
            "D'Amico Risk Classification",
            "prostate_oncology",
            &["psa", "gleason_primary", "gleason_secondary", "clinical_stage"],
            &[],
        ))
        .register(entry(
            "psa_density",
            "PSA Density",
            "prostate_oncology",
            &["psa", "prostate_volume"],
            &[],
        ))
        .register(entry(
            "free_psa_ratio",
            "Free-to-Total PSA Ratio",
            "prostate_oncology",
            &["psa", "free_psa"],
            &["age"],
        ))
        // ─── Cardiology ──────────────────────────────────────────────────
        .register(entry(
            "framingham_risk",
            "Framingham 10-Year CHD Risk",
            "cardiology",
            &[
                "age",
                "sex",
                "total_cholesterol",
                "hdl_cholesterol",
                "systolic_bp",
                "smoker",
                "diabetic",
            ],
            &[],
        ))
        .register(entry(
            "cha2ds2_vasc",
            "CHA2DS2-VASc Stroke Risk",
            "cardiology",
            &[
                "age",
                "sex",
                "heart_failure",
                "hypertension",
                "diabetic",
                "stroke_history",
                "vascular_disease",
            ],
            &[],
        ))
        .register(entry(
            "has_bled",
            "HAS-BLED Bleeding Risk",
            "cardiology",
            &["age", "hypertension", "stroke_history", "bleeding_history", "inr"],
            &["creatinine"],
        ))
        .register(entry(
            "heart_score",
            "HEART Score for Chest Pain",
            "cardiology",
            &["age", "troponin"],
            &["hypertension", "diabetic", "smoker", "vascular_disease"],
        ))
        .register(entry(
            "qtc_bazett",
            "Corrected QT Interval (Bazett)",
            "cardiology",
            &["qt_interval", "heart_rate"],
            &[],
        ))
        .register(entry(
            "mean_arterial_pressure",
            "Mean Arterial Pressure",
            "cardiology",
            &["systolic_bp", "diastolic_bp"],
            &[],
        ))
        .register(entry(
            "ldl_friedewald",
            "LDL Cholesterol (Friedewald)",
            "cardiology",
            &["total_cholesterol", "hdl_cholesterol", "triglycerides"],
            &[],
        ))
        // ─── Nephrology ──────────────────────────────────────────────────
        .register(entry(
            "ckd_epi_gfr",
            "CKD-EPI Estimated GFR",
            "nephrology",
            &["age", "sex", "creatinine"],
            &[],
        ))
        .register(entry(
            "cockcroft_gault",
            "Cockcroft-Gault Creatinine Clearance",
            "nephrology",
            &["age", "sex", "weight_kg", "creatinine"],
            &["height_cm"],
        ))
        .register(entry(
            "corrected_calcium",
            "Albumin-Corrected Calcium",
            "nephrology",
            &["calcium", "albumin"],
            &[],
        ))
        .register(entry(
            "fena",
            "Fractional Excretion of Sodium",
            "nephrology",
            &["sodium", "urine_sodium", "creatinine", "urine_creatinine"],
            &[],
        ))
        .register(entry(
            "anion_gap",
            "Anion Gap",
            "nephrology",
            &["sodium", "chloride", "bicarbonate"],
            &["albumin"],
        ))
        .register(entry(
            "serum_osmolality",
            "Calculated Serum Osmolality",
            "nephrology",
            &["sodium", "glucose", "bun"],
            &[],
        ))
        // ─── Hepatology ──────────────────────────────────────────────────
        .register(entry(
            "meld",
            "MELD Score",
            "hepatology",
            &["creatinine", "bilirubin", "inr"],
            &["sodium"],
        ))
        .register(entry(
            "child_pugh",
            "Child-Pugh Score",
            "hepatology",
            &["bilirubin", "albumin", "inr", "ascites", "encephalopathy"],
            &[],
        ))
        .register(entry(
            "fib4",
            "FIB-4 Fibrosis Index",
            "hepatology",
            &["age", "ast", "alt", "platelets"],
            &[],
        ))
        // ─── Pulmonology and sepsis ──────────────────────────────────────
        .register(entry(
            "curb65",
            "CURB-65 Pneumonia Severity",
            "pulmonology",
            &["confusion", "bun", "respiratory_rate", "systolic_bp", "age"],
            &[],
        ))
        .register(entry(
            "wells_pe",
            "Wells Criteria for Pulmonary Embolism",
            "pulmonology",
            &["heart_rate", "hemoptysis", "malignancy", "prior_dvt", "immobilization"],
            &[],
        ))
        .register(entry(
            "qsofa",
            "Quick SOFA",
            "pulmonology",
            &["respiratory_rate", "systolic_bp", "gcs"],
            &[],
        ))
        .register(entry(
            "news2",
            "National Early Warning Score 2",
            "pulmonology",
            &[
                "respiratory_rate",
                "oxygen_saturation",
                "systolic_bp",
                "heart_rate",
                "temperature_c",
                "gcs",
            ],
            &[],
        ))
        // ─── Emergency medicine ──────────────────────────────────────────
        .register(entry(
            "alvarado",
            "Alvarado Appendicitis Score",
            "emergency",
            &[
                "migration_pain",
                "anorexia",
                "nausea",
                "rlq_tenderness",
                "rebound_pain",
                "temperature_c",
                "wbc",
            ],
            &[],
        ))
        .register(entry(
            "centor",
            "Centor Score for Pharyngitis",
            "emergency",
            &[
                "tonsillar_exudate",
                "tender_cervical_nodes",
                "fever_history",
                "cough_absent",
                "age",
            ],
            &[],
        ))
        // ─── General ─────────────────────────────────────────────────────
        .register(entry(
            "bmi",
            "Body Mass Index",
            "general",
            &["weight_kg", "height_cm"],
            &[],
        ))
        .register(entry(
            "bsa_dubois",
            "Body Surface Area (Du Bois)",
            "general",
            &["weight_kg", "height_cm"],
            &[],
        ))
        .register(entry(
            "ideal_body_weight",
            "Ideal Body Weight (Devine)",
            "general",
            &["sex", "height_cm"],
            &[],
        ))
        .register(summary(
            "vital_signs_summary",
            "Vital Signs Summary",
            "general",
            &[
                "systolic_bp",
                "diastolic_bp",
                "heart_rate",
                "respiratory_rate",
                "temperature_c",
                "oxygen_saturation",
            ],
            true,
        ))
        .register(summary(
            "lifestyle_risk_appendix",
            "Lifestyle Risk Appendix",
            "general",
            &["smoker", "diabetic"],
            false,
        ))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;

    #[test]
    fn catalog_spans_multiple_specialties() {
        let registry = default_registry();
        assert!(registry.len() >= 24, "catalog shrank to {}", registry.len());
        for category in [
            "prostate_oncology",
            "cardiology",
            "nephrology",
            "hepatology",
            "pulmonology",
            "emergency",
            "general",
        ] {
            assert!(
                !registry.list_by_category(category).is_empty(),
                "no calculators in {category}"
            );
        }
    }

    #[test]
    fn every_catalog_field_is_canonical() {
        let registry = default_registry();
        for requirement in registry.all() {
            for key in requirement
                .required_fields
                .iter()
                .chain(requirement.optional_fields.iter())
            {
                assert!(
                    fields::is_canonical(key),
                    "{} references unknown field '{key}'",
                    requirement.calculator_id
                );
            }
        }
    }

    #[test]
    fn capra_requires_the_full_prostate_panel() {
        let registry = default_registry();
        let capra = registry.get("capra").unwrap();
        assert_eq!(capra.category, "prostate_oncology");
        assert_eq!(
            capra.required_fields,
            vec![
                "age",
                "psa",
                "gleason_primary",
                "gleason_secondary",
                "clinical_stage",
                "percent_positive_cores",
            ]
        );
        assert!(!capra.default_include);
    }

    #[test]
    fn required_and_optional_sets_never_overlap() {
        let registry = default_registry();
        for requirement in registry.all() {
            for key in &requirement.optional_fields {
                assert!(
                    !requirement.required_fields.contains(key),
                    "{} lists '{key}' as both required and optional",
                    requirement.calculator_id
                );
            }
        }
    }

    #[test]
    fn summary_entries_declare_their_inclusion_policy() {
        let registry = default_registry();
        let vitals = registry.get("vital_signs_summary").unwrap();
        assert!(vitals.required_fields.is_empty());
        assert!(vitals.default_include);

        let lifestyle = registry.get("lifestyle_risk_appendix").unwrap();
        assert!(lifestyle.required_fields.is_empty());
        assert!(!lifestyle.default_include);
    }
}
