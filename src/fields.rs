//! Canonical clinical field vocabulary.
//!
//! Every component speaks the same field keys: the pattern tables emit them,
//! the model sub-extractor is constrained to them, calculator requirements
//! reference them, and user overrides are validated against them. A field
//! name that is not in this catalog does not exist for the engine.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

// ═══════════════════════════════════════════════════════════
// FieldValue
// ═══════════════════════════════════════════════════════════

/// A typed clinical field value.
///
/// Serialized untagged so payloads read naturally:
/// `{"age": 72.0, "clinical_stage": "T1c", "smoker": true}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            FieldValue::Flag(b) => Some(*b),
            _ => None,
        }
    }

    /// Whether this value matches the declared kind of a catalog field.
    pub fn matches_kind(&self, kind: FieldKind) -> bool {
        matches!(
            (self, kind),
            (FieldValue::Number(_), FieldKind::Number)
                | (FieldValue::Text(_), FieldKind::Text)
                | (FieldValue::Flag(_), FieldKind::Flag)
        )
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{n:.0}")
            }
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Text(s) => write!(f, "{s}"),
            FieldValue::Flag(true) => write!(f, "yes"),
            FieldValue::Flag(false) => write!(f, "no"),
        }
    }
}

/// Session teardown scrubs values in place before the map is dropped.
impl Zeroize for FieldValue {
    fn zeroize(&mut self) {
        match self {
            FieldValue::Number(n) => n.zeroize(),
            FieldValue::Text(s) => s.zeroize(),
            FieldValue::Flag(b) => *b = false,
        }
    }
}

/// Field key → value, ordered for deterministic iteration.
pub type FieldMap = BTreeMap<String, FieldValue>;

// ═══════════════════════════════════════════════════════════
// Field catalog
// ═══════════════════════════════════════════════════════════

/// Expected value shape for a canonical field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Number,
    Text,
    Flag,
}

/// One catalog entry. The description doubles as the hint shown to the
/// model sub-extractor when asking for this field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
}

const fn num(key: &'static str, description: &'static str) -> FieldSpec {
    FieldSpec { key, kind: FieldKind::Number, description }
}

const fn text(key: &'static str, description: &'static str) -> FieldSpec {
    FieldSpec { key, kind: FieldKind::Text, description }
}

const fn flag(key: &'static str, description: &'static str) -> FieldSpec {
    FieldSpec { key, kind: FieldKind::Flag, description }
}

/// Every field the engine knows about.
pub static FIELD_CATALOG: &[FieldSpec] = &[
    // Demographics & anthropometrics
    num("age", "patient age in years"),
    text("sex", "patient sex, 'male' or 'female'"),
    num("weight_kg", "body weight in kilograms"),
    num("height_cm", "body height in centimeters"),
    // Prostate oncology
    num("psa", "prostate-specific antigen in ng/mL"),
    num("free_psa", "free PSA in ng/mL"),
    num("prostate_volume", "prostate volume in mL"),
    num("gleason_primary", "primary Gleason grade, 1-5"),
    num("gleason_secondary", "secondary Gleason grade, 1-5"),
    text("clinical_stage", "clinical T stage, e.g. 'T1c' or 'T2a'"),
    num("percent_positive_cores", "percentage of positive biopsy cores, 0-100"),
    // Vitals
    num("systolic_bp", "systolic blood pressure in mmHg"),
    num("diastolic_bp", "diastolic blood pressure in mmHg"),
    num("heart_rate", "heart rate in beats per minute"),
    num("respiratory_rate", "respiratory rate in breaths per minute"),
    num("temperature_c", "body temperature in degrees Celsius"),
    num("oxygen_saturation", "peripheral oxygen saturation in percent"),
    num("gcs", "Glasgow Coma Scale total, 3-15"),
    // Cardiovascular history & lipids
    num("total_cholesterol", "total cholesterol in mg/dL"),
    num("hdl_cholesterol", "HDL cholesterol in mg/dL"),
    num("triglycerides", "triglycerides in mg/dL"),
    num("qt_interval", "QT interval in milliseconds"),
    flag("smoker", "current tobacco smoker"),
    flag("diabetic", "diagnosed diabetes mellitus"),
    flag("hypertension", "diagnosed or treated hypertension"),
    flag("heart_failure", "history of congestive heart failure"),
    flag("stroke_history", "prior stroke or TIA"),
    flag("vascular_disease", "prior MI, PAD, or aortic plaque"),
    flag("bleeding_history", "prior major bleeding or predisposition"),
    // Chemistry & renal
    num("creatinine", "serum creatinine in mg/dL"),
    num("urine_creatinine", "urine creatinine in mg/dL"),
    num("sodium", "serum sodium in mEq/L"),
    num("urine_sodium", "urine sodium in mEq/L"),
    num("chloride", "serum chloride in mEq/L"),
    num("bicarbonate", "serum bicarbonate in mEq/L"),
    num("calcium", "serum calcium in mg/dL"),
    num("albumin", "serum albumin in g/dL"),
    num("glucose", "serum glucose in mg/dL"),
    num("bun", "blood urea nitrogen in mg/dL"),
    // Hepatology & hematology
    num("bilirubin", "total bilirubin in mg/dL"),
    num("inr", "international normalized ratio"),
    num("ast", "aspartate aminotransferase in U/L"),
    num("alt", "alanine aminotransferase in U/L"),
    num("platelets", "platelet count in 10^3/uL"),
    num("wbc", "white blood cell count in 10^3/uL"),
    num("hemoglobin", "hemoglobin in g/dL"),
    num("troponin", "high-sensitivity troponin in ng/L"),
    flag("ascites", "ascites present"),
    flag("encephalopathy", "hepatic encephalopathy present"),
    // Pulmonary / thrombosis findings
    flag("confusion", "new-onset confusion or disorientation"),
    flag("hemoptysis", "coughing up blood"),
    flag("malignancy", "active malignancy"),
    flag("prior_dvt", "prior DVT or PE"),
    flag("immobilization", "recent immobilization or surgery"),
    // Focused exam findings
    flag("tonsillar_exudate", "tonsillar swelling or exudate"),
    flag("tender_cervical_nodes", "tender anterior cervical lymph nodes"),
    flag("fever_history", "reported fever above 38C"),
    flag("cough_absent", "absence of cough"),
    flag("migration_pain", "pain migration to right lower quadrant"),
    flag("anorexia", "loss of appetite"),
    flag("nausea", "nausea or vomiting"),
    flag("rlq_tenderness", "right lower quadrant tenderness"),
    flag("rebound_pain", "rebound tenderness"),
];

/// Look up a catalog entry by key.
pub fn field_spec(key: &str) -> Option<&'static FieldSpec> {
    FIELD_CATALOG.iter().find(|spec| spec.key == key)
}

/// Whether a key names a canonical field.
pub fn is_canonical(key: &str) -> bool {
    field_spec(key).is_some()
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_keys_are_unique() {
        let mut keys: Vec<&str> = FIELD_CATALOG.iter().map(|s| s.key).collect();
        let total = keys.len();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), total, "duplicate field key in catalog");
    }

    #[test]
    fn catalog_keys_are_snake_case() {
        for spec in FIELD_CATALOG {
            assert!(
                spec.key
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'),
                "non-snake-case key: {}",
                spec.key
            );
        }
    }

    #[test]
    fn field_spec_lookup() {
        let spec = field_spec("psa").unwrap();
        assert_eq!(spec.kind, FieldKind::Number);
        assert!(field_spec("favorite_color").is_none());
        assert!(is_canonical("clinical_stage"));
        assert!(!is_canonical("PSA"));
    }

    #[test]
    fn field_value_serializes_untagged() {
        assert_eq!(serde_json::to_string(&FieldValue::Number(8.5)).unwrap(), "8.5");
        assert_eq!(
            serde_json::to_string(&FieldValue::Text("T1c".into())).unwrap(),
            "\"T1c\""
        );
        assert_eq!(serde_json::to_string(&FieldValue::Flag(true)).unwrap(), "true");
    }

    #[test]
    fn field_value_deserializes_untagged() {
        let v: FieldValue = serde_json::from_str("72").unwrap();
        assert_eq!(v, FieldValue::Number(72.0));
        let v: FieldValue = serde_json::from_str("\"T1c\"").unwrap();
        assert_eq!(v, FieldValue::Text("T1c".into()));
        let v: FieldValue = serde_json::from_str("false").unwrap();
        assert_eq!(v, FieldValue::Flag(false));
    }

    #[test]
    fn display_trims_integral_numbers() {
        assert_eq!(FieldValue::Number(72.0).to_string(), "72");
        assert_eq!(FieldValue::Number(8.5).to_string(), "8.5");
        assert_eq!(FieldValue::Text("T1c".into()).to_string(), "T1c");
        assert_eq!(FieldValue::Flag(true).to_string(), "yes");
    }

    #[test]
    fn matches_kind_checks_shape() {
        assert!(FieldValue::Number(1.0).matches_kind(FieldKind::Number));
        assert!(!FieldValue::Number(1.0).matches_kind(FieldKind::Text));
        assert!(FieldValue::Flag(true).matches_kind(FieldKind::Flag));
    }

    #[test]
    fn zeroize_clears_values() {
        let mut v = FieldValue::Text("sensitive narrative".into());
        v.zeroize();
        assert_eq!(v.as_text(), Some(""));

        let mut v = FieldValue::Number(8.5);
        v.zeroize();
        assert_eq!(v.as_number(), Some(0.0));

        let mut v = FieldValue::Flag(true);
        v.zeroize();
        assert_eq!(v.as_flag(), Some(false));
    }
}
