//! Pattern sub-extractor: compiled regex tables over the field catalog.
//!
//! Patterns are tried in table order and the first match per field wins, so
//! negated phrasings ("non-smoker") must precede their positive counterparts.
//! Every hit carries the byte span of the matched snippet.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::types::{ClinicalEntity, ExtractionMethod, SourceSpan};
use crate::fields::FieldValue;

/// How a regex capture becomes a typed value.
enum ParseRule {
    /// Capture `group` parsed as a decimal number.
    Number,
    /// Groups 1 and 2 as numerator/denominator, scaled to 0-100.
    PercentFromFraction,
    /// Capture `group` normalized to canonical T-stage form ("T1c").
    Stage,
    /// Capture `group` normalized to "male"/"female".
    Sex,
    FlagTrue,
    FlagFalse,
}

/// A compiled pattern bound to one catalog field.
struct FieldPattern {
    field: &'static str,
    regex: Regex,
    group: usize,
    rule: ParseRule,
}

fn pattern(field: &'static str, regex_str: &str, group: usize, rule: ParseRule) -> FieldPattern {
    FieldPattern {
        field,
        regex: Regex::new(regex_str).expect("Invalid extraction regex pattern"),
        group,
        rule,
    }
}

static PATTERNS: LazyLock<Vec<FieldPattern>> = LazyLock::new(|| {
    vec![
        // ── Demographics ──────────────────────────────────────
        pattern(
            "age",
            r"(?i)\b(\d{1,3})\s*(?:yo\b|y/o|y\.o\.|[- ]?years?[- ]old)",
            1,
            ParseRule::Number,
        ),
        pattern("age", r"(?i)\bage[:\s]+(\d{1,3})\b", 1, ParseRule::Number),
        pattern(
            "sex",
            r"(?i)\b\d{1,3}\s*(?:yo|y/o|y\.o\.)\s+(m|f|male|female)\b",
            1,
            ParseRule::Sex,
        ),
        pattern("sex", r"(?i)\b(male|female|man|woman)\b", 1, ParseRule::Sex),
        // ── Prostate oncology ─────────────────────────────────
        pattern(
            "free_psa",
            r"(?i)\bfree\s+psa\b[^0-9\n]{0,12}(\d+(?:\.\d+)?)",
            1,
            ParseRule::Number,
        ),
        pattern(
            "psa",
            r"(?i)\bpsa\b[^0-9\n]{0,12}(\d+(?:\.\d+)?)",
            1,
            ParseRule::Number,
        ),
        pattern(
            "gleason_primary",
            r"(?i)\bgleason\b[^+\n]{0,15}?(\d)\s*\+\s*(\d)",
            1,
            ParseRule::Number,
        ),
        pattern(
            "gleason_secondary",
            r"(?i)\bgleason\b[^+\n]{0,15}?(\d)\s*\+\s*(\d)",
            2,
            ParseRule::Number,
        ),
        pattern(
            "clinical_stage",
            r"(?i)\b(?:clinical\s+)?stage\s+(c?t[0-4][a-c]?)\b",
            1,
            ParseRule::Stage,
        ),
        pattern("clinical_stage", r"\b(cT[0-4][a-c]?)\b", 1, ParseRule::Stage),
        pattern(
            "percent_positive_cores",
            r"(?i)\b(\d{1,2})\s*(?:/|\s*of\s*)\s*(\d{1,3})\s+(?:biopsy\s+)?cores?\s+(?:were\s+|was\s+|are\s+|is\s+)?positive\b",
            1,
            ParseRule::PercentFromFraction,
        ),
        pattern(
            "percent_positive_cores",
            r"(?i)\b(\d{1,3}(?:\.\d+)?)\s*%\s*(?:of\s+)?(?:positive\s+cores?|cores?\s+positive)\b",
            1,
            ParseRule::Number,
        ),
        // ── Vitals ────────────────────────────────────────────
        pattern(
            "systolic_bp",
            r"(?i)\b(?:bp|blood\s+pressure)[:\s]+(\d{2,3})\s*/\s*(\d{2,3})\b",
            1,
            ParseRule::Number,
        ),
        pattern(
            "diastolic_bp",
            r"(?i)\b(?:bp|blood\s+pressure)[:\s]+(\d{2,3})\s*/\s*(\d{2,3})\b",
            2,
            ParseRule::Number,
        ),
        pattern(
            "heart_rate",
            r"(?i)\b(?:hr|heart\s+rate|pulse)[:\s]+(\d{2,3})\b",
            1,
            ParseRule::Number,
        ),
        pattern(
            "respiratory_rate",
            r"(?i)\b(?:rr|resp(?:iratory)?\s+rate)[:\s]+(\d{1,2})\b",
            1,
            ParseRule::Number,
        ),
        pattern(
            "temperature_c",
            r"(?i)\btemp(?:erature)?[:\s]+(\d{2,3}(?:\.\d+)?)\b",
            1,
            ParseRule::Number,
        ),
        pattern(
            "oxygen_saturation",
            r"(?i)\b(?:spo2|o2\s+sat(?:uration)?|sats?)[:\s]+(\d{2,3})",
            1,
            ParseRule::Number,
        ),
        pattern("gcs", r"(?i)\bgcs[:\s]+(\d{1,2})\b", 1, ParseRule::Number),
        // ── Anthropometrics ───────────────────────────────────
        pattern(
            "weight_kg",
            r"(?i)\b(?:weight|wt)[:\s]+(\d+(?:\.\d+)?)\s*kg\b",
            1,
            ParseRule::Number,
        ),
        pattern(
            "height_cm",
            r"(?i)\bheight[:\s]+(\d+(?:\.\d+)?)\s*cm\b",
            1,
            ParseRule::Number,
        ),
        // ── Chemistry & hematology ────────────────────────────
        pattern(
            "creatinine",
            r"(?i)\bcreatinine[:\s]+(?:of\s+)?(\d+(?:\.\d+)?)",
            1,
            ParseRule::Number,
        ),
        pattern(
            "sodium",
            r"(?i)\b(?:sodium|na)[:\s]+(\d{2,3}(?:\.\d+)?)\b",
            1,
            ParseRule::Number,
        ),
        pattern("bun", r"(?i)\bbun[:\s]+(\d+(?:\.\d+)?)", 1, ParseRule::Number),
        pattern(
            "glucose",
            r"(?i)\b(?:glucose|blood\s+sugar)[:\s]+(\d+(?:\.\d+)?)",
            1,
            ParseRule::Number,
        ),
        pattern(
            "albumin",
            r"(?i)\balbumin[:\s]+(\d+(?:\.\d+)?)",
            1,
            ParseRule::Number,
        ),
        pattern(
            "bilirubin",
            r"(?i)\b(?:total\s+)?bili(?:rubin)?[:\s]+(\d+(?:\.\d+)?)",
            1,
            ParseRule::Number,
        ),
        pattern(
            "inr",
            r"(?i)\binr[:\s]+(?:of\s+)?(\d+(?:\.\d+)?)",
            1,
            ParseRule::Number,
        ),
        pattern("platelets", r"(?i)\bplatelets?[:\s]+(\d+)", 1, ParseRule::Number),
        pattern(
            "hemoglobin",
            r"(?i)\b(?:hemoglobin|hgb|hb)[:\s]+(\d+(?:\.\d+)?)",
            1,
            ParseRule::Number,
        ),
        pattern("wbc", r"(?i)\bwbc[:\s]+(\d+(?:\.\d+)?)", 1, ParseRule::Number),
        pattern(
            "troponin",
            r"(?i)\btroponin[:\s]+(?:of\s+)?(\d+(?:\.\d+)?)",
            1,
            ParseRule::Number,
        ),
        // ── Lipids ────────────────────────────────────────────
        pattern(
            "total_cholesterol",
            r"(?i)\btotal\s+cholesterol[:\s]+(\d+)",
            1,
            ParseRule::Number,
        ),
        pattern(
            "hdl_cholesterol",
            r"(?i)\bhdl(?:\s+cholesterol)?[:\s]+(\d+)",
            1,
            ParseRule::Number,
        ),
        pattern(
            "triglycerides",
            r"(?i)\btriglycerides?[:\s]+(\d+)",
            1,
            ParseRule::Number,
        ),
        // ── History flags — negated phrasings first ──────────
        pattern(
            "smoker",
            r"(?i)\b(?:non[-\s]?smoker|never\s+smoked|denies\s+(?:smoking|tobacco))\b",
            0,
            ParseRule::FlagFalse,
        ),
        pattern(
            "smoker",
            r"(?i)\b(?:current\s+smoker|active\s+smoker|smoker|smokes|tobacco\s+use)\b",
            0,
            ParseRule::FlagTrue,
        ),
        pattern(
            "diabetic",
            r"(?i)\b(?:no|denies|without)\s+(?:history\s+of\s+)?diabetes\b",
            0,
            ParseRule::FlagFalse,
        ),
        pattern(
            "diabetic",
            r"(?i)\b(?:type\s+[12]\s+)?diabet(?:es|ic)\b",
            0,
            ParseRule::FlagTrue,
        ),
        pattern(
            "hypertension",
            r"(?i)\b(?:no|denies|without)\s+(?:history\s+of\s+)?(?:hypertension|htn)\b",
            0,
            ParseRule::FlagFalse,
        ),
        pattern(
            "hypertension",
            r"(?i)\b(?:hypertension|htn)\b",
            0,
            ParseRule::FlagTrue,
        ),
    ]
});

/// Run the pattern table over a narrative. One entity per field, all at the
/// supplied confidence.
pub fn pattern_entities(text: &str, confidence: f32) -> Vec<ClinicalEntity> {
    let mut seen: HashSet<&'static str> = HashSet::new();
    let mut entities = Vec::new();

    for fp in PATTERNS.iter() {
        if seen.contains(fp.field) {
            continue;
        }
        let Some(caps) = fp.regex.captures(text) else {
            continue;
        };
        let Some(value) = apply_rule(&fp.rule, &caps, fp.group) else {
            continue;
        };
        let span = caps.get(0).map(|m| SourceSpan {
            offset: m.start(),
            length: m.len(),
        });
        seen.insert(fp.field);
        entities.push(ClinicalEntity {
            field: fp.field.to_string(),
            value,
            confidence,
            method: ExtractionMethod::Pattern,
            span,
        });
    }

    entities
}

fn apply_rule(rule: &ParseRule, caps: &regex::Captures<'_>, group: usize) -> Option<FieldValue> {
    match rule {
        ParseRule::Number => {
            let raw = caps.get(group)?.as_str();
            raw.parse::<f64>().ok().map(FieldValue::Number)
        }
        ParseRule::PercentFromFraction => {
            let numerator: f64 = caps.get(1)?.as_str().parse().ok()?;
            let denominator: f64 = caps.get(2)?.as_str().parse().ok()?;
            if denominator <= 0.0 {
                return None;
            }
            Some(FieldValue::Number(100.0 * numerator / denominator))
        }
        ParseRule::Stage => normalize_stage(caps.get(group)?.as_str()),
        ParseRule::Sex => normalize_sex(caps.get(group)?.as_str()),
        ParseRule::FlagTrue => Some(FieldValue::Flag(true)),
        ParseRule::FlagFalse => Some(FieldValue::Flag(false)),
    }
}

/// Normalize a T-stage capture to the canonical "T1c" form, dropping a
/// leading clinical-staging "c" prefix.
fn normalize_stage(raw: &str) -> Option<FieldValue> {
    let s = raw.trim();
    let s = match s.strip_prefix(['c', 'C']) {
        Some(rest) if rest.starts_with(['t', 'T']) => rest,
        _ => s,
    };
    let mut chars = s.chars();
    match chars.next() {
        Some('t') | Some('T') => Some(FieldValue::Text(format!(
            "T{}",
            chars.as_str().to_lowercase()
        ))),
        _ => None,
    }
}

fn normalize_sex(raw: &str) -> Option<FieldValue> {
    match raw.trim().to_lowercase().as_str() {
        "m" | "male" | "man" => Some(FieldValue::Text("male".into())),
        "f" | "female" | "woman" => Some(FieldValue::Text("female".into())),
        _ => None,
    }
}
