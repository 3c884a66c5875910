//! Model sub-extractor: constrained-JSON prompting and lenient parsing.
//!
//! The model is only ever asked for fields the pattern tables left
//! unresolved, and its reply is filtered back through the field catalog:
//! unknown keys, nulls, and values of the wrong shape are dropped without
//! raising anything.

use serde_json::Value;

use super::types::{ClinicalEntity, ExtractionMethod};
use crate::fields::{self, FieldKind, FieldSpec, FieldValue};

pub const EXTRACTION_SYSTEM_PROMPT: &str = "You are a clinical data extraction engine. \
You read a clinical narrative and reply with ONE JSON object and nothing else. \
Use only the requested keys. Never invent a value the narrative does not state. \
Omit a key entirely when the narrative is silent about it.";

/// Build the extraction prompt for the outstanding catalog fields.
pub fn build_extraction_prompt(narrative: &str, outstanding: &[&'static FieldSpec]) -> String {
    let mut field_lines = String::new();
    for spec in outstanding {
        let shape = match spec.kind {
            FieldKind::Number => "number",
            FieldKind::Text => "string",
            FieldKind::Flag => "boolean",
        };
        field_lines.push_str(&format!("- \"{}\" ({shape}): {}\n", spec.key, spec.description));
    }

    format!(
        "Extract clinical fields from the narrative below.\n\
         Allowed keys, with the value type each expects:\n\
         {field_lines}\n\
         Reply with a single JSON object using only those keys, \
         including a key only when the narrative states its value.\n\n\
         NARRATIVE:\n{narrative}"
    )
}

/// Pull a JSON object out of a model reply that may wrap it in code fences
/// or prose.
pub(crate) fn extract_json_block(response: &str) -> Option<&str> {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```json") {
        let after_fence = &trimmed[start + 7..];
        if let Some(end) = after_fence.find("```") {
            return Some(after_fence[..end].trim());
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        if let Some(end) = after_fence.find("```") {
            let block = after_fence[..end].trim();
            if block.starts_with('{') {
                return Some(block);
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return Some(&trimmed[start..=end]);
        }
    }

    None
}

/// Parse a model reply into entities. Anything unusable is skipped, never
/// surfaced as an error.
pub fn parse_model_entities(response: &str, confidence: f32) -> Vec<ClinicalEntity> {
    let Some(block) = extract_json_block(response) else {
        tracing::debug!("no JSON object in model reply");
        return Vec::new();
    };

    let parsed: Value = match serde_json::from_str(block) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "model reply JSON did not parse");
            return Vec::new();
        }
    };
    let Value::Object(map) = parsed else {
        tracing::debug!("model reply JSON is not an object");
        return Vec::new();
    };

    let mut entities = Vec::new();
    for (key, raw) in &map {
        let Some(spec) = fields::field_spec(key) else {
            tracing::debug!(key, "dropping out-of-catalog key from model reply");
            continue;
        };
        let Some(value) = coerce(raw, spec.kind) else {
            continue;
        };
        entities.push(ClinicalEntity {
            field: spec.key.to_string(),
            value,
            confidence,
            method: ExtractionMethod::Model,
            span: None,
        });
    }

    entities
}

/// Coerce a JSON value into the declared field shape. Models occasionally
/// quote numbers and spell out booleans; accept those, reject the rest.
fn coerce(raw: &Value, kind: FieldKind) -> Option<FieldValue> {
    match kind {
        FieldKind::Number => match raw {
            Value::Number(n) => n.as_f64().map(FieldValue::Number),
            Value::String(s) => s.trim().parse::<f64>().ok().map(FieldValue::Number),
            _ => None,
        },
        FieldKind::Text => match raw {
            Value::String(s) if !s.trim().is_empty() => {
                Some(FieldValue::Text(s.trim().to_string()))
            }
            _ => None,
        },
        FieldKind::Flag => match raw {
            Value::Bool(b) => Some(FieldValue::Flag(*b)),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" => Some(FieldValue::Flag(true)),
                "false" | "no" => Some(FieldValue::Flag(false)),
                _ => None,
            },
            _ => None,
        },
    }
}
