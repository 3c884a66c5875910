//! Calculator execution seam.
//!
//! The engine suggests and sequences calculators but does not own their
//! arithmetic: each one is a [`CalculatorModule`] implementation registered
//! in a [`CalculatorSet`]. Implementations are pure (same fields, same
//! report) and validate their inputs up front, so a bad field surfaces as a
//! [`ValidationError`] instead of a wrong score.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::fields::FieldMap;

// ─── Reports and errors ──────────────────────────────────────────────────────

/// Input problem a calculator found before evaluating anything.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{calculator_id}: {message}")]
pub struct ValidationError {
    pub calculator_id: String,
    pub field: Option<String>,
    pub message: String,
}

/// Qualitative read of a computed score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Intermediate,
    High,
}

/// Completed calculator output, ready for note synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculatorReport {
    pub calculator_id: String,
    pub value: f64,
    pub unit: Option<String>,
    pub interpretation: String,
    pub risk_level: Option<RiskLevel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
}

// ─── Module trait and set ────────────────────────────────────────────────────

/// One decision-support calculator.
pub trait CalculatorModule: Send + Sync {
    /// Stable identifier matching the requirement registry.
    fn calculator_id(&self) -> &str;

    /// Evaluate against extracted (and user-corrected) fields.
    fn evaluate(&self, fields: &FieldMap) -> Result<CalculatorReport, ValidationError>;
}

/// Immutable id → module map assembled at startup.
#[derive(Clone, Default)]
pub struct CalculatorSet {
    modules: BTreeMap<String, Arc<dyn CalculatorModule>>,
}

impl CalculatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, module: Arc<dyn CalculatorModule>) -> Self {
        let id = module.calculator_id().to_string();
        if self.modules.insert(id.clone(), module).is_some() {
            tracing::warn!(calculator_id = %id, "duplicate calculator module replaced");
        }
        self
    }

    pub fn get(&self, calculator_id: &str) -> Option<&Arc<dyn CalculatorModule>> {
        self.modules.get(calculator_id)
    }

    pub fn contains(&self, calculator_id: &str) -> bool {
        self.modules.contains_key(calculator_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl fmt::Debug for CalculatorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalculatorSet")
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ─── Input helpers for implementations ───────────────────────────────────────

pub fn require_number(
    calculator_id: &str,
    fields: &FieldMap,
    key: &str,
) -> Result<f64, ValidationError> {
    match fields.get(key) {
        None => Err(missing(calculator_id, key)),
        Some(value) => value
            .as_number()
            .ok_or_else(|| wrong_shape(calculator_id, key, "a numeric value")),
    }
}

pub fn require_text<'a>(
    calculator_id: &str,
    fields: &'a FieldMap,
    key: &str,
) -> Result<&'a str, ValidationError> {
    match fields.get(key) {
        None => Err(missing(calculator_id, key)),
        Some(value) => value
            .as_text()
            .ok_or_else(|| wrong_shape(calculator_id, key, "a text value")),
    }
}

pub fn require_flag(
    calculator_id: &str,
    fields: &FieldMap,
    key: &str,
) -> Result<bool, ValidationError> {
    match fields.get(key) {
        None => Err(missing(calculator_id, key)),
        Some(value) => value
            .as_flag()
            .ok_or_else(|| wrong_shape(calculator_id, key, "a yes/no value")),
    }
}

fn missing(calculator_id: &str, key: &str) -> ValidationError {
    ValidationError {
        calculator_id: calculator_id.into(),
        field: Some(key.into()),
        message: format!("required field '{key}' is missing"),
    }
}

fn wrong_shape(calculator_id: &str, key: &str, expected: &str) -> ValidationError {
    ValidationError {
        calculator_id: calculator_id.into(),
        field: Some(key.into()),
        message: format!("field '{key}' is not {expected}"),
    }
}

// ─── Mock module ─────────────────────────────────────────────────────────────

/// Canned calculator for tests and wiring checks.
pub struct MockCalculator {
    id: String,
    outcome: Result<CalculatorReport, ValidationError>,
}

impl MockCalculator {
    pub fn succeeding(id: &str, value: f64, interpretation: &str) -> Self {
        Self {
            id: id.into(),
            outcome: Ok(CalculatorReport {
                calculator_id: id.into(),
                value,
                unit: None,
                interpretation: interpretation.into(),
                risk_level: None,
                recommendations: vec![],
                references: vec![],
            }),
        }
    }

    pub fn failing(id: &str, message: &str) -> Self {
        Self {
            id: id.into(),
            outcome: Err(ValidationError {
                calculator_id: id.into(),
                field: None,
                message: message.into(),
            }),
        }
    }
}

impl CalculatorModule for MockCalculator {
    fn calculator_id(&self) -> &str {
        &self.id
    }

    fn evaluate(&self, _fields: &FieldMap) -> Result<CalculatorReport, ValidationError> {
        self.outcome.clone()
    }
}
