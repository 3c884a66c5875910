//! Orchestration stages, session state, and operation payloads.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroize;

use crate::calculators::{CalculatorReport, ValidationError};
use crate::extraction::EntitySet;
use crate::fields::FieldMap;
use crate::provider::{EvidencePassage, ProviderError};
use crate::session::SessionStoreError;
use crate::suggestion::Suggestion;

// ═══════════════════════════════════════════════════════════
// Stage
// ═══════════════════════════════════════════════════════════

/// Lifecycle stage of an orchestration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Collecting,
    Suggested,
    Finalizing,
    Complete,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Complete | Stage::Failed)
    }

    /// Abort is allowed until calculator execution begins.
    pub fn allows_abort(self) -> bool {
        matches!(self, Stage::Collecting | Stage::Suggested)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Collecting => "collecting",
            Stage::Suggested => "suggested",
            Stage::Finalizing => "finalizing",
            Stage::Complete => "complete",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════
// Session state
// ═══════════════════════════════════════════════════════════

/// Everything the engine holds for one intake, from first extraction to the
/// final note. Lives only in the ephemeral store and is scrubbed on every
/// exit path, so it deliberately does not implement `Serialize`.
#[derive(Debug)]
pub struct OrchestrationSession {
    pub session_id: Uuid,
    pub stage: Stage,
    pub narrative: String,
    pub preliminary_note: String,
    pub entities: EntitySet,
    pub degraded_extraction: bool,
    pub extraction_notes: Vec<String>,
    pub suggestions: Vec<Suggestion>,
    pub selected_calculator_ids: Vec<String>,
    pub user_supplied_fields: FieldMap,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OrchestrationSession {
    pub fn new(narrative: String, ttl: Duration) -> Self {
        let created_at = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|d| created_at.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            session_id: Uuid::new_v4(),
            stage: Stage::Collecting,
            narrative,
            preliminary_note: String::new(),
            entities: EntitySet::default(),
            degraded_extraction: false,
            extraction_notes: Vec::new(),
            suggestions: Vec::new(),
            selected_calculator_ids: Vec::new(),
            user_supplied_fields: FieldMap::new(),
            created_at,
            expires_at,
        }
    }

    /// Extracted values merged with the reviewer's corrections. User input
    /// always wins, regardless of extraction confidence.
    pub fn merged_fields(&self) -> FieldMap {
        let mut merged = self.entities.field_map();
        for (key, value) in &self.user_supplied_fields {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}

impl Zeroize for OrchestrationSession {
    fn zeroize(&mut self) {
        self.narrative.zeroize();
        self.preliminary_note.zeroize();
        self.entities.zeroize();
        for note in &mut self.extraction_notes {
            note.zeroize();
        }
        self.extraction_notes.clear();
        for value in self.user_supplied_fields.values_mut() {
            value.zeroize();
        }
        self.user_supplied_fields.clear();
        self.suggestions.clear();
        self.selected_calculator_ids.clear();
        self.degraded_extraction = false;
    }
}

// ═══════════════════════════════════════════════════════════
// Operation payloads
// ═══════════════════════════════════════════════════════════

/// Result of `start`: the session handle plus everything the reviewer needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartOutput {
    pub session_id: Uuid,
    pub stage: Stage,
    pub preliminary_note: String,
    pub entities: EntitySet,
    pub degraded_extraction: bool,
    pub extraction_notes: Vec<String>,
    pub suggestions: Vec<Suggestion>,
}

/// Result of `review`: the accepted selections and the merged field view the
/// calculators will run against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOutput {
    pub session_id: Uuid,
    pub stage: Stage,
    pub selected_calculator_ids: Vec<String>,
    pub merged_fields: FieldMap,
}

/// Per-calculator result, in selection order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CalculatorOutcome {
    Completed(CalculatorReport),
    Failed(ValidationError),
}

impl CalculatorOutcome {
    pub fn calculator_id(&self) -> &str {
        match self {
            CalculatorOutcome::Completed(report) => &report.calculator_id,
            CalculatorOutcome::Failed(error) => &error.calculator_id,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, CalculatorOutcome::Completed(_))
    }
}

/// Result of `finalize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeOutput {
    pub session_id: Uuid,
    pub stage: Stage,
    pub final_note: String,
    pub calculator_outcomes: Vec<CalculatorOutcome>,
    pub evidence: Vec<EvidencePassage>,
    /// True when synthesis fell back to the deterministic calculator-only
    /// note because the provider was unreachable.
    pub synthesis_degraded: bool,
}

/// Read-only session snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: Uuid,
    pub stage: Stage,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

/// Why final synthesis failed, as retry guidance for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisFailureKind {
    ProviderUnavailable,
    RateLimited,
    Timeout,
    InvalidResponse,
}

impl SynthesisFailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SynthesisFailureKind::ProviderUnavailable => "provider_unavailable",
            SynthesisFailureKind::RateLimited => "rate_limited",
            SynthesisFailureKind::Timeout => "timeout",
            SynthesisFailureKind::InvalidResponse => "invalid_response",
        }
    }
}

impl fmt::Display for SynthesisFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&ProviderError> for SynthesisFailureKind {
    fn from(e: &ProviderError) -> Self {
        match e {
            ProviderError::Unavailable(_) => SynthesisFailureKind::ProviderUnavailable,
            ProviderError::RateLimited(_) => SynthesisFailureKind::RateLimited,
            ProviderError::Timeout(_) => SynthesisFailureKind::Timeout,
            ProviderError::InvalidResponse(_) => SynthesisFailureKind::InvalidResponse,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Session {session_id}: {reason}")]
    StageConflict { session_id: Uuid, reason: String },

    #[error("Session {0} not found")]
    SessionNotFound(Uuid),

    #[error("Session {0} has expired")]
    SessionExpired(Uuid),

    /// Terminal synthesis failure. The session is already scrubbed, so the
    /// preliminary note rides along for salvage.
    #[error("Final synthesis failed ({kind})")]
    SynthesisFailed {
        kind: SynthesisFailureKind,
        preliminary_note: String,
    },

    #[error("Internal engine error: {0}")]
    Internal(String),
}

impl From<SessionStoreError> for OrchestratorError {
    fn from(e: SessionStoreError) -> Self {
        match e {
            SessionStoreError::NotFound(id) => OrchestratorError::SessionNotFound(id),
            SessionStoreError::Expired(id) => OrchestratorError::SessionExpired(id),
            SessionStoreError::Busy(id) => OrchestratorError::StageConflict {
                session_id: id,
                reason: "another transition is in flight".into(),
            },
            SessionStoreError::Duplicate(id) => {
                OrchestratorError::Internal(format!("session id collision: {id}"))
            }
            SessionStoreError::LockPoisoned => {
                OrchestratorError::Internal("session store lock poisoned".into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{ClinicalEntity, ExtractionMethod};
    use crate::fields::FieldValue;

    fn session_with_age() -> OrchestrationSession {
        let mut session = OrchestrationSession::new(
            "72 yo M, here for follow-up".into(),
            Duration::from_secs(1800),
        );
        session.entities = EntitySet::from_entities(vec![ClinicalEntity {
            field: "age".into(),
            value: FieldValue::Number(72.0),
            confidence: 0.9,
            method: ExtractionMethod::Pattern,
            span: None,
        }]);
        session
    }

    #[test]
    fn stage_predicates() {
        assert!(Stage::Complete.is_terminal());
        assert!(Stage::Failed.is_terminal());
        assert!(!Stage::Finalizing.is_terminal());
        assert!(Stage::Suggested.allows_abort());
        assert!(!Stage::Finalizing.allows_abort());
    }

    #[test]
    fn stage_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Stage::Finalizing).unwrap(),
            "\"finalizing\""
        );
    }

    #[test]
    fn user_fields_overwrite_extracted_values() {
        let mut session = session_with_age();
        session
            .user_supplied_fields
            .insert("age".into(), FieldValue::Number(80.0));
        session
            .user_supplied_fields
            .insert("psa".into(), FieldValue::Number(6.1));

        let merged = session.merged_fields();
        assert_eq!(merged.get("age").and_then(|v| v.as_number()), Some(80.0));
        assert_eq!(merged.get("psa").and_then(|v| v.as_number()), Some(6.1));
    }

    #[test]
    fn zeroize_clears_clinical_content() {
        let mut session = session_with_age();
        session.preliminary_note = "## Narrative\n72 yo M".into();
        session.selected_calculator_ids = vec!["capra".into()];
        session
            .user_supplied_fields
            .insert("psa".into(), FieldValue::Number(8.5));

        session.zeroize();
        assert!(session.narrative.is_empty());
        assert!(session.preliminary_note.is_empty());
        assert!(session.entities.is_empty());
        assert!(session.user_supplied_fields.is_empty());
        assert!(session.selected_calculator_ids.is_empty());
    }

    #[test]
    fn calculator_outcome_serializes_with_status_tag() {
        let outcome = CalculatorOutcome::Failed(ValidationError {
            calculator_id: "capra".into(),
            field: Some("psa".into()),
            message: "required field 'psa' is missing".into(),
        });
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["calculator_id"], "capra");
    }

    #[test]
    fn store_errors_map_to_orchestrator_errors() {
        let id = Uuid::new_v4();
        assert!(matches!(
            OrchestratorError::from(SessionStoreError::NotFound(id)),
            OrchestratorError::SessionNotFound(_)
        ));
        assert!(matches!(
            OrchestratorError::from(SessionStoreError::Expired(id)),
            OrchestratorError::SessionExpired(_)
        ));
        assert!(matches!(
            OrchestratorError::from(SessionStoreError::Busy(id)),
            OrchestratorError::StageConflict { .. }
        ));
    }
}
