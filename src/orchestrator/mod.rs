//! Two-stage orchestration with a human review gate.
//!
//! A session moves `COLLECTING → SUGGESTED → FINALIZING → COMPLETE`; `FAILED`
//! is reachable from any non-terminal stage. `start` extracts entities,
//! composes the preliminary note, and ranks calculator suggestions; `review`
//! records the clinician's selections and field corrections; `finalize` runs
//! the selected calculators and synthesizes the final note.
//!
//! Failure posture: calculator problems are per-id partial failures, evidence
//! retrieval degrades to none, and a dead synthesis provider degrades to a
//! deterministic calculator-only note whenever at least one calculator
//! computed. Only the combination "nothing computed and synthesis failed"
//! fails the session. Every exit path — completion, abort, failure, expiry —
//! scrubs the session from memory.

pub mod compose;
pub mod prompt;
pub mod types;

use std::sync::Arc;

use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;
use zeroize::Zeroize;

use crate::calculators::{CalculatorSet, ValidationError};
use crate::config::EngineConfig;
use crate::extraction::EntityExtractor;
use crate::fields::{self, FieldMap};
use crate::provider::{call_with_retry, KnowledgeRetriever, LlmProvider};
use crate::registry::CalculatorRegistry;
use crate::session::SessionStore;
use crate::suggestion::suggest;

use self::compose::{compose_fallback_note, NoteComposer, SectionComposer};
use self::prompt::{build_evidence_query, build_synthesis_prompt, SYNTHESIS_SYSTEM_PROMPT};

pub use self::types::{
    CalculatorOutcome, FinalizeOutput, OrchestrationSession, OrchestratorError, ReviewOutput,
    SessionStatus, Stage, StartOutput, SynthesisFailureKind,
};

// ═══════════════════════════════════════════════════════════
// Orchestrator
// ═══════════════════════════════════════════════════════════

pub struct Orchestrator {
    extractor: EntityExtractor,
    registry: CalculatorRegistry,
    calculators: CalculatorSet,
    provider: Arc<dyn LlmProvider>,
    retriever: Option<Arc<dyn KnowledgeRetriever>>,
    composer: Box<dyn NoteComposer>,
    store: Arc<SessionStore<OrchestrationSession>>,
    config: EngineConfig,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        registry: CalculatorRegistry,
        calculators: CalculatorSet,
        config: EngineConfig,
    ) -> Self {
        Self {
            extractor: EntityExtractor::new(Arc::clone(&provider), config.clone()),
            store: Arc::new(SessionStore::new(config.session_ttl)),
            composer: Box::new(SectionComposer),
            retriever: None,
            provider,
            registry,
            calculators,
            config,
        }
    }

    /// Attach a knowledge retriever; without one, finalize synthesizes from
    /// calculator results alone.
    pub fn with_retriever(mut self, retriever: Arc<dyn KnowledgeRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_composer(mut self, composer: Box<dyn NoteComposer>) -> Self {
        self.composer = composer;
        self
    }

    /// Start the background TTL sweeper for this orchestrator's sessions.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        self.store.spawn_sweeper(self.config.sweep_interval)
    }

    // ─── start ───────────────────────────────────────────────────────────

    /// Open a session from a clinical narrative: extract entities, compose
    /// the preliminary note, rank calculator suggestions. The narrative is
    /// never rejected on content; a sparse one just resolves fewer fields.
    pub async fn start(&self, narrative: &str) -> Result<StartOutput, OrchestratorError> {
        let narrative = narrative.trim();
        let mut session =
            OrchestrationSession::new(narrative.to_string(), self.config.session_ttl);
        let session_id = session.session_id;
        tracing::info!(session_id = %session_id, chars = narrative.len(), "intake started");

        // Extraction never fails outright; a dead model degrades to
        // pattern-only results.
        let extraction = self.extractor.extract(narrative).await;
        session.entities = extraction.entities;
        session.degraded_extraction = extraction.degraded;
        session.extraction_notes = extraction.notes;

        session.preliminary_note = self
            .composer
            .compose_preliminary(narrative, &session.entities);
        session.suggestions = suggest(&session.entities, &self.registry, &self.config);
        session.stage = Stage::Suggested;

        let output = StartOutput {
            session_id,
            stage: session.stage,
            preliminary_note: session.preliminary_note.clone(),
            entities: session.entities.clone(),
            degraded_extraction: session.degraded_extraction,
            extraction_notes: session.extraction_notes.clone(),
            suggestions: session.suggestions.clone(),
        };
        self.store.insert(session_id, session)?;
        tracing::info!(
            session_id = %session_id,
            fields = output.entities.len(),
            suggestions = output.suggestions.len(),
            degraded = output.degraded_extraction,
            "session suggested"
        );
        Ok(output)
    }

    // ─── review ──────────────────────────────────────────────────────────

    /// Record the reviewer's calculator selections and field corrections.
    /// The selections are the sole execution authority: suggestions omitted
    /// here are never run, whatever their tier. User-supplied fields
    /// overwrite extracted values unconditionally.
    pub fn review(
        &self,
        session_id: Uuid,
        selected_calculator_ids: Vec<String>,
        user_supplied_fields: FieldMap,
    ) -> Result<ReviewOutput, OrchestratorError> {
        let mut session = self.store.acquire(&session_id)?;
        if session.stage != Stage::Suggested {
            return Err(stage_conflict(&session, "review"));
        }

        for key in user_supplied_fields.keys() {
            if !fields::is_canonical(key) {
                tracing::debug!(session_id = %session_id, field = %key, "user override uses a non-catalog field");
            }
        }
        session.user_supplied_fields = user_supplied_fields;
        session.selected_calculator_ids = selected_calculator_ids;
        session.stage = Stage::Finalizing;

        tracing::info!(
            session_id = %session_id,
            selected = session.selected_calculator_ids.len(),
            overrides = session.user_supplied_fields.len(),
            "review accepted"
        );
        Ok(ReviewOutput {
            session_id,
            stage: session.stage,
            selected_calculator_ids: session.selected_calculator_ids.clone(),
            merged_fields: session.merged_fields(),
        })
    }

    // ─── finalize ────────────────────────────────────────────────────────

    /// Run the selected calculators in selection order, gather optional
    /// evidence, synthesize the final note, and destroy the session.
    pub async fn finalize(&self, session_id: Uuid) -> Result<FinalizeOutput, OrchestratorError> {
        let guard = self.store.acquire(&session_id)?;
        if guard.stage != Stage::Finalizing {
            return Err(stage_conflict(&guard, "finalize"));
        }

        // Past this point the session must not outlive the call: the guard
        // marks it FAILED and scrubs it unless the transition completes.
        let mut armed = FailGuard::arm(&self.store, session_id, guard);
        let output = self.run_finalize(&mut armed).await?;
        armed.complete()?;
        Ok(output)
    }

    async fn run_finalize(
        &self,
        armed: &mut FailGuard<'_>,
    ) -> Result<FinalizeOutput, OrchestratorError> {
        let (session_id, merged, selected, preliminary) = {
            let session = armed.session()?;
            (
                session.session_id,
                session.merged_fields(),
                session.selected_calculator_ids.clone(),
                session.preliminary_note.clone(),
            )
        };

        // Step 1: calculators, in selection order. Failures are recorded
        // per id and never abort the pass.
        let mut outcomes: Vec<CalculatorOutcome> = Vec::with_capacity(selected.len());
        for calculator_id in &selected {
            let outcome = match self.calculators.get(calculator_id) {
                None => {
                    tracing::warn!(
                        session_id = %session_id,
                        calculator_id = %calculator_id,
                        "selected calculator is not installed"
                    );
                    CalculatorOutcome::Failed(ValidationError {
                        calculator_id: calculator_id.clone(),
                        field: None,
                        message: "unknown calculator id".into(),
                    })
                }
                Some(module) => match module.evaluate(&merged) {
                    Ok(report) => CalculatorOutcome::Completed(report),
                    Err(error) => {
                        tracing::warn!(
                            session_id = %session_id,
                            calculator_id = %calculator_id,
                            error = %error,
                            "calculator failed validation"
                        );
                        CalculatorOutcome::Failed(error)
                    }
                },
            };
            outcomes.push(outcome);
        }
        let computed = outcomes.iter().filter(|o| o.succeeded()).count();
        tracing::info!(
            session_id = %session_id,
            selected = selected.len(),
            computed,
            "calculators finished"
        );

        // Step 2: evidence. Optional collaborator; failures degrade to none.
        let evidence = match &self.retriever {
            None => Vec::new(),
            Some(retriever) => {
                let query = build_evidence_query(&outcomes);
                let category = outcomes
                    .iter()
                    .filter(|o| o.succeeded())
                    .find_map(|o| self.registry.get(o.calculator_id()))
                    .map(|r| r.category.clone());
                match call_with_retry(
                    "evidence_retrieval",
                    self.config.provider_timeout,
                    self.config.provider_retries,
                    || retriever.search(&query, category.as_deref(), self.config.evidence_passages),
                )
                .await
                {
                    Ok(passages) => passages,
                    Err(e) => {
                        tracing::warn!(
                            session_id = %session_id,
                            error = %e,
                            "evidence retrieval failed; synthesizing without evidence"
                        );
                        Vec::new()
                    }
                }
            }
        };

        // Step 3: synthesis. A provider failure degrades to the
        // deterministic calculator-only note when anything computed.
        let synthesis_prompt = build_synthesis_prompt(&preliminary, &outcomes, &evidence);
        match call_with_retry(
            "note_synthesis",
            self.config.provider_timeout,
            self.config.provider_retries,
            || self.provider.generate(&synthesis_prompt, SYNTHESIS_SYSTEM_PROMPT),
        )
        .await
        {
            Ok(final_note) => {
                tracing::info!(session_id = %session_id, "final note synthesized");
                Ok(FinalizeOutput {
                    session_id,
                    stage: Stage::Complete,
                    final_note,
                    calculator_outcomes: outcomes,
                    evidence,
                    synthesis_degraded: false,
                })
            }
            Err(e) if computed > 0 => {
                tracing::warn!(
                    session_id = %session_id,
                    error = %e,
                    "synthesis failed; returning calculator-only note"
                );
                Ok(FinalizeOutput {
                    session_id,
                    stage: Stage::Complete,
                    final_note: compose_fallback_note(&preliminary, &outcomes),
                    calculator_outcomes: outcomes,
                    evidence,
                    synthesis_degraded: true,
                })
            }
            Err(e) => {
                tracing::error!(
                    session_id = %session_id,
                    error = %e,
                    "synthesis failed with no calculator results; failing session"
                );
                Err(OrchestratorError::SynthesisFailed {
                    kind: SynthesisFailureKind::from(&e),
                    preliminary_note: preliminary,
                })
            }
        }
    }

    // ─── abort / status ──────────────────────────────────────────────────

    /// Discard a session before calculator execution begins. In
    /// `FINALIZING` this is a point of no return and the call is rejected.
    pub fn abort(&self, session_id: Uuid) -> Result<(), OrchestratorError> {
        let mut session = self.store.acquire(&session_id)?;
        if !session.stage.allows_abort() {
            return Err(stage_conflict(&session, "abort"));
        }
        tracing::info!(session_id = %session_id, stage = %session.stage, "session aborted");
        session.zeroize();
        // Detach while still holding the guard so no one can acquire the
        // scrubbed slot in between.
        self.store.remove(&session_id)?;
        drop(session);
        Ok(())
    }

    /// Read-only snapshot. Polling is not activity: the lifetime advertised
    /// in `expires_at` stands however often the session is touched.
    pub fn status(&self, session_id: Uuid) -> Result<SessionStatus, OrchestratorError> {
        let session = self.store.acquire(&session_id)?;
        Ok(SessionStatus {
            session_id,
            stage: session.stage,
            created_at: session.created_at,
            expires_at: session.expires_at,
        })
    }
}

fn stage_conflict(session: &OrchestrationSession, operation: &str) -> OrchestratorError {
    OrchestratorError::StageConflict {
        session_id: session.session_id,
        reason: format!("{operation} is not allowed in stage {}", session.stage),
    }
}

// ═══════════════════════════════════════════════════════════
// FailGuard — crash-safe transitions
// ═══════════════════════════════════════════════════════════

/// Holds the session lock for one transition. If the transition errors out
/// or its future is dropped mid-await, `Drop` marks the session failed,
/// scrubs it, and detaches it from the store. `complete` does the same
/// scrub-and-detach without the failure marker.
struct FailGuard<'a> {
    store: &'a SessionStore<OrchestrationSession>,
    session_id: Uuid,
    guard: Option<OwnedMutexGuard<OrchestrationSession>>,
}

impl<'a> FailGuard<'a> {
    fn arm(
        store: &'a SessionStore<OrchestrationSession>,
        session_id: Uuid,
        guard: OwnedMutexGuard<OrchestrationSession>,
    ) -> Self {
        Self {
            store,
            session_id,
            guard: Some(guard),
        }
    }

    fn session(&mut self) -> Result<&mut OrchestrationSession, OrchestratorError> {
        self.guard.as_deref_mut().ok_or_else(|| {
            OrchestratorError::Internal("transition guard already released".into())
        })
    }

    /// Defuse: the transition succeeded, scrub and detach the session.
    fn complete(mut self) -> Result<(), OrchestratorError> {
        if let Some(mut guard) = self.guard.take() {
            guard.stage = Stage::Complete;
            guard.zeroize();
            self.store.remove(&self.session_id)?;
            drop(guard);
        }
        Ok(())
    }
}

impl Drop for FailGuard<'_> {
    fn drop(&mut self) {
        let Some(mut guard) = self.guard.take() else {
            return;
        };
        tracing::warn!(
            session_id = %self.session_id,
            stage = %guard.stage,
            "transition did not complete; failing and scrubbing session"
        );
        guard.stage = Stage::Failed;
        guard.zeroize();
        if let Err(e) = self.store.remove(&self.session_id) {
            tracing::warn!(session_id = %self.session_id, error = %e, "session detach failed during scrub");
        }
        drop(guard);
    }
}
