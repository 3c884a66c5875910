//! Notiva — clinical intake engine: entity extraction, calculator
//! suggestion, and two-stage note orchestration.
//!
//! The flow is `start → review → finalize`. [`orchestrator::Orchestrator::start`]
//! extracts structured fields from a free-text narrative (patterns first,
//! model for the remainder), composes a deterministic preliminary note, and
//! ranks every registered calculator by how completely the extracted fields
//! cover its requirements. A clinician reviews the suggestions, corrects
//! fields, and selects what actually runs; [`orchestrator::Orchestrator::finalize`]
//! executes the selected calculators, gathers optional evidence, and
//! synthesizes the final note. Sessions are ephemeral: every exit path
//! zeroizes patient data, and an idle session is scrubbed after its TTL.
//!
//! Nothing here is a medical device; outputs are drafts for clinician
//! review.

pub mod calculators;
pub mod config;
pub mod extraction;
pub mod fields;
pub mod orchestrator;
pub mod provider;
pub mod registry;
pub mod session;
pub mod suggestion;

pub use calculators::{CalculatorModule, CalculatorReport, CalculatorSet, ValidationError};
pub use config::EngineConfig;
pub use extraction::{ClinicalEntity, EntityExtractor, EntitySet, ExtractionOutcome};
pub use fields::{FieldMap, FieldValue};
pub use orchestrator::{
    CalculatorOutcome, FinalizeOutput, Orchestrator, OrchestratorError, ReviewOutput,
    SessionStatus, Stage, StartOutput,
};
pub use provider::{EvidencePassage, KnowledgeRetriever, LlmProvider, ProviderError};
pub use registry::{CalculatorRegistry, CalculatorRequirement};
pub use suggestion::{suggest, Suggestion, SuggestionTier};
