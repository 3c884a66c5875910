//! Hybrid entity extraction.
//!
//! Two sub-extractors feed one deduplicated [`EntitySet`]:
//! - pattern tables (`patterns`) — compiled regexes over the field catalog,
//!   high confidence, byte spans into the source;
//! - the model (`model`) — constrained-JSON prompting for whatever the
//!   tables left unresolved, lower confidence, lenient parsing.
//!
//! Per-field collisions resolve to the higher confidence; exact ties go to
//! the pattern result so identical input always yields identical output.

pub mod extractor;
pub mod model;
pub mod patterns;
pub mod types;

pub use extractor::EntityExtractor;
pub use types::{ClinicalEntity, EntitySet, ExtractionMethod, ExtractionOutcome, SourceSpan};
