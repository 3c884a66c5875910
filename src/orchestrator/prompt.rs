//! Final-note synthesis prompts.

use std::fmt::Write;

use crate::orchestrator::types::CalculatorOutcome;
use crate::provider::EvidencePassage;

pub const SYNTHESIS_SYSTEM_PROMPT: &str = r#"
You are a clinical documentation assistant. Your ONLY role is to merge a
preliminary clinical note with computed calculator results and supporting
evidence into one coherent, well-structured note.

RULES — ABSOLUTE, NO EXCEPTIONS:
1. Use ONLY the information provided below. Never invent findings, values,
   diagnoses, or recommendations.
2. Report every calculator result exactly as given, including failures.
3. When citing evidence, name its source. Never cite evidence not provided.
4. Do NOT add an assessment or plan of your own; clinical judgment belongs
   to the reviewing clinician.
5. Output plain Markdown. No JSON, no code fences, no preamble.
"#;

/// Build the user prompt for final-note synthesis.
pub fn build_synthesis_prompt(
    preliminary_note: &str,
    outcomes: &[CalculatorOutcome],
    evidence: &[EvidencePassage],
) -> String {
    let mut prompt = String::new();

    prompt.push_str("<preliminary_note>\n");
    prompt.push_str(preliminary_note.trim());
    prompt.push_str("\n</preliminary_note>\n\n");

    prompt.push_str("<calculator_results>\n");
    if outcomes.is_empty() {
        prompt.push_str("(no calculators were run)\n");
    }
    for outcome in outcomes {
        match outcome {
            CalculatorOutcome::Completed(report) => {
                let _ = write!(
                    prompt,
                    "- {} = {:.2}{}: {}",
                    report.calculator_id,
                    report.value,
                    report
                        .unit
                        .as_deref()
                        .map(|u| format!(" {u}"))
                        .unwrap_or_default(),
                    report.interpretation
                );
                if let Some(risk) = report.risk_level {
                    let _ = write!(prompt, " (risk: {risk:?})");
                }
                prompt.push('\n');
                for recommendation in &report.recommendations {
                    let _ = writeln!(prompt, "  - recommendation: {recommendation}");
                }
            }
            CalculatorOutcome::Failed(error) => {
                let _ = writeln!(
                    prompt,
                    "- {} could not be computed: {}",
                    error.calculator_id, error.message
                );
            }
        }
    }
    prompt.push_str("</calculator_results>\n\n");

    if !evidence.is_empty() {
        prompt.push_str("<evidence>\n");
        for passage in evidence {
            let _ = writeln!(prompt, "[{}] {}", passage.source, passage.content.trim());
        }
        prompt.push_str("</evidence>\n\n");
    }

    prompt.push_str(
        "Write the final clinical note. Keep the narrative and structured findings, \
         add a \"Calculator Results\" section reporting each result above, and, when \
         evidence is present, a short \"Supporting Evidence\" section citing sources.",
    );
    prompt
}

/// Query for the knowledge retriever, derived from what actually computed.
pub fn build_evidence_query(outcomes: &[CalculatorOutcome]) -> String {
    let completed: Vec<&str> = outcomes
        .iter()
        .filter(|o| o.succeeded())
        .map(|o| o.calculator_id())
        .collect();
    if completed.is_empty() {
        "clinical risk score interpretation".to_string()
    } else {
        format!("interpretation and guidance for {}", completed.join(", "))
    }
}
