//! End-to-end intake walkthrough: start → review → finalize over a
//! prostate-cancer narrative, with a real CAPRA calculator module wired in.
//!
//! Offline by default — extraction runs on the pattern tables and synthesis
//! uses a canned response. Point it at a running Ollama instance to see real
//! model extraction and synthesis:
//!
//!   NOTIVA_OLLAMA_MODEL=medgemma cargo run --example intake_walkthrough

use std::sync::Arc;

use notiva::calculators::{
    self, CalculatorModule, CalculatorReport, CalculatorSet, RiskLevel, ValidationError,
};
use notiva::fields::FieldMap;
use notiva::provider::{LlmProvider, MockProvider, OllamaProvider};
use notiva::registry::catalog;
use notiva::{CalculatorOutcome, EngineConfig, Orchestrator};

const NARRATIVE: &str =
    "72 yo M with PSA 8.5, Gleason 3+4, clinical stage T1c, 4/12 cores positive";

const CANNED_SYNTHESIS: &str = "# Clinical Note\n\n\
    72-year-old male with newly diagnosed prostate adenocarcinoma: PSA 8.5 ng/mL, \
    Gleason 3+4, clinical stage T1c, 4 of 12 biopsy cores positive.\n\n\
    ## Risk Stratification\n\n\
    UCSF-CAPRA score 3, consistent with intermediate-risk disease.";

/// UCSF-CAPRA points model for localized prostate cancer.
struct Capra;

impl CalculatorModule for Capra {
    fn calculator_id(&self) -> &str {
        "capra"
    }

    fn evaluate(&self, fields: &FieldMap) -> Result<CalculatorReport, ValidationError> {
        let age = calculators::require_number("capra", fields, "age")?;
        let psa = calculators::require_number("capra", fields, "psa")?;
        let primary = calculators::require_number("capra", fields, "gleason_primary")?;
        let secondary = calculators::require_number("capra", fields, "gleason_secondary")?;
        let stage = calculators::require_text("capra", fields, "clinical_stage")?;
        let cores = calculators::require_number("capra", fields, "percent_positive_cores")?;

        let mut points = 0.0;
        if age >= 50.0 {
            points += 1.0;
        }
        points += match psa {
            p if p <= 6.0 => 0.0,
            p if p <= 10.0 => 1.0,
            p if p <= 20.0 => 2.0,
            p if p <= 30.0 => 3.0,
            _ => 4.0,
        };
        // Gleason: dominant pattern 4-5 scores 3; secondary 4-5 scores 1.
        if primary >= 4.0 {
            points += 3.0;
        } else if secondary >= 4.0 {
            points += 1.0;
        }
        if stage.starts_with("T3") {
            points += 1.0;
        }
        if cores >= 34.0 {
            points += 1.0;
        }

        let risk_level = match points {
            p if p <= 2.0 => RiskLevel::Low,
            p if p <= 5.0 => RiskLevel::Intermediate,
            _ => RiskLevel::High,
        };
        let descriptor = match risk_level {
            RiskLevel::Low => "low",
            RiskLevel::Intermediate => "intermediate",
            RiskLevel::High => "high",
        };

        Ok(CalculatorReport {
            calculator_id: "capra".into(),
            value: points,
            unit: None,
            interpretation: format!("CAPRA {points:.0}: {descriptor} risk of recurrence"),
            risk_level: Some(risk_level),
            recommendations: vec![
                "Discuss treatment options in line with the risk group.".into(),
            ],
            references: vec!["Cooperberg MR et al., J Urol 2005".into()],
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let provider: Arc<dyn LlmProvider> = match std::env::var("NOTIVA_OLLAMA_MODEL") {
        Ok(model) => {
            println!("Using Ollama at localhost:11434 with model {model}\n");
            Arc::new(OllamaProvider::default_local(&model)?)
        }
        Err(_) => {
            println!("NOTIVA_OLLAMA_MODEL not set; running offline with canned synthesis\n");
            Arc::new(MockProvider::new(CANNED_SYNTHESIS))
        }
    };

    let calculators = CalculatorSet::new().with_module(Arc::new(Capra));
    let orchestrator = Orchestrator::new(
        provider,
        catalog::default_registry(),
        calculators,
        EngineConfig::default(),
    );

    println!("═══ start ═══\n");
    println!("narrative: {NARRATIVE}\n");
    let started = orchestrator.start(NARRATIVE).await?;
    println!("session {} (degraded extraction: {})", started.session_id, started.degraded_extraction);
    println!("\n{}", started.preliminary_note);

    println!("top suggestions:");
    for suggestion in started.suggestions.iter().take(6) {
        println!(
            "  {:<24} tier={:<6} auto={:<5} missing={:?}",
            suggestion.calculator_id,
            format!("{:?}", suggestion.tier).to_lowercase(),
            suggestion.auto_selected,
            suggestion.missing_fields,
        );
    }

    let selections: Vec<String> = started
        .suggestions
        .iter()
        .filter(|s| s.auto_selected)
        .map(|s| s.calculator_id.clone())
        .collect();
    println!("\n═══ review ═══\n");
    println!("accepting auto-selection: {selections:?}");
    let reviewed = orchestrator.review(started.session_id, selections, FieldMap::new())?;
    println!(
        "stage {} with {} merged fields",
        reviewed.stage,
        reviewed.merged_fields.len()
    );

    println!("\n═══ finalize ═══\n");
    let finalized = orchestrator.finalize(started.session_id).await?;
    for outcome in &finalized.calculator_outcomes {
        match outcome {
            CalculatorOutcome::Completed(report) => {
                println!("  ✅ {} = {:.0} — {}", report.calculator_id, report.value, report.interpretation);
            }
            CalculatorOutcome::Failed(error) => {
                println!("  ❌ {} — {}", error.calculator_id, error.message);
            }
        }
    }
    println!(
        "\nsynthesis degraded: {}\n\n{}",
        finalized.synthesis_degraded, finalized.final_note
    );

    Ok(())
}
