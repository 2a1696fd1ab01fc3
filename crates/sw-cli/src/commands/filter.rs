//! Filter command - scores and gates candidates from a JSONL file.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sw_core::candidate::{Candidate, Context as DocumentContext};
use sw_core::evidence::{EvidenceScorer, ScorerConfig};
use sw_core::feedback::discover_feedback_files;
use sw_core::reliability::ReliabilityCatalog;
use sw_policy::{ConfidenceEngine, ConfidenceGateway, GatewayMode};

use crate::config::AppConfig;
use crate::OutputFormat;

/// Arguments for `style-warden filter`.
#[derive(Debug, Args)]
pub struct FilterArgs {
    /// JSONL file with one candidate per line
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Gateway configuration file
    #[arg(long, value_name = "FILE")]
    pub gateway_config: Option<PathBuf>,

    /// Reliability override file
    #[arg(long, value_name = "FILE")]
    pub overrides: Option<PathBuf>,

    /// Evidence scorer configuration file
    #[arg(long, value_name = "FILE")]
    pub scorer_config: Option<PathBuf>,

    /// Build term patterns from the feedback directory
    #[arg(long)]
    pub use_feedback: bool,

    /// Override the configured gateway mode
    #[arg(long, value_parser = parse_mode)]
    pub mode: Option<GatewayMode>,

    /// Block type of the candidates' context
    #[arg(long, default_value = "paragraph")]
    pub block_type: String,

    /// Content type of the document
    #[arg(long, default_value = "general")]
    pub content_type: String,

    /// Subject domain of the document
    #[arg(long, default_value = "general")]
    pub domain: String,

    /// Intended audience
    #[arg(long, default_value = "general")]
    pub audience: String,

    /// Print every decision
    #[arg(long)]
    pub detailed: bool,
}

fn parse_mode(value: &str) -> Result<GatewayMode, String> {
    GatewayMode::parse(value)
        .ok_or_else(|| format!("expected enabled, disabled or logging_only, got {value}"))
}

pub fn run(args: FilterArgs, app: &AppConfig, format: OutputFormat) -> Result<()> {
    let candidates = read_candidates(&args.input)?;

    let scorer = match args.scorer_config.as_ref().or(app.scorer_config.as_ref()) {
        Some(path) => ScorerConfig::load(path)
            .and_then(EvidenceScorer::new)
            .with_context(|| format!("Invalid scorer configuration {}", path.display()))?,
        None => EvidenceScorer::with_defaults(),
    };
    let gateway = ConfidenceGateway::from_path(
        args.gateway_config
            .clone()
            .unwrap_or_else(|| app.gateway_config.clone()),
    );
    if let Some(mode) = args.mode {
        gateway.set_mode(mode, "cli", Some("--mode flag"));
    }
    let overrides = args.overrides.as_ref().unwrap_or(&app.overrides);
    let engine = ConfidenceEngine::new(
        Arc::new(ReliabilityCatalog::with_overrides(overrides)),
        scorer,
        gateway,
    );

    if args.use_feedback {
        let files = discover_feedback_files(&app.feedback_dir).with_context(|| {
            format!("Cannot list feedback in {}", app.feedback_dir.display())
        })?;
        engine.refresh_patterns_from(&files);
    }

    let context = DocumentContext::from_strs(
        &args.block_type,
        &args.content_type,
        &args.domain,
        &args.audience,
    );
    let outcome = engine.process(candidates, &context);
    let decisions = if args.detailed {
        outcome
            .report
            .decisions
            .clone()
            .unwrap_or_else(|| engine.gateway().decision_log())
    } else {
        Vec::new()
    };

    if format == OutputFormat::Json {
        let passed: Vec<_> = outcome
            .passed
            .iter()
            .map(|s| {
                json!({
                    "candidate": s.candidate,
                    "evidence": s.evidence.value,
                    "explanation": s.evidence.explain(),
                })
            })
            .collect();
        let mut value = json!({ "report": outcome.report, "passed": passed });
        if args.detailed {
            value["decisions"] = serde_json::to_value(&decisions)?;
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", "Passed Candidates".bold());
    println!("─────────────────");
    if outcome.passed.is_empty() {
        println!("No candidates passed");
    }
    for scored in &outcome.passed {
        println!(
            "  {:<20} {:<24} {}",
            scored.candidate.category.cyan(),
            scored.candidate.flagged_text,
            scored.evidence.explain().dimmed()
        );
    }

    if args.detailed {
        println!();
        println!("{}", "Decisions".bold());
        for d in &decisions {
            let label = if d.passed {
                d.decision.as_str().green()
            } else {
                d.decision.as_str().red()
            };
            println!("  {:<8} {:<20} {}", label, d.category, d.reasoning);
        }
    }

    let report = &outcome.report;
    println!();
    println!("{}", "Gateway Report".bold());
    println!("──────────────");
    println!("  Mode:             {}", report.mode);
    println!("  Candidates:       {}", report.total_candidates);
    println!("  Passed:           {}", report.passed.to_string().green());
    println!("  Suppressed:       {}", report.suppressed.to_string().red());
    if report.would_suppress != report.suppressed {
        println!("  Would suppress:   {}", report.would_suppress);
    }
    println!("  Suppression rate: {:.1}%", report.suppression_rate * 100.0);
    println!("  Average evidence: {:.3}", report.average_evidence);
    println!(
        "  High / low:       {} / {}",
        report.high_confidence, report.low_confidence
    );
    Ok(())
}

fn read_candidates(path: &Path) -> Result<Vec<Candidate>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read candidates: {}", path.display()))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid candidate", path.display(), i + 1))
        })
        .collect()
}
