//! Validate command - checks the gateway configuration and override file.

use anyhow::{bail, Result};
use colored::Colorize;
use std::path::Path;

use sw_core::evidence::{EvidenceScorer, ScorerConfig};
use sw_core::reliability::{ReliabilityCatalog, ReliabilityOverrideFile};
use sw_policy::load_gateway_config;

#[derive(Debug, Default)]
struct Findings {
    errors: usize,
    warnings: usize,
}

impl Findings {
    fn ok(&self, what: &str, detail: &str) {
        println!("  {} {}: {}", "✓".green(), what, detail);
    }

    fn warn(&mut self, what: &str, detail: &str) {
        self.warnings += 1;
        println!("  {} {}: {}", "!".yellow(), what, detail);
    }

    fn error(&mut self, what: &str, detail: &str) {
        self.errors += 1;
        println!("  {} {}: {}", "✗".red(), what, detail);
    }
}

pub fn run(gateway_config: &Path, overrides: &Path, scorer_config: Option<&Path>) -> Result<()> {
    println!("{}", "Validating configuration...".cyan());
    let mut findings = Findings::default();

    if gateway_config.exists() {
        match load_gateway_config(gateway_config) {
            Ok(config) => findings.ok(
                "Gateway configuration",
                &format!(
                    "mode {}, default threshold {:.2}, {} band(s), {} context adjustment(s)",
                    config.gateway.effective_mode(),
                    config.gateway.confidence_threshold,
                    config.error_type_thresholds.len(),
                    config.context_adjustments.len()
                ),
            ),
            Err(e) => findings.error("Gateway configuration", &e.to_string()),
        }
    } else {
        findings.warn(
            "Gateway configuration",
            &format!(
                "{} not found, the built-in default will be created on first use",
                gateway_config.display()
            ),
        );
    }

    if overrides.exists() {
        match ReliabilityOverrideFile::read(overrides) {
            Ok(file) => {
                let summary = ReliabilityCatalog::new().apply_overrides(&file.reliability_overrides);
                if summary.rejected.is_empty() {
                    findings.ok(
                        "Reliability overrides",
                        &format!("{} coefficient(s)", summary.applied.len()),
                    );
                } else {
                    findings.error(
                        "Reliability overrides",
                        &format!(
                            "out-of-range coefficient(s) for {}",
                            summary.rejected.join(", ")
                        ),
                    );
                }
                if file.metadata.is_none() {
                    findings.warn("Reliability overrides", "no generation metadata");
                }
            }
            Err(e) => findings.error("Reliability overrides", &e.to_string()),
        }
    } else {
        findings.warn(
            "Reliability overrides",
            &format!("{} not found, built-in coefficients apply", overrides.display()),
        );
    }

    if let Some(path) = scorer_config {
        match ScorerConfig::load(path).and_then(EvidenceScorer::new) {
            Ok(scorer) => findings.ok(
                "Scorer configuration",
                &format!(
                    "{} guard(s), {} category profile(s)",
                    scorer.config().guards.len(),
                    scorer.config().categories.len()
                ),
            ),
            Err(e) => findings.error("Scorer configuration", &e.to_string()),
        }
    }

    println!();
    if findings.errors > 0 {
        bail!(
            "Validation failed with {} error(s) and {} warning(s)",
            findings.errors,
            findings.warnings
        );
    }
    if findings.warnings > 0 {
        println!(
            "{}",
            format!("Configuration is valid with {} warning(s).", findings.warnings)
                .yellow()
                .bold()
        );
    } else {
        println!("{}", "Configuration is valid.".green().bold());
    }
    Ok(())
}
