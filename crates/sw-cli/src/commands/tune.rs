//! Tune command - runs the reliability tuner over collected feedback.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sw_core::calibration::{CycleReport, ReliabilityTuner, TunerConfig};
use sw_core::feedback::discover_feedback_files;
use sw_core::reliability::ReliabilityCatalog;

use crate::config::AppConfig;
use crate::OutputFormat;

/// Arguments for `style-warden tune`.
#[derive(Debug, Args)]
pub struct TuneArgs {
    /// Directory containing feedback JSONL files
    #[arg(long, value_name = "DIR")]
    pub feedback_dir: Option<PathBuf>,

    /// Override file to write
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Only use feedback from the last N days, or "all"
    #[arg(long, value_name = "DAYS|all", value_parser = parse_lookback)]
    pub lookback_days: Option<Lookback>,

    /// Feedback entries a category needs before it is adjusted
    #[arg(long, value_name = "N")]
    pub min_feedback: Option<usize>,

    /// Largest coefficient change per run
    #[arg(long, value_name = "DELTA")]
    pub max_adjustment: Option<f64>,

    /// Lower bound for tuned coefficients
    #[arg(long, value_name = "VALUE")]
    pub min_reliability: Option<f64>,

    /// Upper bound for tuned coefficients
    #[arg(long, value_name = "VALUE")]
    pub max_reliability: Option<f64>,

    /// Compute and print adjustments without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Reload the written file as a live catalog would and report the result
    #[arg(long)]
    pub reload: bool,

    /// Rerun every N hours until interrupted
    #[arg(long, value_name = "HOURS")]
    pub interval_hours: Option<u64>,
}

/// Lookback window for feedback entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookback {
    Days(u32),
    All,
}

fn parse_lookback(value: &str) -> Result<Lookback, String> {
    if value.eq_ignore_ascii_case("all") {
        return Ok(Lookback::All);
    }
    match value.parse::<u32>() {
        Ok(0) => Err("lookback must be at least 1 day".to_string()),
        Ok(days) => Ok(Lookback::Days(days)),
        Err(_) => Err(format!("expected a number of days or \"all\", got {value}")),
    }
}

impl TuneArgs {
    /// Applies command-line overrides to the configured tuner parameters.
    fn tuner_config(&self, base: &TunerConfig) -> TunerConfig {
        let mut config = base.clone();
        if let Some(lookback) = self.lookback_days {
            config.lookback_days = match lookback {
                Lookback::Days(days) => Some(days),
                Lookback::All => None,
            };
        }
        if let Some(n) = self.min_feedback {
            config.min_feedback_threshold = n;
        }
        if let Some(delta) = self.max_adjustment {
            config.max_adjustment_per_run = delta;
        }
        if let Some(min) = self.min_reliability {
            config.min_reliability = min;
        }
        if let Some(max) = self.max_reliability {
            config.max_reliability = max;
        }
        config
    }
}

/// Runs one tuning cycle, or a cycle every `--interval-hours` until Ctrl+C.
pub async fn run(args: TuneArgs, app: &AppConfig, format: OutputFormat) -> Result<()> {
    let tuner = ReliabilityTuner::new(args.tuner_config(&app.tuner))
        .context("Invalid tuner parameters")?
        .with_dry_run(args.dry_run);
    let feedback_dir = args
        .feedback_dir
        .clone()
        .unwrap_or_else(|| app.feedback_dir.clone());
    let output = args.output.clone().unwrap_or_else(|| app.overrides.clone());

    let Some(hours) = args.interval_hours else {
        return run_once(&tuner, &feedback_dir, &output, args.reload, format);
    };
    let period = interval_period(hours)?;

    println!(
        "{} every {} hour(s), press Ctrl+C to stop",
        "Scheduled tuning".green().bold(),
        hours
    );
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let (tuner, feedback_dir, output) = (tuner.clone(), feedback_dir.clone(), output.clone());
                let reload = args.reload;
                let result = tokio::task::spawn_blocking(move || {
                    run_once(&tuner, &feedback_dir, &output, reload, format)
                })
                .await?;
                if let Err(e) = result {
                    eprintln!("{}: {:#}", "Tuning cycle failed".red(), e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\n{}", "Shutting down...".yellow());
                break;
            }
        }
    }
    Ok(())
}

/// Longest supported schedule, one year.
const MAX_INTERVAL_HOURS: u64 = 24 * 365;

fn interval_period(hours: u64) -> Result<Duration> {
    if hours == 0 {
        bail!("--interval-hours must be at least 1");
    }
    match hours.checked_mul(3600) {
        Some(secs) if hours <= MAX_INTERVAL_HOURS => Ok(Duration::from_secs(secs)),
        _ => bail!("--interval-hours {hours} exceeds the maximum of {MAX_INTERVAL_HOURS}"),
    }
}

fn run_once(
    tuner: &ReliabilityTuner,
    feedback_dir: &Path,
    output: &Path,
    reload: bool,
    format: OutputFormat,
) -> Result<()> {
    let files = discover_feedback_files(feedback_dir)
        .with_context(|| format!("Cannot list feedback in {}", feedback_dir.display()))?;
    let report = tuner
        .run_cycle(&files, output)
        .context("Tuning cycle failed")?;

    print_report(&report, tuner.config(), format)?;

    if reload && report.written {
        reload_overrides(output)?;
    }
    Ok(())
}

fn print_report(report: &CycleReport, config: &TunerConfig, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("{}", "Reliability Tuning".bold());
    println!("──────────────────");
    println!("  Feedback files:       {}", report.files_read);
    println!("  Entries loaded:       {}", report.entries_loaded);
    println!("  Records skipped:      {}", report.records_skipped);
    if report.entries_outside_lookback > 0 {
        println!("  Outside lookback:     {}", report.entries_outside_lookback);
    }
    println!("  Categories evaluated: {}", report.categories_evaluated);

    if !report.adjustments.is_empty() {
        println!();
        println!("{}", "Adjustments".bold());
        for m in &report.adjustments {
            let delta = format!("{:+.4}", m.adjustment);
            let delta = if !m.is_meaningful(config.change_epsilon) {
                delta.dimmed()
            } else if m.adjustment < 0.0 {
                delta.red()
            } else {
                delta.green()
            };
            println!(
                "  {:<22} {:.4} -> {:.4}  ({})  precision {:.2}  n={}",
                m.category.cyan(),
                m.current_reliability,
                m.proposed_reliability,
                delta,
                m.precision,
                m.total_feedback
            );
        }
    }

    if !report.categories_skipped.is_empty() {
        println!();
        println!(
            "{} (fewer than {} entries)",
            "Skipped".bold(),
            config.min_feedback_threshold
        );
        for (category, count) in &report.categories_skipped {
            println!("  {:<22} {}", category, count);
        }
    }

    println!();
    let changed = report.changed(config.change_epsilon).count();
    if report.dry_run {
        println!(
            "{}",
            format!("Dry run: {changed} adjustment(s) computed, nothing written").yellow()
        );
    } else if report.written {
        println!(
            "{}",
            format!(
                "{changed} adjustment(s) written to {}",
                report.output_path.display()
            )
            .green()
            .bold()
        );
    } else {
        println!("{}", "No adjustment needed".green());
    }
    Ok(())
}

fn reload_overrides(output: &Path) -> Result<()> {
    let catalog = ReliabilityCatalog::new();
    let summary = catalog.load_overrides(output);
    if !summary.loaded {
        bail!("Written override file {} could not be reloaded", output.display());
    }
    println!(
        "Reloaded {} override(s), {} rejected",
        summary.applied.len(),
        summary.rejected.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lookback() {
        assert_eq!(parse_lookback("all"), Ok(Lookback::All));
        assert_eq!(parse_lookback("ALL"), Ok(Lookback::All));
        assert_eq!(parse_lookback("30"), Ok(Lookback::Days(30)));
        assert!(parse_lookback("0").is_err());
        assert!(parse_lookback("month").is_err());
    }

    #[test]
    fn test_interval_period() {
        assert_eq!(interval_period(6).unwrap(), Duration::from_secs(6 * 3600));
        assert!(interval_period(0).is_err());
        assert!(interval_period(u64::MAX).is_err());
        assert!(interval_period(u64::MAX / 3600 + 1).is_err());
        assert!(interval_period(MAX_INTERVAL_HOURS).is_ok());
        assert!(interval_period(MAX_INTERVAL_HOURS + 1).is_err());
    }

    #[test]
    fn test_flags_override_configured_parameters() {
        let args = TuneArgs {
            feedback_dir: None,
            output: None,
            lookback_days: Some(Lookback::All),
            min_feedback: Some(5),
            max_adjustment: None,
            min_reliability: Some(0.6),
            max_reliability: None,
            dry_run: true,
            reload: false,
            interval_hours: None,
        };
        let base = TunerConfig {
            lookback_days: Some(30),
            ..TunerConfig::default()
        };

        let config = args.tuner_config(&base);
        assert_eq!(config.lookback_days, None);
        assert_eq!(config.min_feedback_threshold, 5);
        assert_eq!(config.min_reliability, 0.6);
        assert_eq!(config.max_adjustment_per_run, 0.02);
    }
}
