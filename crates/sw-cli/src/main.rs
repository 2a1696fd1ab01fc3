//! Style Warden CLI
//!
//! Command-line interface for confidence calibration: batch reliability
//! tuning, configuration checks, catalog inspection and offline filtering.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;

use commands::{FilterArgs, TuneArgs};
use config::{default_config_path, AppConfig};
use sw_observability::LoggingConfig;

#[derive(Parser)]
#[command(name = "style-warden")]
#[command(author = "Style Warden Team")]
#[command(version)]
#[command(about = "Evidence-based confidence scoring and feedback calibration", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid output format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Tune reliability coefficients from collected feedback
    Tune(TuneArgs),

    /// Validate the gateway configuration and override file
    Validate {
        /// Gateway configuration file
        #[arg(long, value_name = "FILE")]
        gateway_config: Option<PathBuf>,

        /// Reliability override file
        #[arg(long, value_name = "FILE")]
        overrides: Option<PathBuf>,

        /// Evidence scorer configuration file
        #[arg(long, value_name = "FILE")]
        scorer_config: Option<PathBuf>,
    },

    /// Show reliability coefficients
    Catalog {
        /// Show a single category
        category: Option<String>,

        /// Reliability override file
        #[arg(long, value_name = "FILE")]
        overrides: Option<PathBuf>,
    },

    /// Score and gate candidates read from a JSONL file
    Filter(FilterArgs),
}

/// Picks the logging preset: JSON output logs as JSON, `--verbose` adds
/// debug level with spans and source locations.
fn logging_config(verbose: bool, format: OutputFormat) -> LoggingConfig {
    let json = format == OutputFormat::Json;
    match (verbose, json) {
        (true, json) => LoggingConfig {
            json_format: json,
            ..LoggingConfig::development()
        },
        (false, true) => LoggingConfig::production(),
        (false, false) => LoggingConfig::default(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    sw_observability::init_logging_with_config(logging_config(cli.verbose, cli.format));

    // an explicit --config must load; the default location is optional
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::load(&default_config_path()).unwrap_or_else(|_| {
            if cli.verbose {
                eprintln!("Using default configuration (no config file found)");
            }
            AppConfig::default()
        }),
    };

    match cli.command {
        Commands::Tune(args) => commands::tune::run(args, &config, cli.format).await,
        Commands::Validate {
            gateway_config,
            overrides,
            scorer_config,
        } => commands::validate::run(
            &gateway_config.unwrap_or_else(|| config.gateway_config.clone()),
            &overrides.unwrap_or_else(|| config.overrides.clone()),
            scorer_config.or_else(|| config.scorer_config.clone()).as_deref(),
        ),
        Commands::Catalog {
            category,
            overrides,
        } => commands::catalog::run(
            category.as_deref(),
            &overrides.unwrap_or_else(|| config.overrides.clone()),
            cli.format,
        ),
        Commands::Filter(args) => commands::filter::run(args, &config, cli.format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_presets() {
        assert_eq!(logging_config(false, OutputFormat::Text).level, tracing::Level::INFO);
        assert!(!logging_config(false, OutputFormat::Text).json_format);

        let json = logging_config(false, OutputFormat::Json);
        assert!(json.json_format);
        assert!(!json.include_spans);

        let verbose = logging_config(true, OutputFormat::Json);
        assert_eq!(verbose.level, tracing::Level::DEBUG);
        assert!(verbose.include_spans);
        assert!(verbose.json_format);
    }
}
