//! Configuration loading for the Style Warden CLI.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use sw_core::calibration::TunerConfig;

/// Default paths and tuner parameters, overridable by command-line flags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Gateway configuration file.
    #[serde(default = "default_gateway_config")]
    pub gateway_config: PathBuf,

    /// Reliability override file written by the tuner.
    #[serde(default = "default_overrides")]
    pub overrides: PathBuf,

    /// Directory of `*.jsonl` feedback files.
    #[serde(default = "default_feedback_dir")]
    pub feedback_dir: PathBuf,

    /// Evidence scorer configuration; built-in defaults when absent.
    #[serde(default)]
    pub scorer_config: Option<PathBuf>,

    /// Tuner parameters.
    #[serde(default)]
    pub tuner: TunerConfig,
}

fn default_gateway_config() -> PathBuf {
    PathBuf::from("config/confidence_gateway.yaml")
}

fn default_overrides() -> PathBuf {
    PathBuf::from("config/reliability_overrides.yaml")
}

fn default_feedback_dir() -> PathBuf {
    PathBuf::from("feedback_data")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gateway_config: default_gateway_config(),
            overrides: default_overrides(),
            feedback_dir: default_feedback_dir(),
            scorer_config: None,
            tuner: TunerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}

/// `style-warden.yaml` in the user's config directory, or the working directory.
pub fn default_config_path() -> PathBuf {
    if let Some(dirs) = directories::ProjectDirs::from("com", "style-warden", "style-warden") {
        dirs.config_dir().join("style-warden.yaml")
    } else {
        PathBuf::from("style-warden.yaml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            "feedback_dir: /var/lib/style-warden/feedback\ntuner:\n  min_feedback_threshold: 25\n",
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.feedback_dir, PathBuf::from("/var/lib/style-warden/feedback"));
        assert_eq!(config.overrides, default_overrides());
        assert_eq!(config.tuner.min_feedback_threshold, 25);
        assert_eq!(config.tuner.max_adjustment_per_run, 0.02);
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(AppConfig::load(Path::new("/nonexistent/style-warden.yaml")).is_err());
    }
}
