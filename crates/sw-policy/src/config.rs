//! YAML configuration loader for the confidence gateway.
//!
//! This module handles loading and validating the gateway configuration
//! file, and creating a built-in default when the file is missing.
//!
//! ```yaml
//! gateway:
//!   enabled: true
//!   confidence_threshold: 0.4
//!   enable_detailed_logging: false
//! error_type_thresholds:
//!   high_reliability:
//!     threshold: 0.3
//!     types: [spelling, grammar]
//! context_adjustments:
//!   marketing_content:
//!     adjustment: 0.1
//!     reason: Promotional language is expected
//! cost_estimation:
//!   llm_call_cost_estimate: 0.002
//! ```

use crate::mode::GatewayMode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use sw_core::reliability::normalize_category;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Largest magnitude a context adjustment may have.
pub const MAX_CONTEXT_ADJUSTMENT: f64 = 0.5;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Top-level gateway configuration matching the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    #[serde(default)]
    pub gateway: GatewaySettings,
    /// Threshold bands, each listing the categories it applies to.
    #[serde(default)]
    pub error_type_thresholds: BTreeMap<String, ThresholdBand>,
    /// Signed threshold adjustments keyed by named context.
    #[serde(default)]
    pub context_adjustments: BTreeMap<String, ContextAdjustment>,
    #[serde(default)]
    pub cost_estimation: CostEstimation,
}

/// The `gateway:` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewaySettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Explicit mode; takes precedence over `enabled` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<GatewayMode>,
    /// Threshold for categories not listed in any band.
    #[serde(default = "default_threshold")]
    pub confidence_threshold: f64,
    /// Include every decision in each report.
    #[serde(default)]
    pub enable_detailed_logging: bool,
    /// Decisions kept in the rolling log.
    #[serde(default = "default_log_capacity")]
    pub decision_log_capacity: usize,
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> f64 {
    0.5
}

fn default_log_capacity() -> usize {
    1000
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: None,
            confidence_threshold: default_threshold(),
            enable_detailed_logging: false,
            decision_log_capacity: default_log_capacity(),
        }
    }
}

impl GatewaySettings {
    /// The mode this section selects.
    pub fn effective_mode(&self) -> GatewayMode {
        match self.mode {
            Some(mode) => mode,
            None if self.enabled => GatewayMode::Enabled,
            None => GatewayMode::Disabled,
        }
    }
}

/// One threshold band.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThresholdBand {
    pub threshold: f64,
    #[serde(default)]
    pub types: Vec<String>,
}

/// One named-context adjustment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextAdjustment {
    pub adjustment: f64,
    #[serde(default)]
    pub reason: String,
}

/// The `cost_estimation:` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostEstimation {
    /// Estimated cost of the downstream call a suppression avoids.
    #[serde(default = "default_call_cost")]
    pub llm_call_cost_estimate: f64,
}

fn default_call_cost() -> f64 {
    0.002
}

impl Default for CostEstimation {
    fn default() -> Self {
        Self {
            llm_call_cost_estimate: default_call_cost(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let band = |threshold: f64, types: &[&str]| ThresholdBand {
            threshold,
            types: types.iter().map(|t| t.to_string()).collect(),
        };
        let adjustment = |adjustment: f64, reason: &str| ContextAdjustment {
            adjustment,
            reason: reason.to_string(),
        };

        Self {
            gateway: GatewaySettings::default(),
            error_type_thresholds: BTreeMap::from([
                (
                    "high_reliability".to_string(),
                    band(0.3, &["spelling", "grammar", "punctuation", "capitalization"]),
                ),
                (
                    "medium_reliability".to_string(),
                    band(
                        0.4,
                        &["claims", "terminology", "commands", "abbreviations", "numbers"],
                    ),
                ),
                (
                    "low_reliability".to_string(),
                    band(
                        0.6,
                        &["ambiguity", "tone", "readability", "conversational_style"],
                    ),
                ),
            ]),
            context_adjustments: BTreeMap::from([
                (
                    "technical_documentation".to_string(),
                    adjustment(-0.05, "Technical readers rely on precise wording"),
                ),
                (
                    "marketing_content".to_string(),
                    adjustment(0.1, "Promotional language is expected"),
                ),
                (
                    "legal_content".to_string(),
                    adjustment(-0.1, "Legal text needs strict review"),
                ),
                (
                    "casual_content".to_string(),
                    adjustment(0.1, "Informal writing tolerates looser style"),
                ),
                (
                    "formal_documentation".to_string(),
                    adjustment(-0.05, "Formal documents follow the style guide closely"),
                ),
            ]),
            cost_estimation: CostEstimation::default(),
        }
    }
}

impl GatewayConfig {
    /// Parses and validates a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validates value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = |name: &str, v: f64| {
            if v.is_finite() && (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ConfigError::InvalidValue(format!("{name} {v} outside [0, 1]")))
            }
        };

        unit("gateway.confidence_threshold", self.gateway.confidence_threshold)?;
        if self.gateway.decision_log_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "gateway.decision_log_capacity must be at least 1".to_string(),
            ));
        }

        let mut owners: HashMap<String, &str> = HashMap::new();
        for (name, band) in &self.error_type_thresholds {
            unit(&format!("error_type_thresholds.{name}.threshold"), band.threshold)?;
            for category in &band.types {
                if let Some(other) = owners.insert(normalize_category(category), name) {
                    return Err(ConfigError::InvalidValue(format!(
                        "category '{category}' listed in both '{other}' and '{name}'"
                    )));
                }
            }
        }

        for (name, adj) in &self.context_adjustments {
            if !adj.adjustment.is_finite() || adj.adjustment.abs() > MAX_CONTEXT_ADJUSTMENT {
                return Err(ConfigError::InvalidValue(format!(
                    "context_adjustments.{name}.adjustment {} outside [-{MAX_CONTEXT_ADJUSTMENT}, {MAX_CONTEXT_ADJUSTMENT}]",
                    adj.adjustment
                )));
            }
        }

        let cost = self.cost_estimation.llm_call_cost_estimate;
        if !cost.is_finite() || cost < 0.0 {
            return Err(ConfigError::InvalidValue(format!(
                "cost_estimation.llm_call_cost_estimate {cost} must be non-negative"
            )));
        }
        Ok(())
    }
}

/// Loads and validates the gateway configuration from a YAML file.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_gateway_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    GatewayConfig::from_yaml_str(&content)
}

/// Writes the built-in default configuration if `path` does not exist.
///
/// Returns true if the file was created.
pub fn ensure_default_config(path: &Path) -> Result<bool, ConfigError> {
    if path.exists() {
        return Ok(false);
    }

    warn!(path = %path.display(), "Gateway configuration missing, creating built-in default");
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, GatewayConfig::default().to_yaml()?).map_err(io_err)?;
    info!(path = %path.display(), "Default gateway configuration written");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gateway.effective_mode(), GatewayMode::Enabled);

        let yaml = config.to_yaml().unwrap();
        assert_eq!(GatewayConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn test_parse_full_document() {
        let yaml = r#"
gateway:
  enabled: true
  confidence_threshold: 0.4
  enable_detailed_logging: true
error_type_thresholds:
  high:
    threshold: 0.3
    types: [spelling]
  low:
    threshold: 0.6
    types: [ambiguity]
context_adjustments:
  marketing_content:
    adjustment: 0.1
    reason: Promotional language is expected
cost_estimation:
  llm_call_cost_estimate: 0.01
"#;
        let config = GatewayConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.gateway.confidence_threshold, 0.4);
        assert!(config.gateway.enable_detailed_logging);
        assert_eq!(config.gateway.decision_log_capacity, 1000);
        assert_eq!(config.error_type_thresholds["low"].types, vec!["ambiguity"]);
        assert_eq!(config.context_adjustments["marketing_content"].adjustment, 0.1);
        assert_eq!(config.cost_estimation.llm_call_cost_estimate, 0.01);
    }

    #[test]
    fn test_mode_takes_precedence_over_enabled() {
        let config =
            GatewayConfig::from_yaml_str("gateway:\n  enabled: true\n  mode: logging_only\n").unwrap();
        assert_eq!(config.gateway.effective_mode(), GatewayMode::LoggingOnly);

        let config = GatewayConfig::from_yaml_str("gateway:\n  enabled: false\n").unwrap();
        assert_eq!(config.gateway.effective_mode(), GatewayMode::Disabled);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = GatewayConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.gateway, GatewaySettings::default());
        assert!(config.error_type_thresholds.is_empty());
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        for yaml in [
            "gateway:\n  confidence_threshold: 1.2\n",
            "error_type_thresholds:\n  x:\n    threshold: -0.1\n    types: [a]\n",
            "context_adjustments:\n  legal_content:\n    adjustment: 0.7\n",
            "gateway:\n  decision_log_capacity: 0\n",
            "cost_estimation:\n  llm_call_cost_estimate: -1\n",
        ] {
            assert!(
                matches!(GatewayConfig::from_yaml_str(yaml), Err(ConfigError::InvalidValue(_))),
                "{yaml}"
            );
        }
    }

    #[test]
    fn test_category_in_two_bands_rejected() {
        let yaml = "error_type_thresholds:\n  a:\n    threshold: 0.3\n    types: [tone]\n  b:\n    threshold: 0.6\n    types: [Tone]\n";
        assert!(matches!(
            GatewayConfig::from_yaml_str(yaml),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_malformed_yaml() {
        assert!(matches!(
            GatewayConfig::from_yaml_str("gateway: [unclosed"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_ensure_default_creates_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config").join("confidence_gateway.yaml");

        assert!(ensure_default_config(&path).unwrap());
        assert!(!ensure_default_config(&path).unwrap());
        assert_eq!(load_gateway_config(&path).unwrap(), GatewayConfig::default());
    }
}
