//! Gateway operating modes for Style Warden.
//!
//! The gateway runs in one of three modes so filtering can be rolled out
//! safely: disabled as a control group, logging-only as a shadow run, and
//! enabled for enforcement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use tracing::{info, warn};

/// Operating mode of the confidence gateway.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum GatewayMode {
    /// Every candidate passes; decisions are not computed for enforcement.
    Disabled,

    /// Decisions are computed and enforced.
    #[default]
    Enabled,

    /// Decisions are computed and logged, but every candidate passes.
    LoggingOnly,
}

impl GatewayMode {
    /// True if computed decisions are enforced.
    pub fn enforces(&self) -> bool {
        matches!(self, GatewayMode::Enabled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayMode::Disabled => "disabled",
            GatewayMode::Enabled => "enabled",
            GatewayMode::LoggingOnly => "logging_only",
        }
    }

    /// Parses a mode name, accepting `-` in place of `_`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "disabled" => Some(GatewayMode::Disabled),
            "enabled" => Some(GatewayMode::Enabled),
            "logging_only" | "shadow" => Some(GatewayMode::LoggingOnly),
            _ => None,
        }
    }
}

impl std::fmt::Display for GatewayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of a mode change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModeChange {
    pub previous: GatewayMode,
    pub new: GatewayMode,
    /// Who initiated the change (`config_reload` for file reloads).
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Current gateway mode plus its change history.
#[derive(Debug)]
pub struct ModeManager {
    current: RwLock<GatewayMode>,
    history: RwLock<Vec<ModeChange>>,
}

impl Default for ModeManager {
    fn default() -> Self {
        Self::new(GatewayMode::default())
    }
}

impl ModeManager {
    pub fn new(mode: GatewayMode) -> Self {
        info!(mode = %mode, "Initializing gateway mode");
        Self {
            current: RwLock::new(mode),
            history: RwLock::new(Vec::new()),
        }
    }

    pub fn mode(&self) -> GatewayMode {
        *self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the mode, recording the change if it differs from the current one.
    pub fn set_mode(&self, mode: GatewayMode, changed_by: &str, reason: Option<&str>) -> ModeChange {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let previous = *current;

        let change = ModeChange {
            previous,
            new: mode,
            changed_by: changed_by.to_string(),
            changed_at: Utc::now(),
            reason: reason.map(String::from),
        };

        if previous != mode {
            info!(
                previous = %previous,
                new = %mode,
                changed_by = %changed_by,
                reason = ?reason,
                "Gateway mode changed"
            );
            *current = mode;
            self.history
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .push(change.clone());
        } else {
            warn!(mode = %mode, changed_by = %changed_by, "Gateway mode unchanged");
        }

        change
    }

    pub fn history(&self) -> Vec<ModeChange> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mode_is_enabled() {
        let manager = ModeManager::default();
        assert_eq!(manager.mode(), GatewayMode::Enabled);
        assert!(manager.mode().enforces());
        assert!(manager.history().is_empty());
    }

    #[test]
    fn test_mode_change_recorded() {
        let manager = ModeManager::new(GatewayMode::Disabled);
        let change = manager.set_mode(GatewayMode::LoggingOnly, "ops", Some("shadow rollout"));

        assert_eq!(change.previous, GatewayMode::Disabled);
        assert_eq!(change.new, GatewayMode::LoggingOnly);
        assert_eq!(manager.mode(), GatewayMode::LoggingOnly);
        assert!(!manager.mode().enforces());

        let history = manager.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].changed_by, "ops");
        assert_eq!(history[0].reason.as_deref(), Some("shadow rollout"));
    }

    #[test]
    fn test_same_mode_not_recorded() {
        let manager = ModeManager::new(GatewayMode::Enabled);
        let change = manager.set_mode(GatewayMode::Enabled, "ops", None);
        assert_eq!(change.previous, change.new);
        assert!(manager.history().is_empty());
    }

    #[test]
    fn test_parse_and_serde() {
        assert_eq!(GatewayMode::parse("logging-only"), Some(GatewayMode::LoggingOnly));
        assert_eq!(GatewayMode::parse(" Disabled "), Some(GatewayMode::Disabled));
        assert_eq!(GatewayMode::parse("on"), None);

        let json = serde_json::to_string(&GatewayMode::LoggingOnly).unwrap();
        assert_eq!(json, "\"logging_only\"");
        let parsed: GatewayMode = serde_yaml::from_str("disabled").unwrap();
        assert_eq!(parsed, GatewayMode::Disabled);
    }
}
