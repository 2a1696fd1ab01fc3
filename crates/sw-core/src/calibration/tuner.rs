//! The reliability tuner: feedback in, bounded coefficient overrides out.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sw_observability::EngineMetrics;
use thiserror::Error;
use tracing::{info, warn};

use super::lock::TunerLock;
use super::metrics::{compute_metrics, RulePerformanceMetrics};
use crate::feedback::{load_feedback, FeedbackError};
use crate::reliability::{
    OverrideError, OverrideMetadata, ReliabilityCatalog, ReliabilityOverrideFile,
    MAX_COEFFICIENT, MIN_COEFFICIENT,
};

/// Result type for tuner operations.
pub type TunerResult<T> = Result<T, TunerError>;

/// Errors that abort a tuner run.
#[derive(Debug, Error)]
pub enum TunerError {
    /// No usable feedback entries were found.
    #[error("No feedback found ({files} file(s) searched)")]
    NoFeedback { files: usize },

    /// Another tuner run holds the lock for this override path.
    #[error("Another tuner run holds the lock {0}")]
    Locked(PathBuf),

    /// The lock file could not be opened.
    #[error("Cannot open lock file {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Tuner parameters are inconsistent.
    #[error("Invalid tuner configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Feedback(#[from] FeedbackError),

    #[error(transparent)]
    Override(#[from] OverrideError),
}

/// Tuner parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TunerConfig {
    /// Entries a category needs before it is adjusted.
    pub min_feedback_threshold: usize,
    /// Largest coefficient change per run.
    pub max_adjustment_per_run: f64,
    pub min_reliability: f64,
    pub max_reliability: f64,
    /// Weight of the confidence-correlation term.
    pub confidence_weight: f64,
    /// Changes at or below this magnitude are not worth writing.
    pub change_epsilon: f64,
    /// Only feedback newer than this many days is used; `None` uses all.
    pub lookback_days: Option<u32>,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            min_feedback_threshold: 10,
            max_adjustment_per_run: 0.02,
            min_reliability: 0.70,
            max_reliability: 0.98,
            confidence_weight: 0.3,
            change_epsilon: 0.001,
            lookback_days: None,
        }
    }
}

impl TunerConfig {
    pub fn validate(&self) -> TunerResult<()> {
        let in_catalog_range =
            |v: f64| (MIN_COEFFICIENT..=MAX_COEFFICIENT).contains(&v);
        if !in_catalog_range(self.min_reliability) || !in_catalog_range(self.max_reliability) {
            return Err(TunerError::InvalidConfig(format!(
                "reliability bounds must lie within [{MIN_COEFFICIENT}, {MAX_COEFFICIENT}]"
            )));
        }
        if self.min_reliability > self.max_reliability {
            return Err(TunerError::InvalidConfig(format!(
                "min_reliability {} exceeds max_reliability {}",
                self.min_reliability, self.max_reliability
            )));
        }
        if !(self.max_adjustment_per_run > 0.0 && self.max_adjustment_per_run <= 0.5) {
            return Err(TunerError::InvalidConfig(format!(
                "max_adjustment_per_run {} must be in (0, 0.5]",
                self.max_adjustment_per_run
            )));
        }
        if self.min_feedback_threshold == 0 {
            return Err(TunerError::InvalidConfig(
                "min_feedback_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parameters recorded in the override file metadata.
    fn metadata(&self) -> OverrideMetadata {
        let mut metadata = OverrideMetadata::now()
            .with_param("min_feedback_threshold", self.min_feedback_threshold as u64)
            .with_param("max_adjustment_per_run", self.max_adjustment_per_run)
            .with_param("min_reliability", self.min_reliability)
            .with_param("max_reliability", self.max_reliability)
            .with_param("confidence_weight", self.confidence_weight);
        if let Some(days) = self.lookback_days {
            metadata = metadata.with_param("lookback_days", u64::from(days));
        }
        metadata
    }
}

/// Outcome of one tuner cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub files_read: usize,
    pub entries_loaded: usize,
    pub records_skipped: usize,
    /// Entries dropped by the lookback window.
    pub entries_outside_lookback: usize,
    pub categories_evaluated: usize,
    /// Categories below the feedback threshold, with their entry counts.
    pub categories_skipped: BTreeMap<String, usize>,
    /// Metrics and proposals for every evaluated category.
    pub adjustments: Vec<RulePerformanceMetrics>,
    /// True if the override file was written.
    pub written: bool,
    pub dry_run: bool,
    pub output_path: PathBuf,
}

impl CycleReport {
    /// Evaluated categories whose change exceeds `epsilon`.
    pub fn changed(&self, epsilon: f64) -> impl Iterator<Item = &RulePerformanceMetrics> {
        self.adjustments
            .iter()
            .filter(move |m| m.is_meaningful(epsilon))
    }
}

/// Converts feedback batches into bounded reliability overrides.
#[derive(Debug, Clone)]
pub struct ReliabilityTuner {
    config: TunerConfig,
    dry_run: bool,
    metrics: EngineMetrics,
}

impl ReliabilityTuner {
    pub fn new(config: TunerConfig) -> TunerResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            dry_run: false,
            metrics: EngineMetrics::new(),
        })
    }

    /// Computes and reports without writing.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    /// Proposes a new coefficient for a category.
    ///
    /// Returns `(proposed, delta)` with `delta = proposed - current` and
    /// `|delta|` never above `max_adjustment_per_run`. The proposal lies in
    /// `[min_reliability, max_reliability]` whenever `current` does; a current
    /// value outside the bounds moves toward them one bounded step per run.
    pub fn propose_adjustment(&self, metrics: &RulePerformanceMetrics, current: f64) -> (f64, f64) {
        let cfg = &self.config;
        let step = cfg.max_adjustment_per_run;

        let precision_error = metrics.precision - current;
        let raw_delta = precision_error * 0.1 - metrics.false_positive_rate * 0.05
            + metrics.confidence_correlation * cfg.confidence_weight * 0.05;
        let delta = raw_delta.clamp(-step, step);

        let target = (current + delta).clamp(cfg.min_reliability, cfg.max_reliability);
        let actual = (target - current).clamp(-step, step);
        if actual == target - current {
            (target, actual)
        } else {
            (current + actual, actual)
        }
    }

    /// Fills in current, proposed and adjustment for each category.
    fn evaluate(
        &self,
        metrics: BTreeMap<String, RulePerformanceMetrics>,
        catalog: &ReliabilityCatalog,
    ) -> Vec<RulePerformanceMetrics> {
        metrics
            .into_values()
            .map(|mut m| {
                let current = catalog.coefficient_for(&m.category);
                let (proposed, delta) = self.propose_adjustment(&m, current);
                m.current_reliability = current;
                m.proposed_reliability = proposed;
                m.adjustment = delta;
                m
            })
            .collect()
    }

    /// Writes proposals to the override file under the tuner lock.
    ///
    /// The written map is the prior file's valid entries merged with every
    /// proposal. Nothing is written unless at least one proposal changes by
    /// more than the configured epsilon. Returns whether the file was written.
    pub fn apply_adjustments(
        &self,
        adjustments: &[RulePerformanceMetrics],
        output_path: &Path,
    ) -> TunerResult<bool> {
        let mut lock = TunerLock::for_override(output_path)?;
        let _guard = lock.acquire()?;
        self.write_overrides(adjustments, output_path)
    }

    fn write_overrides(
        &self,
        adjustments: &[RulePerformanceMetrics],
        output_path: &Path,
    ) -> TunerResult<bool> {
        if !adjustments
            .iter()
            .any(|m| m.is_meaningful(self.config.change_epsilon))
        {
            info!("No adjustment needed");
            return Ok(false);
        }

        let mut merged = match ReliabilityOverrideFile::read_or_default(output_path) {
            Ok(prior) => prior.reliability_overrides,
            Err(e) => {
                warn!(
                    path = %output_path.display(),
                    error = %e,
                    "Prior override file unreadable, replacing it"
                );
                BTreeMap::new()
            }
        };
        merged.retain(|category, value| {
            let valid = (MIN_COEFFICIENT..=MAX_COEFFICIENT).contains(value);
            if !valid {
                warn!(category = %category, value = *value, "Dropping out-of-range prior override");
            }
            valid
        });
        for m in adjustments {
            merged.insert(m.category.clone(), m.proposed_reliability);
        }

        ReliabilityOverrideFile::new(self.config.metadata(), merged).write_atomic(output_path)?;
        info!(path = %output_path.display(), "Reliability overrides written");
        Ok(true)
    }

    /// Runs load, compute, propose and apply over the given feedback files.
    pub fn run_cycle<P: AsRef<Path>>(
        &self,
        feedback_paths: &[P],
        output_path: &Path,
    ) -> TunerResult<CycleReport> {
        let _span =
            sw_observability::tuner_span!(output_path.display(), dry_run = self.dry_run).entered();
        let mut lock = TunerLock::for_override(output_path)?;
        let _guard = lock.acquire()?;

        let mut batch = load_feedback(feedback_paths);
        let entries_outside_lookback = match self.config.lookback_days {
            Some(days) => batch.retain_lookback(days, Utc::now()),
            None => 0,
        };
        self.metrics.record_feedback_skipped(batch.skipped.len());

        if batch.is_empty() {
            return Err(TunerError::NoFeedback {
                files: feedback_paths.len(),
            });
        }

        let summary = compute_metrics(&batch.entries, self.config.min_feedback_threshold);
        for (category, count) in &summary.insufficient {
            info!(
                category = %category,
                entries = count,
                threshold = self.config.min_feedback_threshold,
                "Insufficient feedback, category skipped"
            );
        }

        let catalog = ReliabilityCatalog::new();
        catalog.load_overrides(output_path);
        let adjustments = self.evaluate(summary.metrics, &catalog);

        for m in adjustments
            .iter()
            .filter(|m| m.is_meaningful(self.config.change_epsilon))
        {
            info!(
                category = %m.category,
                current = m.current_reliability,
                proposed = m.proposed_reliability,
                adjustment = m.adjustment,
                precision = m.precision,
                "Reliability adjustment proposed"
            );
        }

        let written = if self.dry_run {
            info!("Dry run, override file not written");
            false
        } else {
            self.write_overrides(&adjustments, output_path)?
        };

        let changed = adjustments
            .iter()
            .filter(|m| m.is_meaningful(self.config.change_epsilon))
            .count();
        self.metrics.record_tuner_cycle(adjustments.len(), changed);

        Ok(CycleReport {
            files_read: batch.files_read,
            entries_loaded: batch.entries.len(),
            records_skipped: batch.skipped.len(),
            entries_outside_lookback,
            categories_evaluated: adjustments.len(),
            categories_skipped: summary.insufficient,
            adjustments,
            written,
            dry_run: self.dry_run,
            output_path: output_path.to_path_buf(),
        })
    }
}
