//! Reliability calibration from user feedback.
//!
//! The tuner is an offline batch job. It groups feedback by rule category,
//! computes precision and false-positive rate, proposes a bounded change to
//! each category's reliability coefficient, and writes the result to the
//! override file that the live catalog hot-reloads.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sw_core::calibration::{ReliabilityTuner, TunerConfig};
//! use sw_core::feedback::discover_feedback_files;
//!
//! let files = discover_feedback_files(Path::new("feedback"))?;
//! let tuner = ReliabilityTuner::new(TunerConfig::default())?;
//! let report = tuner.run_cycle(&files, Path::new("config/reliability_overrides.yaml"))?;
//! println!("{} categories adjusted", report.changed(0.001).count());
//! ```

mod lock;
mod metrics;
mod tuner;

pub use lock::TunerLock;
pub use metrics::{compute_metrics, MetricsSummary, RulePerformanceMetrics};
pub use tuner::{CycleReport, ReliabilityTuner, TunerConfig, TunerError, TunerResult};
