//! # sw-core
//!
//! Core data model and scoring engine for Style Warden.
//!
//! This crate provides the candidate and context models, the per-category
//! reliability catalog, the evidence scorer, feedback records, and the
//! offline reliability tuner that closes the feedback loop.

pub mod calibration;
pub mod candidate;
pub mod evidence;
pub mod feedback;
pub mod reliability;
pub mod watch;

pub use calibration::{
    compute_metrics, CycleReport, ReliabilityTuner, RulePerformanceMetrics, TunerConfig,
    TunerError,
};
pub use candidate::{
    AnnotatedToken, Audience, BlockType, Candidate, ContentType, Context, Domain, Severity, Span,
    TokenInfo, TokenKind,
};
pub use evidence::{
    BaseEvidence, EvidenceLayer, EvidenceScore, EvidenceScorer, EvidenceSignal,
    FeedbackPatternSnapshot, Guard, GuardCondition, ScoreRequest, ScorerConfig, ScorerError,
};
pub use feedback::{
    discover_feedback_files, load_feedback, FeedbackBatch, FeedbackEntry, FeedbackError,
    FeedbackLog, FeedbackType,
};
pub use reliability::{
    OverrideError, ReliabilityBand, ReliabilityCatalog, ReliabilityEntry, ReliabilityOverrideFile,
};
pub use watch::FileWatch;
