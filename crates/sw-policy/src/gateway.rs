//! Confidence gateway.
//!
//! The gateway decides, per candidate, whether it reaches the user. The
//! decision compares the candidate's evidence score with a threshold
//! resolved from its category and document context; the operating mode
//! decides whether that decision is enforced.
//!
//! Configuration is re-read at the start of a `filter` call whenever the
//! backing file's modification time changes. A failed reload keeps the
//! previous configuration.

use crate::config::{ensure_default_config, load_gateway_config, GatewayConfig};
use crate::mode::{GatewayMode, ModeChange, ModeManager};
use crate::thresholds::{NamedContext, ResolvedThreshold, ThresholdTable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, TryLockError};
use std::time::Instant;
use sw_core::candidate::{Candidate, Context};
use sw_core::evidence::EvidenceScore;
use sw_core::reliability::normalize_category;
use sw_core::watch::FileWatch;
use sw_observability::EngineMetrics;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Evidence at or above this counts as high confidence in reports.
pub const HIGH_CONFIDENCE: f64 = 0.7;
/// Evidence below this counts as low confidence in reports.
pub const LOW_CONFIDENCE: f64 = 0.3;
/// Decisions returned by [`ConfidenceGateway::stats`].
pub const RECENT_DECISIONS: usize = 20;

/// A candidate paired with its evidence score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub evidence: EvidenceScore,
}

impl ScoredCandidate {
    pub fn new(candidate: Candidate, evidence: EvidenceScore) -> Self {
        Self {
            candidate,
            evidence,
        }
    }

    /// Pairs a candidate with an externally computed evidence value.
    pub fn with_evidence(candidate: Candidate, value: f64) -> Self {
        let evidence = EvidenceScore::supplied(candidate.id, value);
        Self::new(candidate, evidence)
    }
}

/// Outcome of the decision rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Pass,
    Suppress,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Pass => "pass",
            Decision::Suppress => "suppress",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Auditable record of one gating decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayDecision {
    pub candidate_id: Uuid,
    pub category: String,
    pub evidence_score: f64,
    /// Threshold the evidence was compared against.
    pub threshold: f64,
    /// Computed decision, independent of mode.
    pub decision: Decision,
    /// Whether the mode enforced the computed decision.
    pub enforced: bool,
    /// Whether the candidate was returned to the caller.
    pub passed: bool,
    pub mode: GatewayMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<NamedContext>,
    pub reasoning: String,
    pub latency_us: u64,
    pub timestamp: DateTime<Utc>,
}

/// Summary of one `filter` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayReport {
    pub total_candidates: usize,
    pub passed: usize,
    /// Candidates actually withheld.
    pub suppressed: usize,
    /// Candidates whose computed decision was suppress, enforced or not.
    pub would_suppress: usize,
    pub suppression_rate: f64,
    pub average_evidence: f64,
    pub high_confidence: usize,
    pub low_confidence: usize,
    pub mode: GatewayMode,
    pub processing_time_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decisions: Option<Vec<GatewayDecision>>,
}

impl GatewayReport {
    /// Zero-valued report.
    pub fn empty(mode: GatewayMode) -> Self {
        Self {
            total_candidates: 0,
            passed: 0,
            suppressed: 0,
            would_suppress: 0,
            suppression_rate: 0.0,
            average_evidence: 0.0,
            high_confidence: 0,
            low_confidence: 0,
            mode,
            processing_time_ms: 0.0,
            decisions: None,
        }
    }

    fn from_decisions(
        mode: GatewayMode,
        decisions: &[GatewayDecision],
        processing_time_ms: f64,
        detailed: bool,
    ) -> Self {
        let total = decisions.len();
        let passed = decisions.iter().filter(|d| d.passed).count();
        let evidence_sum: f64 = decisions.iter().map(|d| d.evidence_score).sum();

        Self {
            total_candidates: total,
            passed,
            suppressed: total - passed,
            would_suppress: decisions
                .iter()
                .filter(|d| d.decision == Decision::Suppress)
                .count(),
            suppression_rate: ratio(total - passed, total),
            average_evidence: if total == 0 {
                0.0
            } else {
                evidence_sum / total as f64
            },
            high_confidence: decisions
                .iter()
                .filter(|d| d.evidence_score >= HIGH_CONFIDENCE)
                .count(),
            low_confidence: decisions
                .iter()
                .filter(|d| d.evidence_score < LOW_CONFIDENCE)
                .count(),
            mode,
            processing_time_ms,
            decisions: detailed.then(|| decisions.to_vec()),
        }
    }
}

/// Candidates that passed plus the call's report.
#[derive(Debug, Clone)]
pub struct GatewayOutcome {
    pub passed: Vec<ScoredCandidate>,
    pub report: GatewayReport,
}

/// Per-category cumulative counts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryCounts {
    pub passed: u64,
    pub suppressed: u64,
    pub would_suppress: u64,
}

/// Cumulative gateway statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayStats {
    pub mode: GatewayMode,
    pub total_processed: u64,
    pub total_passed: u64,
    pub total_suppressed: u64,
    pub suppression_rate: f64,
    pub average_evidence: f64,
    /// Suppressed candidates times the configured per-call cost.
    pub estimated_savings: f64,
    pub by_category: BTreeMap<String, CategoryCounts>,
    pub recent_decisions: Vec<GatewayDecision>,
    pub config_reloads: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_path: Option<PathBuf>,
}

struct GatewayState {
    config: GatewayConfig,
    thresholds: ThresholdTable,
}

impl GatewayState {
    fn new(config: GatewayConfig) -> Self {
        let thresholds = ThresholdTable::from_config(&config);
        Self { config, thresholds }
    }
}

#[derive(Default)]
struct Counters {
    processed: u64,
    passed: u64,
    suppressed: u64,
    evidence_sum: f64,
    by_category: BTreeMap<String, CategoryCounts>,
    log: VecDeque<GatewayDecision>,
}

/// Threshold-based filter between candidate detection and the user.
///
/// Safe to share across threads; `filter` takes `&self`.
pub struct ConfidenceGateway {
    state: RwLock<Arc<GatewayState>>,
    watch: Mutex<Option<FileWatch>>,
    mode: ModeManager,
    counters: Mutex<Counters>,
    reloads: AtomicU64,
    metrics: EngineMetrics,
}

impl ConfidenceGateway {
    /// Creates a gateway from an in-memory configuration with no backing file.
    pub fn new(config: GatewayConfig) -> Self {
        let mode = config.gateway.effective_mode();
        Self {
            state: RwLock::new(Arc::new(GatewayState::new(config))),
            watch: Mutex::new(None),
            mode: ModeManager::new(mode),
            counters: Mutex::new(Counters::default()),
            reloads: AtomicU64::new(0),
            metrics: EngineMetrics::new(),
        }
    }

    /// Creates a gateway backed by a configuration file.
    ///
    /// A missing file is created from the built-in default. A file that
    /// cannot be loaded leaves the gateway on in-memory defaults until the
    /// file is fixed.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if let Err(e) = ensure_default_config(&path) {
            error!(path = %path.display(), error = %e, "Failed to write default gateway configuration");
        }

        let mut watch = FileWatch::new(&path);
        let observed = watch.current_modified();
        let config = match load_gateway_config(&path) {
            Ok(config) => {
                info!(path = %path.display(), "Gateway configuration loaded");
                config
            }
            Err(e) => {
                error!(
                    path = %path.display(),
                    error = %e,
                    "Failed to load gateway configuration, using defaults"
                );
                GatewayConfig::default()
            }
        };
        watch.mark_loaded(observed);

        let gateway = Self::new(config);
        *gateway.watch.lock().unwrap_or_else(PoisonError::into_inner) = Some(watch);
        gateway
    }

    pub fn mode(&self) -> GatewayMode {
        self.mode.mode()
    }

    /// Changes the operating mode at runtime.
    pub fn set_mode(&self, mode: GatewayMode, changed_by: &str, reason: Option<&str>) -> ModeChange {
        self.mode.set_mode(mode, changed_by, reason)
    }

    pub fn mode_history(&self) -> Vec<ModeChange> {
        self.mode.history()
    }

    /// Currently active configuration.
    pub fn config(&self) -> GatewayConfig {
        self.state().config.clone()
    }

    pub fn config_path(&self) -> Option<PathBuf> {
        self.watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|w| w.path().to_path_buf())
    }

    pub fn resolve_threshold(&self, category: &str, context: &Context) -> ResolvedThreshold {
        self.state().thresholds.resolve(category, context)
    }

    /// Reloads the configuration file if its modification time changed.
    ///
    /// Returns true if a new configuration was installed. Skips the check
    /// when another thread is already reloading.
    pub fn reload_if_changed(&self) -> bool {
        let mut guard = match self.watch.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return false,
        };
        let Some(watch) = guard.as_mut() else {
            return false;
        };
        let Some(observed) = watch.poll() else {
            return false;
        };
        watch.mark_loaded(observed);
        let path = watch.path().to_path_buf();
        drop(guard);

        if observed.is_none() {
            warn!(path = %path.display(), "Gateway configuration removed, keeping previous configuration");
            return false;
        }

        match load_gateway_config(&path) {
            Ok(config) => {
                self.install(config);
                self.reloads.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_config_reload("gateway", true);
                info!(path = %path.display(), "Gateway configuration reloaded");
                true
            }
            Err(e) => {
                self.metrics.record_config_reload("gateway", false);
                error!(
                    path = %path.display(),
                    error = %e,
                    "Failed to reload gateway configuration, keeping previous configuration"
                );
                false
            }
        }
    }

    fn install(&self, config: GatewayConfig) {
        let new_mode = config.gateway.effective_mode();
        let capacity = config.gateway.decision_log_capacity;
        let next = Arc::new(GatewayState::new(config));

        let previous = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *state, next)
        };

        if previous.config.gateway.effective_mode() != new_mode {
            self.mode
                .set_mode(new_mode, "config_reload", Some("configuration file changed"));
        }

        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        while counters.log.len() > capacity {
            counters.log.pop_front();
        }
    }

    fn state(&self) -> Arc<GatewayState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Gates a batch of scored candidates from one document context.
    pub fn filter(&self, candidates: Vec<ScoredCandidate>, context: &Context) -> GatewayOutcome {
        let started = Instant::now();
        let _span = sw_observability::gateway_span!(candidates.len()).entered();
        self.reload_if_changed();

        let state = self.state();
        let mode = self.mode.mode();
        if candidates.is_empty() {
            return GatewayOutcome {
                passed: Vec::new(),
                report: GatewayReport::empty(mode),
            };
        }

        let mut passed = Vec::with_capacity(candidates.len());
        let mut decisions = Vec::with_capacity(candidates.len());
        for scored in candidates {
            let decision = self.decide(&state.thresholds, mode, &scored, context);
            if decision.passed {
                passed.push(scored);
            } else {
                debug!(
                    candidate_id = %decision.candidate_id,
                    category = %decision.category,
                    evidence = decision.evidence_score,
                    threshold = decision.threshold,
                    "Candidate suppressed"
                );
            }
            decisions.push(decision);
        }

        let report = GatewayReport::from_decisions(
            mode,
            &decisions,
            started.elapsed().as_secs_f64() * 1000.0,
            state.config.gateway.enable_detailed_logging,
        );
        self.record(decisions, state.config.gateway.decision_log_capacity);
        report_log(&report);

        GatewayOutcome { passed, report }
    }

    fn decide(
        &self,
        thresholds: &ThresholdTable,
        mode: GatewayMode,
        scored: &ScoredCandidate,
        context: &Context,
    ) -> GatewayDecision {
        let started = Instant::now();
        let category = normalize_category(&scored.candidate.category);
        let evidence = unit(scored.evidence.value);
        let resolved = thresholds.resolve(&category, context);

        let decision = if evidence >= resolved.value {
            Decision::Pass
        } else {
            Decision::Suppress
        };
        let enforced = mode.enforces();
        let passed = !enforced || decision == Decision::Pass;

        let reasoning = reasoning(evidence, &resolved, decision, mode, scored.evidence.guard.as_deref());
        let latency = started.elapsed();

        self.metrics
            .record_gateway_decision(&category, decision.as_str(), enforced);
        self.metrics.record_decision_latency(latency.as_secs_f64());
        self.metrics.record_evidence(&category, evidence);

        GatewayDecision {
            candidate_id: scored.candidate.id,
            category,
            evidence_score: evidence,
            threshold: resolved.value,
            decision,
            enforced,
            passed,
            mode,
            context: resolved.context,
            reasoning,
            latency_us: u64::try_from(latency.as_micros()).unwrap_or(u64::MAX),
            timestamp: Utc::now(),
        }
    }

    fn record(&self, decisions: Vec<GatewayDecision>, capacity: usize) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        for decision in decisions {
            counters.processed += 1;
            counters.evidence_sum += decision.evidence_score;

            let counts = counters
                .by_category
                .entry(decision.category.clone())
                .or_default();
            if decision.decision == Decision::Suppress {
                counts.would_suppress += 1;
            }
            if decision.passed {
                counts.passed += 1;
                counters.passed += 1;
            } else {
                counts.suppressed += 1;
                counters.suppressed += 1;
            }

            counters.log.push_back(decision);
            while counters.log.len() > capacity {
                counters.log.pop_front();
            }
        }
    }

    /// Cumulative statistics since creation or the last reset.
    pub fn stats(&self) -> GatewayStats {
        let cost = self.state().config.cost_estimation.llm_call_cost_estimate;
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = counters.log.len().saturating_sub(RECENT_DECISIONS);

        GatewayStats {
            mode: self.mode.mode(),
            total_processed: counters.processed,
            total_passed: counters.passed,
            total_suppressed: counters.suppressed,
            suppression_rate: ratio(counters.suppressed as usize, counters.processed as usize),
            average_evidence: if counters.processed == 0 {
                0.0
            } else {
                counters.evidence_sum / counters.processed as f64
            },
            estimated_savings: counters.suppressed as f64 * cost,
            by_category: counters.by_category.clone(),
            recent_decisions: counters.log.iter().skip(skip).cloned().collect(),
            config_reloads: self.reloads.load(Ordering::Relaxed),
            config_path: self.config_path(),
        }
    }

    /// Every decision still held in the rolling log, oldest first.
    pub fn decision_log(&self) -> Vec<GatewayDecision> {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .log
            .iter()
            .cloned()
            .collect()
    }

    /// Clears counters and the decision log.
    pub fn reset_stats(&self) {
        *self.counters.lock().unwrap_or_else(PoisonError::into_inner) = Counters::default();
        info!("Gateway statistics reset");
    }
}

impl Default for ConfidenceGateway {
    fn default() -> Self {
        Self::new(GatewayConfig::default())
    }
}

impl std::fmt::Debug for ConfidenceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfidenceGateway")
            .field("mode", &self.mode.mode())
            .field("config_path", &self.config_path())
            .finish()
    }
}

fn reasoning(
    evidence: f64,
    threshold: &ResolvedThreshold,
    decision: Decision,
    mode: GatewayMode,
    guard: Option<&str>,
) -> String {
    let cmp = match decision {
        Decision::Pass => ">=",
        Decision::Suppress => "<",
    };
    let mut text = format!(
        "evidence {evidence:.2} {cmp} threshold {:.2} (base {:.2}",
        threshold.value, threshold.base
    );
    if let Some(context) = threshold.context {
        text.push_str(&format!(", {context} {:+.2}", threshold.adjustment));
    }
    text.push(')');

    if let Some(guard) = guard {
        text.push_str(&format!("; guarded by {guard}"));
    }
    match mode {
        GatewayMode::Disabled => text.push_str("; gateway disabled, passed as control"),
        GatewayMode::LoggingOnly if decision == Decision::Suppress => {
            text.push_str("; logging only, not enforced")
        }
        _ => {}
    }
    text
}

fn report_log(report: &GatewayReport) {
    debug!(
        mode = %report.mode,
        total = report.total_candidates,
        passed = report.passed,
        suppressed = report.suppressed,
        would_suppress = report.would_suppress,
        "Gateway batch processed"
    );
}

fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}
