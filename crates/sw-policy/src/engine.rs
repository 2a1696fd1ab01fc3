//! Scoring and gating composed into one request-path entry point.

use crate::gateway::{ConfidenceGateway, GatewayOutcome, ScoredCandidate};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use sw_core::candidate::{AnnotatedToken, Candidate, Context, TokenInfo};
use sw_core::evidence::{EvidenceScore, EvidenceScorer, FeedbackPatternSnapshot, ScoreRequest};
use sw_core::feedback::{load_feedback, FeedbackEntry};
use sw_core::reliability::ReliabilityCatalog;
use tracing::info;

/// Catalog, scorer and gateway wired together.
///
/// The catalog coefficient for a candidate's category is its fallback base
/// evidence, so tuner output reaches scoring once the catalog reloads.
/// Feedback patterns are swapped in as a whole; scoring threads keep the
/// snapshot they started with.
#[derive(Debug)]
pub struct ConfidenceEngine {
    catalog: Arc<ReliabilityCatalog>,
    scorer: EvidenceScorer,
    gateway: ConfidenceGateway,
    patterns: RwLock<Arc<FeedbackPatternSnapshot>>,
}

impl ConfidenceEngine {
    pub fn new(
        catalog: Arc<ReliabilityCatalog>,
        scorer: EvidenceScorer,
        gateway: ConfidenceGateway,
    ) -> Self {
        Self {
            catalog,
            scorer,
            gateway,
            patterns: RwLock::new(Arc::new(FeedbackPatternSnapshot::empty())),
        }
    }

    pub fn catalog(&self) -> &Arc<ReliabilityCatalog> {
        &self.catalog
    }

    pub fn scorer(&self) -> &EvidenceScorer {
        &self.scorer
    }

    pub fn gateway(&self) -> &ConfidenceGateway {
        &self.gateway
    }

    pub fn patterns(&self) -> Arc<FeedbackPatternSnapshot> {
        Arc::clone(&self.patterns.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Rebuilds term-level feedback patterns from `entries`.
    ///
    /// Returns the number of entries that contributed.
    pub fn refresh_patterns(&self, entries: &[FeedbackEntry]) -> usize {
        let snapshot = Arc::new(FeedbackPatternSnapshot::from_entries(entries));
        let used = snapshot.entries_used();
        *self.patterns.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
        info!(entries = used, "Feedback patterns refreshed");
        used
    }

    /// Rebuilds feedback patterns from feedback files.
    pub fn refresh_patterns_from<P: AsRef<Path>>(&self, paths: &[P]) -> usize {
        let batch = load_feedback(paths);
        self.refresh_patterns(&batch.entries)
    }

    /// Scores one candidate with the engine's catalog and patterns.
    pub fn score(
        &self,
        candidate: &Candidate,
        context: &Context,
        tokens: &[&dyn AnnotatedToken],
    ) -> EvidenceScore {
        let patterns = self.patterns();
        let request = ScoreRequest::new(candidate, context)
            .with_history(&patterns)
            .with_tokens(tokens)
            .with_fallback_base(self.catalog.coefficient_for(&candidate.category));
        self.scorer.score(&request)
    }

    /// Scores and gates candidates that carry no token annotations.
    pub fn process(&self, candidates: Vec<Candidate>, context: &Context) -> GatewayOutcome {
        self.process_annotated(
            candidates.into_iter().map(|c| (c, Vec::new())).collect(),
            context,
        )
    }

    /// Scores and gates candidates, each with its annotated tokens.
    pub fn process_annotated(
        &self,
        candidates: Vec<(Candidate, Vec<TokenInfo>)>,
        context: &Context,
    ) -> GatewayOutcome {
        self.catalog.reload_if_changed();

        let scored = candidates
            .into_iter()
            .map(|(candidate, tokens)| {
                let tokens: Vec<&dyn AnnotatedToken> =
                    tokens.iter().map(|t| t as &dyn AnnotatedToken).collect();
                let evidence = self.score(&candidate, context, &tokens);
                ScoredCandidate::new(candidate, evidence)
            })
            .collect();

        self.gateway.filter(scored, context)
    }
}

impl Default for ConfidenceEngine {
    fn default() -> Self {
        Self::new(
            Arc::new(ReliabilityCatalog::new()),
            EvidenceScorer::with_defaults(),
            ConfidenceGateway::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use std::collections::HashMap;
    use sw_core::candidate::{BlockType, Span};
    use sw_core::feedback::FeedbackType;

    fn engine(threshold: f64) -> ConfidenceEngine {
        let mut config = GatewayConfig::default();
        config.error_type_thresholds.clear();
        config.context_adjustments.clear();
        config.gateway.confidence_threshold = threshold;

        let catalog = ReliabilityCatalog::with_table(HashMap::from([
            ("spelling".to_string(), 0.95),
            ("tone".to_string(), 0.55),
        ]));
        ConfidenceEngine::new(
            Arc::new(catalog),
            EvidenceScorer::with_defaults(),
            ConfidenceGateway::new(config),
        )
    }

    #[test]
    fn test_catalog_coefficient_is_fallback_base() {
        let engine = engine(0.5);
        let candidate = Candidate::new("spelling", "teh", Span::new(0, 3));
        let score = engine.score(&candidate, &Context::default(), &[]);
        assert_eq!(score.base, 0.95);
    }

    #[test]
    fn test_process_gates_by_evidence() {
        let engine = engine(0.6);
        let outcome = engine.process(
            vec![
                Candidate::new("spelling", "teh", Span::new(0, 3)),
                Candidate::new("tone", "awesome", Span::new(4, 11)),
            ],
            &Context::default(),
        );
        assert_eq!(outcome.report.total_candidates, 2);
        assert_eq!(outcome.passed.len(), 1);
        assert_eq!(outcome.passed[0].candidate.category, "spelling");
    }

    #[test]
    fn test_guarded_candidate_is_suppressed() {
        let engine = engine(0.3);
        let code = Context::default().with_block_type(BlockType::CodeBlock);
        let outcome = engine.process(
            vec![Candidate::new("spelling", "fn", Span::new(0, 2))],
            &code,
        );
        assert!(outcome.passed.is_empty());
        assert!(engine.gateway().decision_log()[0]
            .reasoning
            .contains("guarded by code_context"));
    }

    #[test]
    fn test_refresh_patterns_swaps_snapshot() {
        let engine = engine(0.5);
        let entries: Vec<_> = (0..4)
            .map(|_| {
                FeedbackEntry::new("spelling", FeedbackType::Incorrect, 0.8)
                    .with_flagged_text("kubectl")
            })
            .collect();

        let before = engine.patterns();
        assert_eq!(engine.refresh_patterns(&entries), 4);
        assert!(before.is_empty());

        let candidate = Candidate::new("spelling", "kubectl", Span::new(0, 7));
        let score = engine.score(&candidate, &Context::default(), &[]);
        assert!(score
            .signals
            .iter()
            .any(|s| s.name == "term_previously_accepted" && s.delta < 0.0));
    }
}
