//! Evidence scoring for candidates.
//!
//! An evidence score is a bounded [0, 1] estimate that a candidate is a
//! genuine violation. Scoring runs guards first, then combines a base value
//! with linguistic, structural, semantic and feedback-history signals.

mod guards;
mod history;
mod scorer;
mod signals;

pub use guards::{default_guards, Guard, GuardCondition, GuardError, GuardInput, GuardSet};
pub use history::{FeedbackPatternSnapshot, TermPattern, MIN_TERM_OBSERVATIONS};
pub use scorer::{
    BaseEvidence, CategoryProfile, EvidenceScorer, ScoreRequest, ScorerConfig, ScorerError,
};
pub use signals::{LinguisticConfig, SemanticConfig, MAX_SIGNAL_DELTA};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Layer a signal was derived from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceLayer {
    Linguistic,
    Structural,
    Semantic,
    Feedback,
}

/// A named contribution to an evidence score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceSignal {
    pub name: String,
    pub delta: f64,
    pub layer: EvidenceLayer,
}

impl EvidenceSignal {
    pub fn new(name: impl Into<String>, delta: f64, layer: EvidenceLayer) -> Self {
        Self {
            name: name.into(),
            delta,
            layer,
        }
    }
}

/// Evidence score for exactly one candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceScore {
    pub candidate_id: Uuid,
    /// Final score in [0, 1].
    pub value: f64,
    /// Base evidence before adjustments.
    pub base: f64,
    /// Adjustments in the order they were applied.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signals: Vec<EvidenceSignal>,
    /// Name of the guard that forced the score to zero, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,
}

impl EvidenceScore {
    /// A score from a base and signals, clamped to [0, 1].
    pub fn new(candidate_id: Uuid, base: f64, signals: Vec<EvidenceSignal>) -> Self {
        let raw = signals.iter().fold(base, |acc, s| acc + s.delta);
        Self {
            candidate_id,
            value: clamp_unit(raw),
            base,
            signals,
            guard: None,
        }
    }

    /// A zero score produced by a guard.
    pub fn guarded(candidate_id: Uuid, guard: &str) -> Self {
        Self {
            candidate_id,
            value: 0.0,
            base: 0.0,
            signals: Vec::new(),
            guard: Some(guard.to_string()),
        }
    }

    /// A score supplied from outside the scorer, clamped to [0, 1].
    pub fn supplied(candidate_id: Uuid, value: f64) -> Self {
        let value = clamp_unit(value);
        Self {
            candidate_id,
            value,
            base: value,
            signals: Vec::new(),
            guard: None,
        }
    }

    pub fn is_guarded(&self) -> bool {
        self.guard.is_some()
    }

    /// Sum of deltas contributed by one layer.
    pub fn layer_total(&self, layer: EvidenceLayer) -> f64 {
        self.signals
            .iter()
            .filter(|s| s.layer == layer)
            .map(|s| s.delta)
            .sum()
    }

    /// One-line human-readable account of how the score was reached.
    pub fn explain(&self) -> String {
        if let Some(guard) = &self.guard {
            return format!("0.00 (guard: {guard})");
        }
        let mut out = format!("{:.2} = base {:.2}", self.value, self.base);
        for signal in &self.signals {
            out.push_str(&format!(" {:+.2} {}", signal.delta, signal.name));
        }
        out
    }
}

/// Clamps to [0, 1], mapping NaN to 0.
pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_is_clamped() {
        let id = Uuid::new_v4();
        let high = EvidenceScore::new(
            id,
            0.9,
            vec![
                EvidenceSignal::new("absolute_language", 0.1, EvidenceLayer::Linguistic),
                EvidenceSignal::new("legal_content", 0.1, EvidenceLayer::Semantic),
            ],
        );
        assert_eq!(high.value, 1.0);

        let low = EvidenceScore::new(
            id,
            0.1,
            vec![EvidenceSignal::new("heading", -0.2, EvidenceLayer::Structural)],
        );
        assert_eq!(low.value, 0.0);

        assert_eq!(EvidenceScore::supplied(id, f64::NAN).value, 0.0);
        assert_eq!(EvidenceScore::supplied(id, 1.7).value, 1.0);
    }

    #[test]
    fn test_layer_totals_and_explain() {
        let score = EvidenceScore::new(
            Uuid::new_v4(),
            0.6,
            vec![
                EvidenceSignal::new("hedging_language", -0.1, EvidenceLayer::Linguistic),
                EvidenceSignal::new("numeric_context", 0.05, EvidenceLayer::Linguistic),
                EvidenceSignal::new("table_cell", -0.1, EvidenceLayer::Structural),
            ],
        );
        assert!((score.layer_total(EvidenceLayer::Linguistic) + 0.05).abs() < 1e-9);
        assert_eq!(score.layer_total(EvidenceLayer::Feedback), 0.0);
        assert!((score.value - 0.45).abs() < 1e-9);
        assert_eq!(
            score.explain(),
            "0.45 = base 0.60 -0.10 hedging_language +0.05 numeric_context -0.10 table_cell"
        );

        let guarded = EvidenceScore::guarded(Uuid::new_v4(), "code_context");
        assert!(guarded.is_guarded());
        assert_eq!(guarded.explain(), "0.00 (guard: code_context)");
    }
}
