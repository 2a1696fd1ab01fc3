//! Per-category performance metrics computed from feedback.

use crate::feedback::{FeedbackEntry, FeedbackType};
use crate::reliability::normalize_category;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Precision assumed when a category has no correct or incorrect feedback.
const NEUTRAL_PRECISION: f64 = 0.5;

/// Samples needed in each group before correlation is computed.
const MIN_CORRELATION_SAMPLES: usize = 2;

/// Aggregate feedback statistics for one rule category.
///
/// Computed fresh on every tuner run; only the proposed coefficient is
/// ever persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RulePerformanceMetrics {
    pub category: String,
    pub total_feedback: usize,
    pub correct_count: usize,
    pub incorrect_count: usize,
    pub unclear_count: usize,
    /// correct / (correct + incorrect).
    pub precision: f64,
    /// incorrect / total.
    pub false_positive_rate: f64,
    pub average_confidence: f64,
    /// Mean confidence of correct minus mean confidence of incorrect
    /// feedback, in [-1, 1]. A mean difference, not a Pearson coefficient.
    pub confidence_correlation: f64,
    /// Coefficient before this run.
    pub current_reliability: f64,
    /// Coefficient after this run.
    pub proposed_reliability: f64,
    /// `proposed_reliability - current_reliability`.
    pub adjustment: f64,
}

impl RulePerformanceMetrics {
    /// Computes statistics for one category's entries.
    pub fn from_entries(category: &str, entries: &[&FeedbackEntry]) -> Self {
        let total = entries.len();
        let mut correct = Vec::new();
        let mut incorrect = Vec::new();
        let mut unclear_count = 0;

        for entry in entries {
            match entry.feedback_type {
                FeedbackType::Correct => correct.push(entry.confidence_score),
                FeedbackType::Incorrect => incorrect.push(entry.confidence_score),
                FeedbackType::Unclear => unclear_count += 1,
                FeedbackType::Other => {}
            }
        }

        let judged = correct.len() + incorrect.len();
        let precision = if judged > 0 {
            correct.len() as f64 / judged as f64
        } else {
            NEUTRAL_PRECISION
        };
        let false_positive_rate = if total > 0 {
            incorrect.len() as f64 / total as f64
        } else {
            0.0
        };
        let average_confidence = mean(entries.iter().map(|e| e.confidence_score)).unwrap_or(0.0);

        let confidence_correlation = if correct.len() >= MIN_CORRELATION_SAMPLES
            && incorrect.len() >= MIN_CORRELATION_SAMPLES
        {
            match (mean(correct.iter().copied()), mean(incorrect.iter().copied())) {
                (Some(c), Some(i)) => (c - i).clamp(-1.0, 1.0),
                _ => 0.0,
            }
        } else {
            0.0
        };

        Self {
            category: category.to_string(),
            total_feedback: total,
            correct_count: correct.len(),
            incorrect_count: incorrect.len(),
            unclear_count,
            precision,
            false_positive_rate,
            average_confidence,
            confidence_correlation,
            current_reliability: 0.0,
            proposed_reliability: 0.0,
            adjustment: 0.0,
        }
    }

    /// True if the adjustment is larger than `epsilon`.
    pub fn is_meaningful(&self, epsilon: f64) -> bool {
        self.adjustment.abs() > epsilon
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Result of grouping a feedback batch.
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    /// Categories with enough feedback, keyed by normalized category.
    pub metrics: BTreeMap<String, RulePerformanceMetrics>,
    /// Categories below the threshold with their entry counts.
    pub insufficient: BTreeMap<String, usize>,
}

/// Groups entries by category and computes metrics for categories with at
/// least `min_feedback` entries. Smaller categories are reported in
/// [`MetricsSummary::insufficient`] and get no metrics.
pub fn compute_metrics(entries: &[FeedbackEntry], min_feedback: usize) -> MetricsSummary {
    let mut groups: BTreeMap<String, Vec<&FeedbackEntry>> = BTreeMap::new();
    for entry in entries {
        groups
            .entry(normalize_category(&entry.category))
            .or_default()
            .push(entry);
    }

    let mut summary = MetricsSummary::default();
    for (category, group) in groups {
        if group.len() < min_feedback {
            summary.insufficient.insert(category, group.len());
            continue;
        }
        let metrics = RulePerformanceMetrics::from_entries(&category, &group);
        summary.metrics.insert(category, metrics);
    }
    summary
}
