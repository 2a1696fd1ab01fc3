//! Term-level feedback memory.
//!
//! Users who mark a flag `incorrect` have accepted the flagged term as
//! legitimate usage; users who mark it `correct` confirm it should be flagged.
//! The snapshot counts both per category and term, and per content type when
//! the feedback carries one. It is immutable once built; callers swap in a
//! fresh snapshot after new feedback arrives.

use super::{EvidenceLayer, EvidenceSignal};
use crate::candidate::ContentType;
use crate::feedback::{FeedbackEntry, FeedbackType};
use crate::reliability::normalize_category;
use std::collections::HashMap;

/// Observations needed before a term's history produces a signal.
pub const MIN_TERM_OBSERVATIONS: u32 = 3;

/// Largest magnitude of a history signal.
const HISTORY_WEIGHT: f64 = 0.2;

/// Accept/flag counts for one term.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TermPattern {
    pub accepted: u32,
    pub flagged: u32,
}

impl TermPattern {
    pub fn observations(&self) -> u32 {
        self.accepted + self.flagged
    }

    /// `HISTORY_WEIGHT * (flag_rate - accept_rate)`, or `None` below the
    /// observation minimum.
    pub fn adjustment(&self) -> Option<f64> {
        let total = self.observations();
        if total < MIN_TERM_OBSERVATIONS {
            return None;
        }
        let total = f64::from(total);
        let flag_rate = f64::from(self.flagged) / total;
        let accept_rate = f64::from(self.accepted) / total;
        Some(HISTORY_WEIGHT * (flag_rate - accept_rate))
    }
}

#[derive(Debug, Clone, Default)]
struct CategoryPatterns {
    overall: HashMap<String, TermPattern>,
    by_content_type: HashMap<ContentType, HashMap<String, TermPattern>>,
}

/// Immutable view of historical accept/flag patterns.
#[derive(Debug, Clone, Default)]
pub struct FeedbackPatternSnapshot {
    categories: HashMap<String, CategoryPatterns>,
    entries_used: usize,
}

impl FeedbackPatternSnapshot {
    /// An empty snapshot.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a snapshot from feedback entries that carry flagged text.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a FeedbackEntry>) -> Self {
        let mut snapshot = Self::default();
        for entry in entries {
            let Some(text) = entry.flagged_text.as_deref() else {
                continue;
            };
            let term = text.trim().to_lowercase();
            if term.is_empty() {
                continue;
            }
            let accepted = match entry.feedback_type {
                FeedbackType::Incorrect => true,
                FeedbackType::Correct => false,
                FeedbackType::Unclear | FeedbackType::Other => continue,
            };
            let bump = |pattern: &mut TermPattern| {
                if accepted {
                    pattern.accepted += 1;
                } else {
                    pattern.flagged += 1;
                }
            };

            let patterns = snapshot
                .categories
                .entry(normalize_category(&entry.category))
                .or_default();
            bump(patterns.overall.entry(term.clone()).or_default());
            if let Some(content_type) = entry.content_type {
                bump(
                    patterns
                        .by_content_type
                        .entry(content_type)
                        .or_default()
                        .entry(term)
                        .or_default(),
                );
            }
            snapshot.entries_used += 1;
        }
        snapshot
    }

    /// Number of feedback entries that contributed.
    pub fn entries_used(&self) -> usize {
        self.entries_used
    }

    pub fn is_empty(&self) -> bool {
        self.entries_used == 0
    }

    /// Counts for a term, preferring content-type-specific history when it
    /// has enough observations.
    pub fn pattern(
        &self,
        category: &str,
        term: &str,
        content_type: ContentType,
    ) -> Option<TermPattern> {
        let patterns = self.categories.get(&normalize_category(category))?;
        let term = term.trim().to_lowercase();

        let specific = patterns
            .by_content_type
            .get(&content_type)
            .and_then(|terms| terms.get(&term))
            .filter(|p| p.observations() >= MIN_TERM_OBSERVATIONS);
        specific.or_else(|| patterns.overall.get(&term)).copied()
    }

    /// Feedback-layer signal for a term, if its history is conclusive.
    pub fn signal(
        &self,
        category: &str,
        term: &str,
        content_type: ContentType,
    ) -> Option<EvidenceSignal> {
        let delta = self.pattern(category, term, content_type)?.adjustment()?;
        if delta == 0.0 {
            return None;
        }
        let name = if delta < 0.0 {
            "term_previously_accepted"
        } else {
            "term_previously_flagged"
        };
        Some(EvidenceSignal::new(name, delta, EvidenceLayer::Feedback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: FeedbackType, text: &str, content_type: Option<ContentType>) -> FeedbackEntry {
        let mut e = FeedbackEntry::new("claims", kind, 0.7).with_flagged_text(text);
        e.content_type = content_type;
        e
    }

    #[test]
    fn test_accepted_term_reduces_evidence() {
        let entries = vec![
            entry(FeedbackType::Incorrect, "Best", None),
            entry(FeedbackType::Incorrect, "best", None),
            entry(FeedbackType::Incorrect, "best ", None),
            entry(FeedbackType::Correct, "best", None),
        ];
        let snapshot = FeedbackPatternSnapshot::from_entries(&entries);
        let signal = snapshot
            .signal("claims", "BEST", ContentType::General)
            .unwrap();
        assert_eq!(signal.name, "term_previously_accepted");
        assert!((signal.delta - (-0.1)).abs() < 1e-9);
        assert_eq!(signal.layer, EvidenceLayer::Feedback);
    }

    #[test]
    fn test_too_few_observations() {
        let entries = vec![
            entry(FeedbackType::Correct, "guaranteed", None),
            entry(FeedbackType::Correct, "guaranteed", None),
            entry(FeedbackType::Unclear, "guaranteed", None),
        ];
        let snapshot = FeedbackPatternSnapshot::from_entries(&entries);
        assert_eq!(snapshot.entries_used(), 2);
        assert!(snapshot
            .signal("claims", "guaranteed", ContentType::General)
            .is_none());
    }

    #[test]
    fn test_content_type_history_takes_precedence() {
        let mut entries = Vec::new();
        for _ in 0..3 {
            entries.push(entry(FeedbackType::Incorrect, "leading", Some(ContentType::Marketing)));
        }
        for _ in 0..5 {
            entries.push(entry(FeedbackType::Correct, "leading", Some(ContentType::Legal)));
        }
        let snapshot = FeedbackPatternSnapshot::from_entries(&entries);

        let marketing = snapshot
            .signal("claims", "leading", ContentType::Marketing)
            .unwrap();
        assert!((marketing.delta + 0.2).abs() < 1e-9);

        let legal = snapshot.signal("claims", "leading", ContentType::Legal).unwrap();
        assert!((legal.delta - 0.2).abs() < 1e-9);

        // no technical-specific history: falls back to category-wide 3 accepted, 5 flagged
        let technical = snapshot
            .signal("claims", "leading", ContentType::Technical)
            .unwrap();
        assert!((technical.delta - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_entries_without_text_ignored() {
        let entries = vec![FeedbackEntry::new("claims", FeedbackType::Correct, 0.9)];
        let snapshot = FeedbackPatternSnapshot::from_entries(&entries);
        assert!(snapshot.is_empty());
        assert!(snapshot.pattern("claims", "", ContentType::General).is_none());
    }
}
