//! The evidence scorer.

use super::guards::{default_guards, Guard, GuardError, GuardInput, GuardSet};
use super::history::FeedbackPatternSnapshot;
use super::signals::{self, LinguisticConfig, SemanticConfig};
use super::{clamp_unit, EvidenceScore};
use crate::candidate::{AnnotatedToken, BlockType, Candidate, Context};
use crate::reliability::normalize_category;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, instrument};

/// Base evidence used when nothing more specific applies.
pub const DEFAULT_BASE_EVIDENCE: f64 = 0.5;

/// Candidate attribute that overrides base evidence.
pub const BASE_EVIDENCE_ATTRIBUTE: &str = "base_evidence";

/// Errors building a scorer from configuration.
#[derive(Error, Debug)]
pub enum ScorerError {
    #[error("Failed to read scorer config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse scorer config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error("Invalid scorer config: {0}")]
    Invalid(String),
}

/// How a category derives its starting evidence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum BaseEvidence {
    /// A constant starting value.
    Fixed(f64),
    /// Longer, more specific matches start higher:
    /// `min(floor + per_char * chars, cap)`.
    Specificity { floor: f64, per_char: f64, cap: f64 },
}

impl BaseEvidence {
    pub fn evaluate(&self, flagged_text: &str) -> f64 {
        match *self {
            BaseEvidence::Fixed(value) => value,
            BaseEvidence::Specificity {
                floor,
                per_char,
                cap,
            } => {
                let chars = flagged_text.trim().chars().count() as f64;
                (floor + per_char * chars).min(cap)
            }
        }
    }
}

/// Per-category scoring profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryProfile {
    pub base_evidence: BaseEvidence,
}

/// Scorer configuration, loadable from YAML.
///
/// ```yaml
/// default_base_evidence: 0.5
/// categories:
///   claims:
///     base_evidence: { fixed: 0.7 }
///   terminology:
///     base_evidence: { specificity: { floor: 0.4, per_char: 0.02, cap: 0.8 } }
/// guards:
///   - name: code_context
///     condition: { block_type_in: [code_block, inline_code] }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScorerConfig {
    pub default_base_evidence: f64,
    pub categories: BTreeMap<String, CategoryProfile>,
    pub guards: Vec<Guard>,
    pub linguistic: LinguisticConfig,
    pub structural: BTreeMap<BlockType, f64>,
    pub semantic: SemanticConfig,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            default_base_evidence: DEFAULT_BASE_EVIDENCE,
            categories: BTreeMap::new(),
            guards: default_guards(),
            linguistic: LinguisticConfig::default(),
            structural: signals::default_structural(),
            semantic: SemanticConfig::default(),
        }
    }
}

impl ScorerConfig {
    /// Parses a YAML document; missing sections take built-in defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ScorerError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, ScorerError> {
        let content = std::fs::read_to_string(path).map_err(|source| ScorerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn with_profile(mut self, category: &str, base_evidence: BaseEvidence) -> Self {
        self.categories
            .insert(category.to_string(), CategoryProfile { base_evidence });
        self
    }

    pub fn validate(&self) -> Result<(), ScorerError> {
        if !(0.0..=1.0).contains(&self.default_base_evidence) {
            return Err(ScorerError::Invalid(format!(
                "default_base_evidence {} outside [0, 1]",
                self.default_base_evidence
            )));
        }
        for (category, profile) in &self.categories {
            if let BaseEvidence::Fixed(v) = profile.base_evidence {
                if !(0.0..=1.0).contains(&v) {
                    return Err(ScorerError::Invalid(format!(
                        "base evidence {v} for '{category}' outside [0, 1]"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Everything a single scoring call needs.
///
/// `tokens` are the annotated tokens covering the flagged span, if the
/// caller has a parse. `fallback_base` is used when neither the candidate
/// nor the category profile supplies base evidence; the composed engine
/// passes the category's reliability coefficient here.
#[derive(Clone, Copy)]
pub struct ScoreRequest<'a> {
    pub candidate: &'a Candidate,
    pub context: &'a Context,
    pub history: Option<&'a FeedbackPatternSnapshot>,
    pub tokens: &'a [&'a dyn AnnotatedToken],
    pub fallback_base: Option<f64>,
}

impl<'a> ScoreRequest<'a> {
    pub fn new(candidate: &'a Candidate, context: &'a Context) -> Self {
        Self {
            candidate,
            context,
            history: None,
            tokens: &[],
            fallback_base: None,
        }
    }

    pub fn with_history(mut self, history: &'a FeedbackPatternSnapshot) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_tokens(mut self, tokens: &'a [&'a dyn AnnotatedToken]) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_fallback_base(mut self, base: f64) -> Self {
        self.fallback_base = Some(base);
        self
    }
}

/// Computes bounded evidence scores.
///
/// Scoring is a pure function of the request: no shared state is read or
/// written, so one scorer can be shared across threads.
#[derive(Debug)]
pub struct EvidenceScorer {
    config: ScorerConfig,
    guards: GuardSet,
}

impl EvidenceScorer {
    /// Builds a scorer, compiling the configured guards.
    pub fn new(config: ScorerConfig) -> Result<Self, ScorerError> {
        config.validate()?;
        let guards = GuardSet::compile(&config.guards)?;
        Ok(Self { config, guards })
    }

    /// A scorer with the built-in configuration.
    pub fn with_defaults() -> Self {
        let config = ScorerConfig::default();
        // built-in guards contain no patterns, so compilation cannot fail
        let guards = GuardSet::compile(&config.guards).unwrap_or_else(|_| GuardSet::empty());
        Self { config, guards }
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Scores one candidate.
    pub fn score(&self, request: &ScoreRequest<'_>) -> EvidenceScore {
        let candidate = request.candidate;

        let guard_input = GuardInput {
            candidate,
            context: request.context,
            tokens: request.tokens,
        };
        if let Some(guard) = self.guards.first_match(&guard_input) {
            debug!(
                candidate_id = %candidate.id,
                category = %candidate.category,
                guard = %guard,
                "Guard forced zero evidence"
            );
            return EvidenceScore::guarded(candidate.id, guard);
        }

        let base = self.base_evidence(candidate, request.fallback_base);

        let mut signals =
            signals::linguistic(&self.config.linguistic, candidate, request.tokens);
        signals.extend(signals::structural(&self.config.structural, request.context));
        signals.extend(signals::semantic(&self.config.semantic, request.context));
        if let Some(history) = request.history {
            signals.extend(history.signal(
                &candidate.category,
                &candidate.flagged_text,
                request.context.content_type,
            ));
        }

        EvidenceScore::new(candidate.id, base, signals)
    }

    /// Attribute, then category profile, then caller fallback, then default.
    fn base_evidence(&self, candidate: &Candidate, fallback: Option<f64>) -> f64 {
        let profile = || {
            self.config
                .categories
                .get(&normalize_category(&candidate.category))
                .or_else(|| self.config.categories.get(&candidate.category))
                .map(|p| p.base_evidence.evaluate(&candidate.flagged_text))
        };

        let base = candidate
            .attribute_f64(BASE_EVIDENCE_ATTRIBUTE)
            .filter(|v| v.is_finite())
            .or_else(profile)
            .or(fallback)
            .unwrap_or(self.config.default_base_evidence);
        clamp_unit(base)
    }
}

impl Default for EvidenceScorer {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{Audience, ContentType, Domain, Span, TokenInfo};
    use crate::evidence::EvidenceLayer;
    use crate::feedback::{FeedbackEntry, FeedbackType};

    fn claims(text: &str) -> Candidate {
        Candidate::new("claims", text, Span::new(0, text.len()))
    }

    #[test]
    fn test_base_evidence_resolution_order() {
        let scorer = EvidenceScorer::new(
            ScorerConfig::default().with_profile("claims", BaseEvidence::Fixed(0.7)),
        )
        .unwrap();
        let context = Context::new();

        let with_attr = claims("best").with_attribute("base_evidence", serde_json::json!(0.9));
        assert_eq!(scorer.score(&ScoreRequest::new(&with_attr, &context)).base, 0.9);

        let plain = claims("best");
        let request = ScoreRequest::new(&plain, &context).with_fallback_base(0.85);
        assert_eq!(scorer.score(&request).base, 0.7);

        let other = Candidate::new("tone", "awesome", Span::new(0, 7));
        let request = ScoreRequest::new(&other, &context).with_fallback_base(0.85);
        assert_eq!(scorer.score(&request).base, 0.85);
        assert_eq!(scorer.score(&ScoreRequest::new(&other, &context)).base, 0.5);
    }

    #[test]
    fn test_specificity_base() {
        let base = BaseEvidence::Specificity {
            floor: 0.4,
            per_char: 0.02,
            cap: 0.8,
        };
        assert!((base.evaluate("utilize") - 0.54).abs() < 1e-9);
        assert_eq!(base.evaluate("a considerably longer flagged phrase here"), 0.8);
    }

    #[test]
    fn test_guard_short_circuits() {
        let scorer = EvidenceScorer::default();
        let candidate = claims("best").with_attribute("base_evidence", serde_json::json!(1.0));
        let context = Context::new()
            .with_block_type(BlockType::CodeBlock)
            .with_content_type(ContentType::Legal);

        let score = scorer.score(&ScoreRequest::new(&candidate, &context));
        assert_eq!(score.value, 0.0);
        assert_eq!(score.guard.as_deref(), Some("code_context"));
        assert!(score.signals.is_empty());
    }

    #[test]
    fn test_all_layers_contribute() {
        let scorer = EvidenceScorer::default();
        let entries: Vec<FeedbackEntry> = (0..4)
            .map(|_| {
                FeedbackEntry::new("claims", FeedbackType::Correct, 0.8)
                    .with_flagged_text("guaranteed")
            })
            .collect();
        let history = FeedbackPatternSnapshot::from_entries(&entries);

        let candidate = claims("guaranteed").with_sentence("Results are guaranteed for all users.");
        let context = Context::new()
            .with_block_type(BlockType::ListItem)
            .with_content_type(ContentType::Legal)
            .with_domain(Domain::Finance)
            .with_audience(Audience::Beginner);
        let request = ScoreRequest::new(&candidate, &context)
            .with_history(&history)
            .with_fallback_base(0.6);
        let score = scorer.score(&request);

        for layer in [
            EvidenceLayer::Linguistic,
            EvidenceLayer::Structural,
            EvidenceLayer::Semantic,
            EvidenceLayer::Feedback,
        ] {
            assert!(score.signals.iter().any(|s| s.layer == layer), "{layer:?}");
        }
        // 0.6 + 0.1 - 0.05 + 0.1 + 0.05 + 0.05 + 0.2
        assert_eq!(score.value, 1.0);
    }

    #[test]
    fn test_scores_always_in_unit_interval() {
        let scorer = EvidenceScorer::default();
        let sentences = [
            "It may possibly be the best, perhaps.",
            "Always and never, every single time, 100% guaranteed.",
            "",
        ];
        let blocks = [
            BlockType::Paragraph,
            BlockType::Heading,
            BlockType::TableCell,
            BlockType::Procedure,
        ];
        let propn = TokenInfo::new("Best").with_part_of_speech("PROPN");
        let tokens: Vec<&dyn AnnotatedToken> = vec![&propn];

        for base in [-1.0, 0.0, 0.3, 0.97, 1.0, 4.0] {
            for sentence in sentences {
                for block in blocks {
                    let candidate = claims("best")
                        .with_sentence(sentence)
                        .with_attribute("base_evidence", serde_json::json!(base));
                    let context = Context::new()
                        .with_block_type(block)
                        .with_content_type(ContentType::Legal);
                    let request = ScoreRequest::new(&candidate, &context).with_tokens(&tokens);
                    let value = scorer.score(&request).value;
                    assert!((0.0..=1.0).contains(&value), "{base} {sentence} {block}: {value}");
                }
            }
        }
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let scorer = EvidenceScorer::default();
        let history = FeedbackPatternSnapshot::empty();
        let candidate = claims("fastest").with_sentence("Typically the fastest of 3 options.");
        let context = Context::from_strs("table_cell", "marketing", "software", "expert");
        let request = ScoreRequest::new(&candidate, &context)
            .with_history(&history)
            .with_fallback_base(0.85);

        let first = scorer.score(&request);
        for _ in 0..100 {
            assert_eq!(scorer.score(&request), first);
        }

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| assert_eq!(scorer.score(&request), first));
            }
        });
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
default_base_evidence: 0.55
categories:
  claims:
    base_evidence: { fixed: 0.7 }
  terminology:
    base_evidence: { specificity: { floor: 0.4, per_char: 0.02, cap: 0.8 } }
guards:
  - name: code_context
    condition: { block_type_in: [code_block] }
"#;
        let config = ScorerConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.default_base_evidence, 0.55);
        assert_eq!(config.guards.len(), 1);
        assert_eq!(config.linguistic, LinguisticConfig::default());

        let scorer = EvidenceScorer::new(config).unwrap();
        let candidate = Candidate::new("terminology", "utilize", Span::new(0, 7));
        let score = scorer.score(&ScoreRequest::new(&candidate, &Context::new()));
        assert!((score.base - 0.54).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            ScorerConfig::from_yaml_str("default_base_evidence: 1.5"),
            Err(ScorerError::Invalid(_))
        ));
        let bad_guard = "guards:\n  - name: broken\n    condition: { text_matches: \"([a-z\" }\n";
        let config = ScorerConfig::from_yaml_str(bad_guard).unwrap();
        assert!(matches!(
            EvidenceScorer::new(config),
            Err(ScorerError::Guard(_))
        ));
    }
}
