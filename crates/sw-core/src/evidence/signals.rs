//! Linguistic, structural and semantic evidence signals.

use super::guards::is_quoted;
use super::{EvidenceLayer, EvidenceSignal};
use crate::candidate::{
    looks_like, AnnotatedToken, Audience, BlockType, Candidate, Context, ContentType, Domain,
    TokenKind,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Largest magnitude any single signal may contribute.
pub const MAX_SIGNAL_DELTA: f64 = 0.2;

fn bounded(delta: f64) -> f64 {
    delta.clamp(-MAX_SIGNAL_DELTA, MAX_SIGNAL_DELTA)
}

/// Word lists and weights for sentence-level signals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LinguisticConfig {
    pub hedging_words: Vec<String>,
    pub absolute_words: Vec<String>,
    pub hedging_delta: f64,
    pub absolute_delta: f64,
    pub quoted_delta: f64,
    pub numeric_delta: f64,
    pub proper_noun_delta: f64,
    pub prominent_role_delta: f64,
}

impl Default for LinguisticConfig {
    fn default() -> Self {
        let owned = |list: &[&str]| -> Vec<String> { list.iter().map(|w| w.to_string()).collect() };
        Self {
            hedging_words: owned(&[
                "may",
                "might",
                "could",
                "perhaps",
                "possibly",
                "generally",
                "typically",
                "usually",
                "often",
                "approximately",
                "likely",
                "arguably",
            ]),
            absolute_words: owned(&[
                "always",
                "never",
                "every",
                "all",
                "none",
                "guaranteed",
                "guarantee",
                "completely",
                "absolutely",
                "entirely",
                "certainly",
            ]),
            hedging_delta: -0.1,
            absolute_delta: 0.1,
            quoted_delta: -0.15,
            numeric_delta: 0.05,
            proper_noun_delta: -0.15,
            prominent_role_delta: 0.05,
        }
    }
}

/// Signals from the sentence around the flagged span and its tokens.
pub(crate) fn linguistic(
    config: &LinguisticConfig,
    candidate: &Candidate,
    tokens: &[&dyn AnnotatedToken],
) -> Vec<EvidenceSignal> {
    let mut signals = Vec::new();
    let sentence = candidate.sentence.as_deref().unwrap_or("");
    let flagged: Vec<String> = words(&candidate.flagged_text)
        .map(|w| w.to_lowercase())
        .collect();
    let context_words: Vec<String> = words(sentence)
        .map(|w| w.to_lowercase())
        .filter(|w| !flagged.contains(w))
        .collect();

    let has_any = |list: &[String]| {
        context_words
            .iter()
            .any(|w| list.iter().any(|l| l.eq_ignore_ascii_case(w)))
    };

    if has_any(&config.hedging_words) {
        signals.push(signal("hedging_language", config.hedging_delta));
    }
    if has_any(&config.absolute_words) {
        signals.push(signal("absolute_language", config.absolute_delta));
    }
    if is_quoted(sentence, &candidate.flagged_text) {
        signals.push(signal("quoted_text", config.quoted_delta));
    }
    if context_words
        .iter()
        .any(|w| looks_like(w, TokenKind::Number))
    {
        signals.push(signal("numeric_context", config.numeric_delta));
    }

    let proper_noun = tokens.iter().any(|t| {
        t.part_of_speech()
            .is_some_and(|p| p.eq_ignore_ascii_case("PROPN"))
            || t.entity_type().is_some_and(|e| !e.is_empty())
    });
    if proper_noun {
        signals.push(signal("proper_noun", config.proper_noun_delta));
    } else if tokens.iter().any(|t| {
        t.dependency_role().is_some_and(|r| {
            matches!(r.to_ascii_lowercase().as_str(), "nsubj" | "root" | "dobj")
        })
    }) {
        signals.push(signal("prominent_role", config.prominent_role_delta));
    }

    signals
}

fn signal(name: &str, delta: f64) -> EvidenceSignal {
    EvidenceSignal::new(name, bounded(delta), EvidenceLayer::Linguistic)
}

/// Splits text into word-like pieces, keeping `%` and inner punctuation
/// used by numbers.
fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphanumeric() || matches!(c, '%' | '.' | ',' | '\'')))
        .map(|w| w.trim_matches(|c: char| matches!(c, '.' | ',' | '\'')))
        .filter(|w| !w.is_empty())
}

/// Default deltas per enclosing block type.
pub(crate) fn default_structural() -> BTreeMap<BlockType, f64> {
    BTreeMap::from([
        (BlockType::Heading, -0.1),
        (BlockType::Title, -0.1),
        (BlockType::TableCell, -0.1),
        (BlockType::ListItem, -0.05),
        (BlockType::CodeBlock, -0.2),
        (BlockType::InlineCode, -0.2),
        (BlockType::Quote, -0.1),
        (BlockType::Procedure, 0.05),
        (BlockType::Admonition, 0.05),
    ])
}

/// Signal from the enclosing block.
pub(crate) fn structural(
    table: &BTreeMap<BlockType, f64>,
    context: &Context,
) -> Option<EvidenceSignal> {
    table
        .get(&context.block_type)
        .filter(|d| **d != 0.0)
        .map(|d| {
            EvidenceSignal::new(
                context.block_type.as_str(),
                bounded(*d),
                EvidenceLayer::Structural,
            )
        })
}

/// Deltas keyed by declared document metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SemanticConfig {
    pub content_type: BTreeMap<ContentType, f64>,
    pub domain: BTreeMap<Domain, f64>,
    pub audience: BTreeMap<Audience, f64>,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            content_type: BTreeMap::from([
                (ContentType::Legal, 0.1),
                (ContentType::Technical, 0.05),
                (ContentType::Procedural, 0.05),
                (ContentType::Formal, 0.05),
                (ContentType::Marketing, -0.05),
                (ContentType::Narrative, -0.05),
            ]),
            domain: BTreeMap::from([
                (Domain::Legal, 0.1),
                (Domain::Medical, 0.1),
                (Domain::Finance, 0.05),
            ]),
            audience: BTreeMap::from([(Audience::Beginner, 0.05), (Audience::Expert, -0.05)]),
        }
    }
}

/// Signals from content type, domain and audience, in that order.
pub(crate) fn semantic(config: &SemanticConfig, context: &Context) -> Vec<EvidenceSignal> {
    let entries = [
        config
            .content_type
            .get(&context.content_type)
            .map(|d| (format!("{}_content", context.content_type), *d)),
        config
            .domain
            .get(&context.domain)
            .map(|d| (format!("{}_domain", context.domain), *d)),
        config
            .audience
            .get(&context.audience)
            .map(|d| (format!("{}_audience", context.audience), *d)),
    ];

    entries
        .into_iter()
        .flatten()
        .filter(|(_, d)| *d != 0.0)
        .map(|(name, d)| EvidenceSignal::new(name, bounded(d), EvidenceLayer::Semantic))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{Span, TokenInfo};

    fn names(signals: &[EvidenceSignal]) -> Vec<&str> {
        signals.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_hedging_and_absolute_words() {
        let config = LinguisticConfig::default();
        let candidate = Candidate::new("claims", "best", Span::new(0, 4))
            .with_sentence("This may be the best option for all teams.");
        let signals = linguistic(&config, &candidate, &[]);
        assert_eq!(names(&signals), vec!["hedging_language", "absolute_language"]);
    }

    #[test]
    fn test_flagged_word_itself_is_not_context() {
        let config = LinguisticConfig::default();
        let candidate = Candidate::new("claims", "always", Span::new(9, 15))
            .with_sentence("It works always.");
        assert!(linguistic(&config, &candidate, &[]).is_empty());
    }

    #[test]
    fn test_numeric_and_quoted() {
        let config = LinguisticConfig::default();
        let candidate = Candidate::new("claims", "fastest", Span::new(0, 7))
            .with_sentence("Rated \"fastest\" by 45% of users.");
        let signals = linguistic(&config, &candidate, &[]);
        assert_eq!(names(&signals), vec!["quoted_text", "numeric_context"]);
    }

    #[test]
    fn test_token_roles() {
        let config = LinguisticConfig::default();
        let candidate = Candidate::new("terminology", "Widget", Span::new(0, 6));

        let propn = TokenInfo::new("Widget").with_part_of_speech("PROPN");
        let tokens: Vec<&dyn AnnotatedToken> = vec![&propn];
        assert_eq!(names(&linguistic(&config, &candidate, &tokens)), vec!["proper_noun"]);

        let subject = TokenInfo::new("widget").with_dependency_role("nsubj");
        let tokens: Vec<&dyn AnnotatedToken> = vec![&subject];
        assert_eq!(
            names(&linguistic(&config, &candidate, &tokens)),
            vec!["prominent_role"]
        );
    }

    #[test]
    fn test_structural_table() {
        let table = default_structural();
        let heading = Context::new().with_block_type(BlockType::Heading);
        let signal = structural(&table, &heading).unwrap();
        assert_eq!(signal.name, "heading");
        assert_eq!(signal.delta, -0.1);
        assert!(structural(&table, &Context::new()).is_none());
    }

    #[test]
    fn test_semantic_signals_bounded() {
        let mut config = SemanticConfig::default();
        config.domain.insert(Domain::Software, 0.9);
        let context = Context::new()
            .with_content_type(ContentType::Legal)
            .with_domain(Domain::Software)
            .with_audience(Audience::Expert);

        let signals = semantic(&config, &context);
        assert_eq!(
            names(&signals),
            vec!["legal_content", "software_domain", "expert_audience"]
        );
        assert!(signals.iter().all(|s| s.delta.abs() <= MAX_SIGNAL_DELTA));
        assert!(semantic(&config, &Context::new()).is_empty());
    }

    #[test]
    fn test_config_from_yaml_keys() {
        let yaml = "content_type:\n  marketing: -0.1\naudience:\n  novice: 0.02\n";
        let config: SemanticConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.content_type.get(&ContentType::Marketing), Some(&-0.1));
        assert_eq!(config.audience.get(&Audience::Beginner), Some(&0.02));
        assert_eq!(config.domain, SemanticConfig::default().domain);
    }
}
