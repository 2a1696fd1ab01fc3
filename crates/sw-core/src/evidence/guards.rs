//! Zero-evidence guards.
//!
//! A guard recognises a context in which a candidate is unambiguously not a
//! violation (code, quoted material, technical identifiers). The first guard
//! that matches forces the evidence score to zero. Guards are data, not code:
//! they deserialize from the scorer configuration and are compiled once.

use crate::candidate::{AnnotatedToken, BlockType, Candidate, Context, TokenKind};
use crate::reliability::normalize_category;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors building a guard set.
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Guard '{guard}' has an invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        guard: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Guard has an empty name")]
    EmptyName,
}

/// Conditions a guard can test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum GuardCondition {
    /// Enclosing block is one of the given types.
    BlockTypeIn(Vec<BlockType>),
    /// Flagged text sits inside a direct quotation.
    InsideQuotation,
    /// Flagged text is a URL, email address, path or code identifier.
    TechnicalIdentifier,
    /// Flagged text matches the regex.
    TextMatches(String),
    /// Surrounding sentence matches the regex.
    SentenceMatches(String),
    /// Detector attribute equals the value.
    AttributeEquals {
        key: String,
        value: serde_json::Value,
    },
    /// Any flagged token has one of the named-entity labels.
    EntityTypeIn(Vec<String>),
    /// All sub-conditions must match.
    And(Vec<GuardCondition>),
    /// Any sub-condition must match.
    Or(Vec<GuardCondition>),
    /// Sub-condition must NOT match.
    Not(Box<GuardCondition>),
}

/// A named guard, optionally scoped to specific categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Guard {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Categories this guard applies to; empty means all.
    #[serde(default)]
    pub categories: Vec<String>,
    pub condition: GuardCondition,
}

impl Guard {
    pub fn new(name: &str, condition: GuardCondition) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            categories: Vec::new(),
            condition,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn for_categories(mut self, categories: &[&str]) -> Self {
        self.categories = categories.iter().map(|c| c.to_string()).collect();
        self
    }
}

/// Guards applied when no configuration overrides them.
pub fn default_guards() -> Vec<Guard> {
    vec![
        Guard::new(
            "code_context",
            GuardCondition::BlockTypeIn(vec![BlockType::CodeBlock, BlockType::InlineCode]),
        )
        .with_description("Code is not prose"),
        Guard::new("direct_quotation", GuardCondition::InsideQuotation)
            .with_description("Quoted material is reproduced verbatim"),
        Guard::new("technical_identifier", GuardCondition::TechnicalIdentifier)
            .with_description("URLs, paths and identifiers are not words"),
        Guard::new(
            "named_entity",
            GuardCondition::EntityTypeIn(vec![
                "PERSON".to_string(),
                "ORG".to_string(),
                "PRODUCT".to_string(),
                "GPE".to_string(),
            ]),
        )
        .with_description("Proper names are spelled as their owners spell them")
        .for_categories(&["spelling", "capitalization", "terminology"]),
    ]
}

/// Inputs a guard condition is evaluated against.
pub struct GuardInput<'a> {
    pub candidate: &'a Candidate,
    pub context: &'a Context,
    pub tokens: &'a [&'a dyn AnnotatedToken],
}

#[derive(Debug)]
enum CompiledCondition {
    BlockTypeIn(Vec<BlockType>),
    InsideQuotation,
    TechnicalIdentifier,
    TextMatches(Regex),
    SentenceMatches(Regex),
    AttributeEquals { key: String, value: serde_json::Value },
    EntityTypeIn(Vec<String>),
    And(Vec<CompiledCondition>),
    Or(Vec<CompiledCondition>),
    Not(Box<CompiledCondition>),
}

impl CompiledCondition {
    fn compile(guard: &str, condition: &GuardCondition) -> Result<Self, GuardError> {
        let regex = |pattern: &str| {
            Regex::new(pattern).map_err(|source| GuardError::InvalidPattern {
                guard: guard.to_string(),
                pattern: pattern.to_string(),
                source,
            })
        };
        let all = |conditions: &[GuardCondition]| {
            conditions
                .iter()
                .map(|c| Self::compile(guard, c))
                .collect::<Result<Vec<_>, _>>()
        };

        Ok(match condition {
            GuardCondition::BlockTypeIn(types) => CompiledCondition::BlockTypeIn(types.clone()),
            GuardCondition::InsideQuotation => CompiledCondition::InsideQuotation,
            GuardCondition::TechnicalIdentifier => CompiledCondition::TechnicalIdentifier,
            GuardCondition::TextMatches(p) => CompiledCondition::TextMatches(regex(p)?),
            GuardCondition::SentenceMatches(p) => CompiledCondition::SentenceMatches(regex(p)?),
            GuardCondition::AttributeEquals { key, value } => CompiledCondition::AttributeEquals {
                key: key.clone(),
                value: value.clone(),
            },
            GuardCondition::EntityTypeIn(labels) => {
                CompiledCondition::EntityTypeIn(labels.iter().map(|l| l.to_uppercase()).collect())
            }
            GuardCondition::And(conditions) => CompiledCondition::And(all(conditions)?),
            GuardCondition::Or(conditions) => CompiledCondition::Or(all(conditions)?),
            GuardCondition::Not(inner) => {
                CompiledCondition::Not(Box::new(Self::compile(guard, inner)?))
            }
        })
    }

    fn evaluate(&self, input: &GuardInput<'_>) -> bool {
        match self {
            CompiledCondition::BlockTypeIn(types) => types.contains(&input.context.block_type),

            CompiledCondition::InsideQuotation => {
                input.context.block_type == BlockType::Quote
                    || input
                        .candidate
                        .sentence
                        .as_deref()
                        .is_some_and(|s| is_quoted(s, &input.candidate.flagged_text))
            }

            CompiledCondition::TechnicalIdentifier => {
                const KINDS: [TokenKind; 4] = [
                    TokenKind::Url,
                    TokenKind::Email,
                    TokenKind::Identifier,
                    TokenKind::Path,
                ];
                if input.tokens.is_empty() {
                    KINDS
                        .iter()
                        .any(|k| crate::candidate::looks_like(&input.candidate.flagged_text, *k))
                } else {
                    input
                        .tokens
                        .iter()
                        .any(|t| KINDS.iter().any(|k| t.is_like(*k)))
                }
            }

            CompiledCondition::TextMatches(re) => re.is_match(&input.candidate.flagged_text),

            CompiledCondition::SentenceMatches(re) => input
                .candidate
                .sentence
                .as_deref()
                .is_some_and(|s| re.is_match(s)),

            CompiledCondition::AttributeEquals { key, value } => {
                input.candidate.attributes.get(key) == Some(value)
            }

            CompiledCondition::EntityTypeIn(labels) => input.tokens.iter().any(|t| {
                t.entity_type()
                    .is_some_and(|e| labels.iter().any(|l| l.eq_ignore_ascii_case(e)))
            }),

            CompiledCondition::And(conditions) => conditions.iter().all(|c| c.evaluate(input)),

            CompiledCondition::Or(conditions) => conditions.iter().any(|c| c.evaluate(input)),

            CompiledCondition::Not(inner) => !inner.evaluate(input),
        }
    }
}

#[derive(Debug)]
struct CompiledGuard {
    name: String,
    categories: Vec<String>,
    condition: CompiledCondition,
}

impl CompiledGuard {
    fn applies_to(&self, category: &str) -> bool {
        self.categories.is_empty() || self.categories.iter().any(|c| c == category)
    }
}

/// An ordered, compiled list of guards.
#[derive(Debug)]
pub struct GuardSet {
    guards: Vec<CompiledGuard>,
}

impl GuardSet {
    /// Compiles guards, rejecting invalid regex patterns.
    pub fn compile(guards: &[Guard]) -> Result<Self, GuardError> {
        let guards = guards
            .iter()
            .map(|g| {
                if g.name.trim().is_empty() {
                    return Err(GuardError::EmptyName);
                }
                Ok(CompiledGuard {
                    name: g.name.clone(),
                    categories: g.categories.iter().map(|c| normalize_category(c)).collect(),
                    condition: CompiledCondition::compile(&g.name, &g.condition)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { guards })
    }

    /// An empty guard set.
    pub fn empty() -> Self {
        Self { guards: Vec::new() }
    }

    /// Returns the name of the first guard that fires, if any.
    pub fn first_match(&self, input: &GuardInput<'_>) -> Option<&str> {
        let category = normalize_category(&input.candidate.category);
        self.guards
            .iter()
            .filter(|g| g.applies_to(&category))
            .find(|g| g.condition.evaluate(input))
            .map(|g| g.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

/// True if `needle` occurs in `sentence` between an opening and a closing
/// quotation mark.
pub(crate) fn is_quoted(sentence: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    let Some(start) = sentence.find(needle) else {
        return false;
    };
    let (before, rest) = sentence.split_at(start);
    let after = &rest[needle.len()..];

    let straight_open = before.matches('"').count() % 2 == 1;
    let curly_open = before.matches('\u{201C}').count() > before.matches('\u{201D}').count();

    (straight_open && after.contains('"')) || (curly_open && after.contains('\u{201D}'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{Span, TokenInfo};

    fn input<'a>(
        candidate: &'a Candidate,
        context: &'a Context,
        tokens: &'a [&'a dyn AnnotatedToken],
    ) -> GuardInput<'a> {
        GuardInput {
            candidate,
            context,
            tokens,
        }
    }

    #[test]
    fn test_default_guards_compile() {
        let set = GuardSet::compile(&default_guards()).unwrap();
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn test_code_block_guard() {
        let set = GuardSet::compile(&default_guards()).unwrap();
        let candidate = Candidate::new("claims", "best", Span::new(0, 4));
        let context = Context::new().with_block_type(BlockType::CodeBlock);
        assert_eq!(set.first_match(&input(&candidate, &context, &[])), Some("code_context"));

        let context = Context::new();
        assert_eq!(set.first_match(&input(&candidate, &context, &[])), None);
    }

    #[test]
    fn test_quotation_guard() {
        let set = GuardSet::compile(&default_guards()).unwrap();
        let context = Context::new();

        let quoted = Candidate::new("claims", "the best", Span::new(0, 8))
            .with_sentence("The review called it \"the best tool ever\" last year.");
        assert_eq!(set.first_match(&input(&quoted, &context, &[])), Some("direct_quotation"));

        let curly = Candidate::new("claims", "the best", Span::new(0, 8))
            .with_sentence("She said \u{201C}it is the best\u{201D} twice.");
        assert_eq!(set.first_match(&input(&curly, &context, &[])), Some("direct_quotation"));

        let unquoted = Candidate::new("claims", "the best", Span::new(0, 8))
            .with_sentence("\"Fast\" is fine, but the best is unproven.");
        assert_eq!(set.first_match(&input(&unquoted, &context, &[])), None);
    }

    #[test]
    fn test_technical_identifier_guard_uses_tokens() {
        let set = GuardSet::compile(&default_guards()).unwrap();
        let context = Context::new();
        let candidate = Candidate::new("spelling", "max_retries", Span::new(0, 11));
        assert_eq!(
            set.first_match(&input(&candidate, &context, &[])),
            Some("technical_identifier")
        );

        let token = TokenInfo::new("https://example.com");
        let tokens: Vec<&dyn AnnotatedToken> = vec![&token];
        let candidate = Candidate::new("spelling", "example", Span::new(8, 15));
        assert_eq!(
            set.first_match(&input(&candidate, &context, &tokens)),
            Some("technical_identifier")
        );
    }

    #[test]
    fn test_guard_scoped_to_categories() {
        let set = GuardSet::compile(&default_guards()).unwrap();
        let context = Context::new();
        let token = TokenInfo::new("Acme").with_entity_type("ORG");
        let tokens: Vec<&dyn AnnotatedToken> = vec![&token];

        let spelling = Candidate::new("Spelling", "Acme", Span::new(0, 4));
        assert_eq!(
            set.first_match(&input(&spelling, &context, &tokens)),
            Some("named_entity")
        );

        let claims = Candidate::new("claims", "Acme", Span::new(0, 4));
        assert_eq!(set.first_match(&input(&claims, &context, &tokens)), None);
    }

    #[test]
    fn test_composite_conditions() {
        let guard = Guard::new(
            "marketing_superlative_in_heading",
            GuardCondition::And(vec![
                GuardCondition::TextMatches("(?i)^best$".to_string()),
                GuardCondition::Not(Box::new(GuardCondition::AttributeEquals {
                    key: "strict".to_string(),
                    value: serde_json::json!(true),
                })),
                GuardCondition::Or(vec![
                    GuardCondition::BlockTypeIn(vec![BlockType::Heading]),
                    GuardCondition::SentenceMatches("^Best ".to_string()),
                ]),
            ]),
        );
        let set = GuardSet::compile(&[guard]).unwrap();
        let heading = Context::new().with_block_type(BlockType::Heading);

        let candidate = Candidate::new("claims", "Best", Span::new(0, 4));
        assert!(set.first_match(&input(&candidate, &heading, &[])).is_some());

        let strict = candidate.clone().with_attribute("strict", serde_json::json!(true));
        assert!(set.first_match(&input(&strict, &heading, &[])).is_none());

        let paragraph = Context::new();
        let in_sentence = candidate.with_sentence("Best practices apply.");
        assert!(set.first_match(&input(&in_sentence, &paragraph, &[])).is_some());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let guard = Guard::new("broken", GuardCondition::TextMatches("([a-z".to_string()));
        assert!(matches!(
            GuardSet::compile(&[guard]),
            Err(GuardError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_guard_deserializes_from_yaml() {
        let yaml = r#"
name: legal_defined_term
categories: [terminology]
condition:
  and:
    - text_matches: "^[A-Z][a-z]+$"
    - sentence_matches: "\\(the \""
"#;
        let guard: Guard = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(guard.categories, vec!["terminology".to_string()]);
        assert!(matches!(guard.condition, GuardCondition::And(ref c) if c.len() == 2));
        assert!(GuardSet::compile(&[guard]).is_ok());
    }
}
