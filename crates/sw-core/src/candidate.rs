//! Candidate and context data models for Style Warden.
//!
//! A [`Candidate`] is a span of text flagged by an external detector as a
//! possible style violation. A [`Context`] describes where that span lives:
//! the enclosing block and the declared document metadata. Both are produced
//! upstream and consumed read-only by scoring and gating.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Byte offsets of a flagged span in the source text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Span {
    /// Start offset (inclusive).
    pub start: usize,
    /// End offset (exclusive).
    pub end: usize,
}

impl Span {
    /// Creates a new span.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Returns the span length, zero for inverted spans.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Returns true if the span covers no text.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Severity hint supplied by the detector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// A flagged span of text plus the rule category that flagged it.
///
/// Candidates are immutable once created; builder methods consume and
/// return the value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    /// Unique identifier for this candidate.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Rule category id (e.g. "claims", "spelling").
    pub category: String,
    /// Location of the flagged text.
    #[serde(default)]
    pub span: Span,
    /// The flagged text itself.
    #[serde(default)]
    pub flagged_text: String,
    /// The sentence surrounding the flagged text, if the detector supplied it.
    #[serde(default)]
    pub sentence: Option<String>,
    /// Severity hint from the detector.
    #[serde(default)]
    pub severity: Severity,
    /// Free-form detector attributes (matched pattern, part of speech, ...).
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl Candidate {
    /// Creates a new candidate for the given category and flagged text.
    pub fn new(category: impl Into<String>, flagged_text: impl Into<String>, span: Span) -> Self {
        Self {
            id: Uuid::new_v4(),
            category: category.into(),
            span,
            flagged_text: flagged_text.into(),
            sentence: None,
            severity: Severity::default(),
            attributes: HashMap::new(),
        }
    }

    /// Sets the surrounding sentence.
    pub fn with_sentence(mut self, sentence: impl Into<String>) -> Self {
        self.sentence = Some(sentence.into());
        self
    }

    /// Sets the severity hint.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Adds a detector attribute.
    pub fn with_attribute(mut self, key: &str, value: serde_json::Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    /// Returns a string attribute, if present.
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }

    /// Returns a numeric attribute, if present.
    pub fn attribute_f64(&self, key: &str) -> Option<f64> {
        self.attributes.get(key).and_then(|v| v.as_f64())
    }

    /// Returns the flagged text lowercased and trimmed, used as a term key.
    pub fn term_key(&self) -> String {
        self.flagged_text.trim().to_lowercase()
    }
}

/// Declares a lenient string-backed enum: unknown or empty values fall back
/// to the default variant instead of failing deserialization.
macro_rules! lenient_enum {
    (
        $(#[$meta:meta])*
        $name:ident { default: $default:ident => $default_str:literal, $($variant:ident => $s:literal $(| $alias:literal)*),* $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        #[serde(rename_all = "snake_case", from = "String")]
        pub enum $name {
            #[default]
            $default,
            $($variant),*
        }

        impl $name {
            /// Parses a value, falling back to the default for unknown input.
            pub fn parse_lenient(value: &str) -> Self {
                match value.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
                    $($s $(| $alias)* => $name::$variant,)*
                    _ => $name::$default,
                }
            }

            /// Returns the canonical string form.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $name::$default => $default_str,
                    $($name::$variant => $s,)*
                }
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::parse_lenient(&value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

lenient_enum! {
    /// Structural block enclosing the flagged span.
    BlockType {
        default: Paragraph => "paragraph",
        Heading => "heading" | "section",
        Title => "title" | "document_title",
        ListItem => "list_item" | "ordered_list_item" | "unordered_list_item",
        TableCell => "table_cell" | "table_header",
        CodeBlock => "code_block" | "listing" | "literal",
        InlineCode => "inline_code" | "monospace",
        Quote => "quote" | "blockquote",
        Admonition => "admonition" | "note" | "warning",
        Procedure => "procedure" | "step",
    }
}

lenient_enum! {
    /// Declared content type of the document.
    ContentType {
        default: General => "general",
        Marketing => "marketing",
        Legal => "legal",
        Technical => "technical" | "reference",
        Procedural => "procedural" | "tutorial",
        Narrative => "narrative" | "casual" | "blog",
        Formal => "formal" | "academic",
    }
}

lenient_enum! {
    /// Declared subject-matter domain of the document.
    Domain {
        default: General => "general",
        Finance => "finance" | "financial",
        Legal => "legal",
        Medical => "medical" | "healthcare",
        Software => "software" | "technology",
    }
}

lenient_enum! {
    /// Declared audience of the document.
    Audience {
        default: General => "general",
        Beginner => "beginner" | "novice",
        Expert => "expert" | "developer",
    }
}

/// Where a candidate appears: enclosing block plus document metadata.
///
/// Absent fields default to neutral values (`paragraph`, `general`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct Context {
    #[serde(default)]
    pub block_type: BlockType,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub domain: Domain,
    #[serde(default)]
    pub audience: Audience,
}

impl Context {
    /// Creates a neutral context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a context from loosely typed strings, defaulting unknown values.
    pub fn from_strs(block_type: &str, content_type: &str, domain: &str, audience: &str) -> Self {
        Self {
            block_type: BlockType::parse_lenient(block_type),
            content_type: ContentType::parse_lenient(content_type),
            domain: Domain::parse_lenient(domain),
            audience: Audience::parse_lenient(audience),
        }
    }

    pub fn with_block_type(mut self, block_type: BlockType) -> Self {
        self.block_type = block_type;
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = domain;
        self
    }

    pub fn with_audience(mut self, audience: Audience) -> Self {
        self.audience = audience;
        self
    }
}

/// Lexical shapes a token can be tested for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Url,
    Email,
    Number,
    /// Programming identifier: snake_case, camelCase, dotted.path, --flag.
    Identifier,
    /// File system path.
    Path,
}

/// Narrow view of an NLP-annotated token.
///
/// The upstream parser implements this for its own token type; scoring only
/// ever sees tokens through this trait.
pub trait AnnotatedToken: Send + Sync {
    /// Surface text of the token.
    fn text(&self) -> &str;

    /// Lemma, or the surface text when the parser provides none.
    fn lemma(&self) -> &str {
        self.text()
    }

    /// Named-entity label (e.g. "ORG", "PRODUCT"), if any.
    fn entity_type(&self) -> Option<&str> {
        None
    }

    /// Dependency relation to the head (e.g. "nsubj", "ROOT"), if any.
    fn dependency_role(&self) -> Option<&str> {
        None
    }

    /// Coarse part-of-speech tag (e.g. "NOUN", "PROPN"), if any.
    fn part_of_speech(&self) -> Option<&str> {
        None
    }

    /// Tests whether the token has the given lexical shape.
    fn is_like(&self, kind: TokenKind) -> bool {
        looks_like(self.text(), kind)
    }
}

/// Default lexical shape checks shared by [`AnnotatedToken`] implementations.
pub fn looks_like(text: &str, kind: TokenKind) -> bool {
    let text = text.trim();
    if text.is_empty() {
        return false;
    }
    match kind {
        TokenKind::Url => {
            let lower = text.to_lowercase();
            lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("www.")
        }
        TokenKind::Email => {
            let mut parts = text.splitn(2, '@');
            matches!((parts.next(), parts.next()), (Some(user), Some(host))
                if !user.is_empty() && host.contains('.') && !host.starts_with('.'))
        }
        TokenKind::Number => {
            let stripped = text.trim_end_matches('%').replace([',', '.'], "");
            !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit())
        }
        TokenKind::Identifier => {
            let has_word_chars = text.chars().any(|c| c.is_ascii_alphabetic());
            let snake = text.contains('_') && !text.contains(' ');
            let flag = text.starts_with("--") && text.len() > 2;
            let dotted = text.contains('.')
                && !text.ends_with('.')
                && text.split('.').all(|p| !p.is_empty() && !p.contains(' '));
            let camel = text
                .chars()
                .skip(1)
                .any(|c| c.is_ascii_uppercase())
                && text.chars().next().is_some_and(|c| c.is_ascii_lowercase());
            has_word_chars && (snake || flag || dotted || camel || text.ends_with("()"))
        }
        TokenKind::Path => {
            let unix = (text.starts_with('/') || text.starts_with("./") || text.starts_with("~/"))
                && text.len() > 1;
            let windows = text.contains('\\') && text.contains(':');
            unix || windows
        }
    }
}

/// Owned token annotation, for callers without their own token type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TokenInfo {
    pub text: String,
    #[serde(default)]
    pub lemma: Option<String>,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub dependency_role: Option<String>,
    #[serde(default)]
    pub part_of_speech: Option<String>,
}

impl TokenInfo {
    /// Creates a token with only surface text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_entity_type(mut self, entity_type: &str) -> Self {
        self.entity_type = Some(entity_type.to_string());
        self
    }

    pub fn with_dependency_role(mut self, role: &str) -> Self {
        self.dependency_role = Some(role.to_string());
        self
    }

    pub fn with_part_of_speech(mut self, pos: &str) -> Self {
        self.part_of_speech = Some(pos.to_string());
        self
    }
}

impl AnnotatedToken for TokenInfo {
    fn text(&self) -> &str {
        &self.text
    }

    fn lemma(&self) -> &str {
        self.lemma.as_deref().unwrap_or(&self.text)
    }

    fn entity_type(&self) -> Option<&str> {
        self.entity_type.as_deref()
    }

    fn dependency_role(&self) -> Option<&str> {
        self.dependency_role.as_deref()
    }

    fn part_of_speech(&self) -> Option<&str> {
        self.part_of_speech.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_builder() {
        let candidate = Candidate::new("claims", "best-in-class", Span::new(10, 23))
            .with_sentence("Our best-in-class product wins.")
            .with_severity(Severity::High)
            .with_attribute("pos", serde_json::json!("ADJ"));

        assert_eq!(candidate.category, "claims");
        assert_eq!(candidate.span.len(), 13);
        assert_eq!(candidate.severity, Severity::High);
        assert_eq!(candidate.attribute_str("pos"), Some("ADJ"));
        assert_eq!(candidate.attribute_f64("pos"), None);
    }

    #[test]
    fn test_inverted_span_is_empty() {
        let span = Span::new(10, 4);
        assert_eq!(span.len(), 0);
        assert!(span.is_empty());
    }

    #[test]
    fn test_candidate_deserializes_with_missing_fields() {
        let candidate: Candidate =
            serde_json::from_str(r#"{"category": "spelling", "flagged_text": "teh"}"#).unwrap();
        assert_eq!(candidate.category, "spelling");
        assert_eq!(candidate.severity, Severity::Medium);
        assert!(candidate.sentence.is_none());
        assert!(candidate.attributes.is_empty());
    }

    #[test]
    fn test_context_lenient_parsing() {
        let context = Context::from_strs("Code-Block", "tutorial", "unknown-domain", "");
        assert_eq!(context.block_type, BlockType::CodeBlock);
        assert_eq!(context.content_type, ContentType::Procedural);
        assert_eq!(context.domain, Domain::General);
        assert_eq!(context.audience, Audience::General);
    }

    #[test]
    fn test_context_deserializes_unknown_values_to_defaults() {
        let context: Context =
            serde_json::from_str(r#"{"block_type": "sidebar", "content_type": "legal"}"#).unwrap();
        assert_eq!(context.block_type, BlockType::Paragraph);
        assert_eq!(context.content_type, ContentType::Legal);
        assert_eq!(context.domain, Domain::General);
    }

    #[test]
    fn test_context_serializes_snake_case() {
        let context = Context::new().with_block_type(BlockType::TableCell);
        let json = serde_json::to_value(&context).unwrap();
        assert_eq!(json["block_type"], "table_cell");
        assert_eq!(json["audience"], "general");
    }

    #[test]
    fn test_token_shapes() {
        assert!(looks_like("https://example.com", TokenKind::Url));
        assert!(looks_like("dev@example.com", TokenKind::Email));
        assert!(!looks_like("@example", TokenKind::Email));
        assert!(looks_like("1,024", TokenKind::Number));
        assert!(looks_like("45%", TokenKind::Number));
        assert!(looks_like("max_retries", TokenKind::Identifier));
        assert!(looks_like("getValue", TokenKind::Identifier));
        assert!(looks_like("--dry-run", TokenKind::Identifier));
        assert!(looks_like("os.path", TokenKind::Identifier));
        assert!(!looks_like("simply", TokenKind::Identifier));
        assert!(looks_like("/etc/hosts", TokenKind::Path));
        assert!(!looks_like("and/or", TokenKind::Path));
    }

    #[test]
    fn test_token_info_trait_defaults() {
        let token = TokenInfo::new("Acme")
            .with_entity_type("ORG")
            .with_part_of_speech("PROPN");
        assert_eq!(token.lemma(), "Acme");
        assert_eq!(token.entity_type(), Some("ORG"));
        assert_eq!(token.dependency_role(), None);
        assert!(!token.is_like(TokenKind::Url));
    }
}
