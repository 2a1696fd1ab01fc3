//! Threshold resolution for the confidence gateway.
//!
//! A candidate's threshold is its category's band threshold (or the
//! gateway default) plus the signed adjustment for the named context its
//! document context maps to, clamped to [`MIN_THRESHOLD`, `MAX_THRESHOLD`].

use crate::config::GatewayConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use sw_core::candidate::{BlockType, ContentType, Context, Domain};
use sw_core::reliability::normalize_category;
use tracing::warn;

pub const MIN_THRESHOLD: f64 = 0.1;
pub const MAX_THRESHOLD: f64 = 0.9;

/// Fixed set of contexts that carry a configured threshold adjustment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NamedContext {
    TechnicalDocumentation,
    MarketingContent,
    LegalContent,
    CasualContent,
    FormalDocumentation,
}

impl NamedContext {
    pub const ALL: [NamedContext; 5] = [
        NamedContext::TechnicalDocumentation,
        NamedContext::MarketingContent,
        NamedContext::LegalContent,
        NamedContext::CasualContent,
        NamedContext::FormalDocumentation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NamedContext::TechnicalDocumentation => "technical_documentation",
            NamedContext::MarketingContent => "marketing_content",
            NamedContext::LegalContent => "legal_content",
            NamedContext::CasualContent => "casual_content",
            NamedContext::FormalDocumentation => "formal_documentation",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    /// Maps a document context to a named context.
    ///
    /// Content type decides first, then domain, then code blocks. Plain
    /// general content maps to nothing and gets no adjustment.
    pub fn from_context(context: &Context) -> Option<Self> {
        match context.content_type {
            ContentType::Marketing => return Some(NamedContext::MarketingContent),
            ContentType::Legal => return Some(NamedContext::LegalContent),
            ContentType::Technical | ContentType::Procedural => {
                return Some(NamedContext::TechnicalDocumentation)
            }
            ContentType::Narrative => return Some(NamedContext::CasualContent),
            ContentType::Formal => return Some(NamedContext::FormalDocumentation),
            ContentType::General => {}
        }

        match context.domain {
            Domain::Legal => Some(NamedContext::LegalContent),
            Domain::Software => Some(NamedContext::TechnicalDocumentation),
            _ if matches!(
                context.block_type,
                BlockType::CodeBlock | BlockType::InlineCode
            ) =>
            {
                Some(NamedContext::TechnicalDocumentation)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for NamedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved threshold with the parts it was built from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedThreshold {
    pub base: f64,
    pub adjustment: f64,
    pub context: Option<NamedContext>,
    /// `base + adjustment`, clamped.
    pub value: f64,
}

/// Per-category thresholds and per-context adjustments derived from a config.
#[derive(Debug, Clone, Default)]
pub struct ThresholdTable {
    default_threshold: f64,
    by_category: HashMap<String, f64>,
    adjustments: HashMap<NamedContext, f64>,
}

impl ThresholdTable {
    pub fn from_config(config: &GatewayConfig) -> Self {
        let mut by_category = HashMap::new();
        for band in config.error_type_thresholds.values() {
            for category in &band.types {
                by_category.insert(normalize_category(category), band.threshold);
            }
        }

        let mut adjustments = HashMap::new();
        for (name, adj) in &config.context_adjustments {
            match NamedContext::parse(name) {
                Some(context) => {
                    adjustments.insert(context, adj.adjustment);
                }
                None => warn!(context = %name, "Ignoring adjustment for unknown context"),
            }
        }

        Self {
            default_threshold: config.gateway.confidence_threshold,
            by_category,
            adjustments,
        }
    }

    pub fn default_threshold(&self) -> f64 {
        self.default_threshold
    }

    /// Threshold for a category before any context adjustment.
    pub fn category_threshold(&self, category: &str) -> f64 {
        self.by_category
            .get(&normalize_category(category))
            .copied()
            .unwrap_or(self.default_threshold)
    }

    pub fn adjustment(&self, context: NamedContext) -> f64 {
        self.adjustments.get(&context).copied().unwrap_or(0.0)
    }

    pub fn resolve(&self, category: &str, context: &Context) -> ResolvedThreshold {
        let base = self.category_threshold(category);
        let named = NamedContext::from_context(context);
        let adjustment = named.map(|c| self.adjustment(c)).unwrap_or(0.0);

        ResolvedThreshold {
            base,
            adjustment,
            context: named,
            value: (base + adjustment).clamp(MIN_THRESHOLD, MAX_THRESHOLD),
        }
    }
}
