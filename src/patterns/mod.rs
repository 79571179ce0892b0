//! Pattern registry for identifier, citation and term extraction
//!
//! This module provides:
//! - Pre-compiled regex tables loaded from `config-templates/patterns.toml`
//! - A priority-ordered, claim-aware identifier matcher (longest pattern wins)
//! - Curated term tables (stop-words, brands, device types, categories, courts, laws)
//!
//! The built-in table is embedded at compile time; a custom file can replace it.

use crate::error::{LexfuseError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::Path;

/// Source of the built-in pattern table
pub const BUILTIN_PATTERNS: &str = include_str!("../../config-templates/patterns.toml");

/// Kind of device/subscriber identifier found in free text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    Imei,
    Imsi,
    Iccid,
    Msisdn,
}

/// Identifier pattern configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifierConfig {
    pub kind: IdentifierKind,
    pub pattern: String,
    pub priority: u8,
}

/// Citation regexes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationPatternsConfig {
    pub statute: String,
    pub gazette: String,
    pub case_number: String,
    pub ecli: String,
    pub date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LawAlias {
    pub alias: String,
    pub abbreviation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourtsConfig {
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandConfig {
    pub name: String,
    pub triggers: Vec<String>,
    #[serde(default)]
    pub model_pattern: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceTypeConfig {
    pub name: String,
    pub triggers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    pub trigger: String,
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoriesConfig {
    pub default: String,
    #[serde(default)]
    pub rule: Vec<CategoryRule>,
}

/// Curated term tables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermsConfig {
    pub stop_words: Vec<String>,
    pub legal_terms: Vec<String>,
    #[serde(default)]
    pub known_laws: Vec<String>,
    #[serde(default)]
    pub law_alias: Vec<LawAlias>,
    pub courts: CourtsConfig,
    #[serde(default)]
    pub brand: Vec<BrandConfig>,
    #[serde(default)]
    pub device_type: Vec<DeviceTypeConfig>,
    pub categories: CategoriesConfig,
}

/// Pattern file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternsConfig {
    pub identifier: Vec<IdentifierConfig>,
    pub citations: CitationPatternsConfig,
    pub terms: TermsConfig,
}

/// Compiled identifier pattern
#[derive(Debug, Clone)]
pub struct CompiledIdentifierPattern {
    pub kind: IdentifierKind,
    pub regex: Regex,
    pub priority: u8,
}

/// Compiled citation regexes
#[derive(Debug, Clone)]
pub struct CompiledCitationPatterns {
    pub statute: Regex,
    pub gazette: Regex,
    pub case_number: Regex,
    pub ecli: Regex,
    pub date: Regex,
}

/// Brand with its optional model extractor
#[derive(Debug, Clone)]
pub struct CompiledBrand {
    pub name: String,
    pub triggers: Vec<String>,
    pub model: Option<Regex>,
}

/// Identifier accepted by the matcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierMatch {
    pub kind: IdentifierKind,
    pub value: String,
    pub span: Range<usize>,
}

/// Byte ranges of the input already taken by an earlier match
#[derive(Debug, Default, Clone)]
pub struct ClaimSet {
    spans: Vec<Range<usize>>,
}

impl ClaimSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn overlaps(&self, span: &Range<usize>) -> bool {
        self.spans
            .iter()
            .any(|s| s.start < span.end && span.start < s.end)
    }

    /// Claim `span` unless it overlaps an existing claim
    pub fn try_claim(&mut self, span: Range<usize>) -> bool {
        if self.overlaps(&span) {
            return false;
        }
        self.spans.push(span);
        true
    }
}

/// Pattern registry with all pre-compiled patterns
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    /// Identifier patterns, sorted by ascending priority
    pub identifiers: Vec<CompiledIdentifierPattern>,
    pub citations: CompiledCitationPatterns,
    pub brands: Vec<CompiledBrand>,
    pub terms: TermsConfig,
}

impl PatternRegistry {
    /// Registry built from the embedded pattern table
    pub fn builtin() -> Result<Self> {
        let config: PatternsConfig = toml::from_str(BUILTIN_PATTERNS)?;
        Self::from_config(config)
    }

    /// Load pattern registry from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| LexfuseError::Io {
            source: e,
            context: format!("Failed to read pattern file: {:?}", path),
        })?;
        let config: PatternsConfig = toml::from_str(&content)?;
        Self::from_config(config)
    }

    /// Build pattern registry from a parsed configuration
    pub fn from_config(config: PatternsConfig) -> Result<Self> {
        let mut identifiers = config
            .identifier
            .iter()
            .map(|cfg| {
                compile(&cfg.pattern, &format!("identifier '{:?}'", cfg.kind)).map(|regex| {
                    CompiledIdentifierPattern {
                        kind: cfg.kind,
                        regex,
                        priority: cfg.priority,
                    }
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // Stable, so equal priorities keep file order
        identifiers.sort_by_key(|p| p.priority);

        let c = &config.citations;
        let citations = CompiledCitationPatterns {
            statute: compile(&c.statute, "citation 'statute'")?,
            gazette: compile(&c.gazette, "citation 'gazette'")?,
            case_number: compile(&c.case_number, "citation 'case_number'")?,
            ecli: compile(&c.ecli, "citation 'ecli'")?,
            date: compile(&c.date, "citation 'date'")?,
        };

        let brands = config
            .terms
            .brand
            .iter()
            .map(|b| {
                let model = b
                    .model_pattern
                    .as_deref()
                    .map(|p| compile(p, &format!("model pattern for brand '{}'", b.name)))
                    .transpose()?;
                Ok(CompiledBrand {
                    name: b.name.clone(),
                    triggers: b.triggers.iter().map(|t| t.to_lowercase()).collect(),
                    model,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            identifiers,
            citations,
            brands,
            terms: config.terms,
        })
    }

    /// Extract device/subscriber identifiers.
    ///
    /// Patterns run in priority order. A candidate is rejected when its value is
    /// glued to further digits or overlaps a span in `claims`; accepted values
    /// are added to `claims` so shorter patterns cannot re-read the same digits.
    pub fn match_identifiers(&self, text: &str, claims: &mut ClaimSet) -> Vec<IdentifierMatch> {
        let mut found = Vec::new();

        for pattern in &self.identifiers {
            for caps in pattern.regex.captures_iter(text) {
                let Some(value) = caps.get(1) else {
                    continue;
                };
                let span = value.start()..value.end();
                if !digit_bounded(text, &span) {
                    continue;
                }
                if claims.try_claim(span.clone()) {
                    found.push(IdentifierMatch {
                        kind: pattern.kind,
                        value: value.as_str().to_string(),
                        span,
                    });
                }
            }
        }

        found.sort_by_key(|m| m.span.start);
        found
    }

    pub fn is_stop_word(&self, token: &str) -> bool {
        self.terms.stop_words.iter().any(|w| w == token)
    }

    /// Law abbreviation for a known abbreviation or a spelled-out law name
    pub fn canonical_law(&self, raw: &str) -> Option<String> {
        let upper = raw.trim().to_uppercase();
        if self.terms.known_laws.iter().any(|l| *l == upper) {
            return Some(upper);
        }
        let lower = raw.trim().to_lowercase();
        self.terms
            .law_alias
            .iter()
            .find(|a| lower.starts_with(&a.alias))
            .map(|a| a.abbreviation.clone())
    }
}

fn compile(pattern: &str, what: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| LexfuseError::Config(format!("Invalid regex for {}: {}", what, e)))
}

/// True when the digits in `span` are not part of a longer digit run.
/// A leading `+` belongs to the value, so the check looks before it; a `+`
/// left outside the value marks a phone number and rejects the match.
fn digit_bounded(text: &str, span: &Range<usize>) -> bool {
    let before = text[..span.start]
        .chars()
        .next_back()
        .map_or(false, |c| c.is_ascii_digit() || c == '+');
    let after = text[span.end..]
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_digit());
    !before && !after
}
