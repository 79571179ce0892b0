//! Free text → NormalizedQuery

use super::{DateRange, Identifiers, NormalizedQuery, QueryOptions};
use crate::citations::{Citation, CitationDetector, CitationKind};
use crate::patterns::{ClaimSet, IdentifierKind, PatternRegistry};
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Minimum token length (in characters) for a keyword
const MIN_KEYWORD_CHARS: usize = 3;

const ASK_CASE_ID: &str = "Koji je broj predmeta (npr. Pp-1234/2025)?";
const ASK_IMEI: &str = "Koji je IMEI broj uređaja?";
const ASK_DEVICE_TYPE: &str = "O kojoj se vrsti uređaja radi (mobitel, računalo, tablet)?";
const ASK_BRAND_MODEL: &str = "Koje su marka i model uređaja?";
const ASK_DATE: &str = "Kojeg je datuma izdan nalog ili provedena radnja?";

/// Parses free text into a [`NormalizedQuery`]. Never fails: anything it
/// cannot extract is simply left empty.
#[derive(Debug, Clone)]
pub struct QueryNormalizer {
    registry: Arc<PatternRegistry>,
    detector: CitationDetector,
    default_jurisdiction: String,
}

impl QueryNormalizer {
    pub fn new(registry: Arc<PatternRegistry>, default_jurisdiction: impl Into<String>) -> Self {
        Self {
            detector: CitationDetector::new(registry.clone()),
            registry,
            default_jurisdiction: default_jurisdiction.into(),
        }
    }

    pub fn normalize(&self, text: &str, opts: &QueryOptions) -> NormalizedQuery {
        let cleaned_text = clean(text);
        let lower = cleaned_text.to_lowercase();

        let mut claims = ClaimSet::new();
        let (case_id, related_case_ids) = self.case_ids(&cleaned_text, &mut claims);
        let identifiers = self.identifiers(&cleaned_text, &lower, &mut claims);
        let keywords = self.keywords(&lower);
        let categories = self.categories(&lower);

        let citations = self.detector.detect_all(&cleaned_text);
        let priority_articles = citations
            .get(&CitationKind::Statute)
            .cloned()
            .unwrap_or_default();

        let date_range = opts.date_range.unwrap_or_else(|| {
            date_range_of(citations.get(&CitationKind::Date).into_iter().flatten())
        });

        let jurisdiction = opts
            .jurisdiction
            .clone()
            .unwrap_or_else(|| self.default_jurisdiction.clone());

        let mut query = NormalizedQuery {
            raw_text: text.to_string(),
            cleaned_text,
            keywords,
            case_id,
            related_case_ids,
            identifiers,
            priority_articles,
            categories,
            jurisdiction,
            date_range,
            follow_up_questions: Vec::new(),
        };
        query.follow_up_questions = follow_up_questions(&query, opts.max_follow_up_questions);

        tracing::debug!(
            keywords = query.keywords.len(),
            case_id = ?query.case_id,
            "Query normalized"
        );

        query
    }

    /// First case number is the primary id, the rest are related
    fn case_ids(&self, text: &str, claims: &mut ClaimSet) -> (Option<String>, BTreeSet<String>) {
        let mut primary: Option<String> = None;
        let mut related = BTreeSet::new();

        for m in self.registry.citations.case_number.find_iter(text) {
            claims.try_claim(m.range());
            let id = m.as_str().to_string();
            match &primary {
                None => primary = Some(id),
                Some(p) if *p != id => {
                    related.insert(id);
                }
                Some(_) => {}
            }
        }

        (primary, related)
    }

    fn identifiers(&self, text: &str, lower: &str, claims: &mut ClaimSet) -> Identifiers {
        let mut ids = Identifiers::default();

        for m in self.registry.match_identifiers(text, claims) {
            let bucket = match m.kind {
                IdentifierKind::Imei => &mut ids.imei,
                IdentifierKind::Imsi => &mut ids.imsi,
                IdentifierKind::Iccid => &mut ids.iccid,
                IdentifierKind::Msisdn => &mut ids.msisdn,
            };
            if !bucket.contains(&m.value) {
                bucket.push(m.value);
            }
        }

        ids.device_type = self
            .registry
            .terms
            .device_type
            .iter()
            .find(|d| d.triggers.iter().any(|t| lower.contains(&t.to_lowercase())))
            .map(|d| d.name.clone());

        if let Some(brand) = self
            .registry
            .brands
            .iter()
            .find(|b| b.triggers.iter().any(|t| lower.contains(t.as_str())))
        {
            ids.brand = Some(brand.name.clone());
            ids.model = brand
                .model
                .as_ref()
                .and_then(|re| re.captures(text))
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "));
        }

        ids
    }

    /// Tokens of at least three characters minus stop-words, followed by
    /// multi-word term hits (brands, device types, legal terms)
    fn keywords(&self, lower: &str) -> Vec<String> {
        let mut keywords: Vec<String> = Vec::new();
        let mut push = |word: &str| {
            if !keywords.iter().any(|k| k == word) {
                keywords.push(word.to_string());
            }
        };

        for token in lower.split(|c: char| !c.is_alphanumeric()) {
            if token.chars().count() >= MIN_KEYWORD_CHARS && !self.registry.is_stop_word(token) {
                push(token);
            }
        }

        let terms = &self.registry.terms;
        let brand_hits = self.registry.brands.iter().flat_map(|b| b.triggers.iter());
        let device_hits = terms.device_type.iter().flat_map(|d| d.triggers.iter());
        for term in brand_hits.chain(device_hits).chain(terms.legal_terms.iter()) {
            let term = term.to_lowercase();
            if lower.contains(&term) {
                push(&term);
            }
        }

        keywords
    }

    fn categories(&self, lower: &str) -> BTreeSet<String> {
        let table = &self.registry.terms.categories;
        let mut categories: BTreeSet<String> = table
            .rule
            .iter()
            .filter(|rule| lower.contains(&rule.trigger))
            .map(|rule| rule.category.clone())
            .collect();

        if categories.is_empty() {
            categories.insert(table.default.clone());
        }
        categories
    }
}

/// Trim, drop control characters and collapse whitespace runs
fn clean(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.chars().filter(|c| !c.is_control()).collect::<String>())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn date_range_of<'a>(dates: impl Iterator<Item = &'a Citation>) -> DateRange {
    let parsed: Vec<NaiveDate> = dates
        .filter_map(|c| match c {
            Citation::Date { value } => NaiveDate::parse_from_str(value, "%Y-%m-%d").ok(),
            _ => None,
        })
        .collect();

    DateRange {
        from: parsed.iter().min().copied(),
        to: parsed.iter().max().copied(),
    }
}

/// Questions for missing mandatory fields, in fixed priority order
fn follow_up_questions(query: &NormalizedQuery, max: usize) -> Vec<String> {
    let ids = &query.identifiers;
    let missing = [
        (query.case_id.is_none(), ASK_CASE_ID),
        (ids.imei.is_empty(), ASK_IMEI),
        (ids.device_type.is_none(), ASK_DEVICE_TYPE),
        (ids.brand.is_none() || ids.model.is_none(), ASK_BRAND_MODEL),
        (query.date_range.is_empty(), ASK_DATE),
    ];

    missing
        .iter()
        .filter(|(is_missing, _)| *is_missing)
        .map(|(_, question)| question.to_string())
        .take(max)
        .collect()
}
