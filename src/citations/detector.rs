//! Citation detection over the compiled pattern tables

use super::{Citation, CitationExtract, CitationKind, CitationMap, DetectedCitations};
use crate::patterns::{ClaimSet, PatternRegistry};
use chrono::NaiveDate;
use regex::Captures;
use std::collections::HashSet;
use std::sync::Arc;

/// Detects statute, gazette, case-number, ECLI, date and court references
#[derive(Debug, Clone)]
pub struct CitationDetector {
    registry: Arc<PatternRegistry>,
}

impl CitationDetector {
    pub fn new(registry: Arc<PatternRegistry>) -> Self {
        Self { registry }
    }

    /// All citations grouped by kind.
    ///
    /// Detectors run from the most to the least specific (ECLI, gazette, case
    /// number, statute, date) and share one claim set, so a digit run read as a
    /// gazette issue is never re-read as a case number or a date.
    pub fn detect_all(&self, text: &str) -> CitationMap {
        let mut claims = ClaimSet::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut map = CitationMap::new();
        let patterns = &self.registry.citations;

        let mut push = |citation: Citation, map: &mut CitationMap| {
            if seen.insert(citation.canonical()) {
                map.entry(citation.kind()).or_default().push(citation);
            }
        };

        for m in patterns.ecli.find_iter(text) {
            if claims.try_claim(m.range()) {
                push(
                    Citation::Ecli {
                        value: m.as_str().to_string(),
                    },
                    &mut map,
                );
            }
        }

        for caps in patterns.gazette.captures_iter(text) {
            if !claims.try_claim(whole_match(&caps)) {
                continue;
            }
            for pair in caps[1].split(',') {
                if let Some(citation) = parse_gazette_pair(pair) {
                    push(citation, &mut map);
                }
            }
        }

        for caps in patterns.case_number.captures_iter(text) {
            if !claims.try_claim(whole_match(&caps)) {
                continue;
            }
            if let (Ok(number), Ok(year)) = (caps[2].parse::<u32>(), caps[3].parse::<u32>()) {
                push(
                    Citation::CaseNumber {
                        prefix: caps[1].to_string(),
                        number,
                        year,
                    },
                    &mut map,
                );
            }
        }

        for caps in patterns.statute.captures_iter(text) {
            let whole = whole_match(&caps);
            if !claims.try_claim(whole.clone()) {
                continue;
            }
            let Ok(article) = caps[1].parse::<u32>() else {
                continue;
            };
            let law = caps
                .get(4)
                .and_then(|l| self.registry.canonical_law(l.as_str()))
                .or_else(|| self.registry.canonical_law(&text[whole.end..]));

            push(
                Citation::Statute {
                    law,
                    article,
                    paragraph: caps.get(2).and_then(|p| p.as_str().parse().ok()),
                    item: caps.get(3).and_then(|i| i.as_str().parse().ok()),
                },
                &mut map,
            );
        }

        for caps in patterns.date.captures_iter(text) {
            if !claims.try_claim(whole_match(&caps)) {
                continue;
            }
            let parsed = (
                caps[1].parse::<u32>(),
                caps[2].parse::<u32>(),
                caps[3].parse::<i32>(),
            );
            if let (Ok(day), Ok(month), Ok(year)) = parsed {
                if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                    push(
                        Citation::Date {
                            value: date.format("%Y-%m-%d").to_string(),
                        },
                        &mut map,
                    );
                }
            }
        }

        let lower = text.to_lowercase();
        let mut court_claims = ClaimSet::new();
        for name in &self.registry.terms.courts.names {
            for (start, matched) in lower.match_indices(name.as_str()) {
                if court_claims.try_claim(start..start + matched.len()) {
                    push(Citation::CourtType { name: name.clone() }, &mut map);
                }
            }
        }

        map
    }

    /// Flat summary of [`detect_all`](Self::detect_all) plus legal-term hits
    pub fn extract(&self, text: &str) -> CitationExtract {
        self.analyze(text).extract
    }

    /// Grouped citations and their summary from a single detection pass
    pub fn analyze(&self, text: &str) -> DetectedCitations {
        let citations = self.detect_all(text);
        let extract = self.summarize(text, &citations);
        DetectedCitations { citations, extract }
    }

    fn summarize(&self, text: &str, citations: &CitationMap) -> CitationExtract {
        let rendered = |kind: CitationKind| -> Vec<String> {
            citations
                .get(&kind)
                .map(|v| v.iter().map(ToString::to_string).collect())
                .unwrap_or_default()
        };

        let lower = text.to_lowercase();
        let mut laws: Vec<String> = Vec::new();
        let mut add_law = |law: String| {
            if !laws.contains(&law) {
                laws.push(law);
            }
        };

        for citation in citations.get(&CitationKind::Statute).into_iter().flatten() {
            if let Citation::Statute { law: Some(law), .. } = citation {
                add_law(law.clone());
            }
        }
        for alias in &self.registry.terms.law_alias {
            if lower.contains(&alias.alias) {
                add_law(alias.abbreviation.clone());
            }
        }
        for token in text.split(|c: char| !c.is_alphanumeric()) {
            if self.registry.terms.known_laws.iter().any(|l| l == token) {
                add_law(token.to_string());
            }
        }

        let legal_terms = self
            .registry
            .terms
            .legal_terms
            .iter()
            .filter(|term| lower.contains(term.as_str()))
            .cloned()
            .collect();

        let has_specific_refs = [
            CitationKind::Statute,
            CitationKind::Gazette,
            CitationKind::CaseNumber,
        ]
        .iter()
        .any(|kind| citations.get(kind).map_or(false, |v| !v.is_empty()));

        CitationExtract {
            laws,
            articles: rendered(CitationKind::Statute),
            case_numbers: rendered(CitationKind::CaseNumber),
            court_types: rendered(CitationKind::CourtType),
            legal_terms,
            nn_references: rendered(CitationKind::Gazette),
            dates: rendered(CitationKind::Date),
            has_specific_refs,
        }
    }
}

fn whole_match(caps: &Captures<'_>) -> std::ops::Range<usize> {
    caps.get(0).map_or(0..0, |m| m.range())
}

/// "70/17" → NN 70/2017; two-digit years from 90 up are read as 19xx
fn parse_gazette_pair(pair: &str) -> Option<Citation> {
    let (number, year) = pair.split_once('/')?;
    let number: u32 = number.trim().parse().ok()?;
    let year_raw = year.trim();
    let year: u32 = year_raw.parse().ok()?;
    let year = match year_raw.len() {
        2 if year >= 90 => 1900 + year,
        2 => 2000 + year,
        4 => year,
        _ => return None,
    };
    Some(Citation::Gazette { number, year })
}
