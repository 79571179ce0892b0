//! Legal citation model and detection
//!
//! Citations are structured references found in free text: statute articles,
//! official gazette (Narodne novine) issues, case numbers, ECLI identifiers,
//! dates and court names. Each carries a canonical key used for deduplication,
//! so "čl. 5" and "članak 5." collapse to one citation.

mod detector;

pub use detector::CitationDetector;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Discriminant of [`Citation`], used as the grouping key of detection results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationKind {
    Statute,
    Gazette,
    CaseNumber,
    Ecli,
    Date,
    CourtType,
}

/// Structured legal reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Citation {
    Statute {
        law: Option<String>,
        article: u32,
        paragraph: Option<u32>,
        item: Option<u32>,
    },
    Gazette {
        number: u32,
        year: u32,
    },
    CaseNumber {
        prefix: String,
        number: u32,
        year: u32,
    },
    Ecli {
        value: String,
    },
    Date {
        value: String,
    },
    CourtType {
        name: String,
    },
}

impl Citation {
    pub fn kind(&self) -> CitationKind {
        match self {
            Citation::Statute { .. } => CitationKind::Statute,
            Citation::Gazette { .. } => CitationKind::Gazette,
            Citation::CaseNumber { .. } => CitationKind::CaseNumber,
            Citation::Ecli { .. } => CitationKind::Ecli,
            Citation::Date { .. } => CitationKind::Date,
            Citation::CourtType { .. } => CitationKind::CourtType,
        }
    }

    /// Canonical key; two citations are the same reference iff their keys match
    pub fn canonical(&self) -> String {
        match self {
            Citation::Statute {
                law,
                article,
                paragraph,
                item,
            } => format!(
                "statute:{}:{}:{}:{}",
                law.as_deref().unwrap_or("-").to_lowercase(),
                article,
                opt_num(*paragraph),
                opt_num(*item)
            ),
            Citation::Gazette { number, year } => format!("nn:{}/{}", number, year),
            Citation::CaseNumber {
                prefix,
                number,
                year,
            } => format!("case:{}:{}/{}", prefix.to_lowercase(), number, year),
            Citation::Ecli { value } => format!("ecli:{}", value.to_uppercase()),
            Citation::Date { value } => format!("date:{}", value),
            Citation::CourtType { name } => format!("court:{}", name.to_lowercase()),
        }
    }

    /// Value handed to the citation graph for gazette and case-number lookups
    pub fn lookup_key(&self) -> Option<String> {
        match self {
            Citation::Gazette { number, year } => Some(format!("{}/{}", number, year)),
            Citation::CaseNumber { .. } => Some(self.to_string()),
            _ => None,
        }
    }
}

fn opt_num(n: Option<u32>) -> String {
    n.map_or_else(|| "-".to_string(), |n| n.to_string())
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Citation::Statute {
                law,
                article,
                paragraph,
                item,
            } => {
                write!(f, "čl. {}.", article)?;
                if let Some(p) = paragraph {
                    write!(f, " st. {}.", p)?;
                }
                if let Some(i) = item {
                    write!(f, " t. {}.", i)?;
                }
                if let Some(law) = law {
                    write!(f, " {}", law)?;
                }
                Ok(())
            }
            Citation::Gazette { number, year } => write!(f, "NN {}/{}", number, year),
            Citation::CaseNumber {
                prefix,
                number,
                year,
            } => write!(f, "{}-{}/{}", prefix, number, year),
            Citation::Ecli { value } => write!(f, "{}", value),
            Citation::Date { value } => write!(f, "{}", value),
            Citation::CourtType { name } => write!(f, "{}", name),
        }
    }
}

/// Citations grouped by kind, each group in order of first appearance
pub type CitationMap = BTreeMap<CitationKind, Vec<Citation>>;

/// Flat summary of the citations found in a text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CitationExtract {
    pub laws: Vec<String>,
    pub articles: Vec<String>,
    pub case_numbers: Vec<String>,
    pub court_types: Vec<String>,
    pub legal_terms: Vec<String>,
    pub nn_references: Vec<String>,
    pub dates: Vec<String>,
    /// A statute, gazette or case-number citation is present
    pub has_specific_refs: bool,
}

/// Everything citation detection produced for one text
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectedCitations {
    pub citations: CitationMap,
    pub extract: CitationExtract,
}

impl DetectedCitations {
    pub fn of_kind(&self, kind: CitationKind) -> &[Citation] {
        self.citations.get(&kind).map_or(&[], |v| v.as_slice())
    }

    pub fn has_specific_refs(&self) -> bool {
        self.extract.has_specific_refs
    }

    /// Gazette and case-number citations, the ones the citation graph can resolve
    pub fn graph_lookups(&self) -> impl Iterator<Item = &Citation> {
        self.of_kind(CitationKind::Gazette)
            .iter()
            .chain(self.of_kind(CitationKind::CaseNumber))
    }
}
