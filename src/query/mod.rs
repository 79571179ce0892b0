//! Query normalization
//!
//! Turns free text into a [`NormalizedQuery`]: keywords, case ids, device
//! identifiers, explicit article references, category tags and the follow-up
//! questions to ask when identifying fields are missing.

mod normalizer;

pub use normalizer::QueryNormalizer;

use crate::citations::Citation;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Default cap on generated follow-up questions
pub const MAX_FOLLOW_UP_QUESTIONS: usize = 4;

/// Inclusive date window; either bound may be open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn is_empty(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

/// Device and subscriber identifiers found in the query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifiers {
    pub device_type: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub imei: Vec<String>,
    pub imsi: Vec<String>,
    pub iccid: Vec<String>,
    pub msisdn: Vec<String>,
}

/// Per-request normalization options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Overrides the normalizer's default jurisdiction
    pub jurisdiction: Option<String>,
    /// Overrides the date range derived from dates in the text
    pub date_range: Option<DateRange>,
    pub max_follow_up_questions: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            jurisdiction: None,
            date_range: None,
            max_follow_up_questions: MAX_FOLLOW_UP_QUESTIONS,
        }
    }
}

/// Structured view of a free-text query, built once per request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedQuery {
    pub raw_text: String,
    pub cleaned_text: String,
    /// Lower-cased, stop-word free, deduplicated, in order of appearance
    pub keywords: Vec<String>,
    pub case_id: Option<String>,
    pub related_case_ids: BTreeSet<String>,
    pub identifiers: Identifiers,
    /// Statute references written out in the query
    pub priority_articles: Vec<Citation>,
    pub categories: BTreeSet<String>,
    pub jurisdiction: String,
    pub date_range: DateRange,
    pub follow_up_questions: Vec<String>,
}

impl NormalizedQuery {
    pub fn is_empty(&self) -> bool {
        self.cleaned_text.is_empty()
    }

    /// Every case id in the query, primary first
    pub fn all_case_ids(&self) -> impl Iterator<Item = &String> {
        self.case_id.iter().chain(self.related_case_ids.iter())
    }
}
