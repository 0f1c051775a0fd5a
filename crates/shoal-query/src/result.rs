//! Search results and suggestion entries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Page, QueryKind, QueryOpt};

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitDoc {
    /// Document id.
    pub id: String,
    /// Relevance score.
    pub score: f32,
    /// Decoded source document, present when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Map<String, Value>>,
    /// Highlight fragment per field.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub highlights: BTreeMap<String, String>,
}

/// A page of search hits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Total matching documents.
    pub total: u64,
    /// Hits on the requested page.
    pub records: Vec<HitDoc>,
}

/// A suggestion key with its popularity count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestEntry {
    /// Suggestion text.
    pub key: String,
    /// Popularity; stored counts never decrease.
    pub count: i64,
}

impl SuggestEntry {
    /// Creates an entry.
    pub fn new(key: impl Into<String>, count: i64) -> Self {
        Self {
            key: key.into(),
            count,
        }
    }
}

/// Suggestion lookup options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestOpt {
    /// Suggest tag to search.
    pub tag: String,
    /// Lookup text.
    pub key: String,
    /// MatchPhrase, Prefix or MatchQuery; other kinds match everything.
    pub query_kind: Option<QueryKind>,
    /// One-based page number.
    pub page: i64,
    /// Entries per page.
    pub page_size: i64,
}

impl SuggestOpt {
    /// Derives suggestion options from general query options.
    pub fn from_query(opt: &QueryOpt) -> Self {
        Self {
            tag: opt.suggest_tag.clone(),
            key: opt.key.clone(),
            query_kind: opt.query_kind,
            page: opt.page,
            page_size: opt.page_size,
        }
    }

    /// Returns the resolved result page.
    pub fn page(&self) -> Page {
        Page::resolve(0, 0, self.page, self.page_size)
    }
}

/// A page of suggestions ordered by count, highest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestList {
    /// Total matching entries.
    pub total: u64,
    /// Entries on the requested page.
    pub list: Vec<SuggestEntry>,
}
