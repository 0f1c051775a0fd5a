//! Filter descriptions attached to a query.
//!
//! Each filter kind carries exactly the fields it needs. A [`Filter`] pairs a kind
//! with its occurrence flags, which decide where the compiled sub-query is placed
//! in the surrounding boolean query.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::QueryError;

/// Where a filter's sub-query sits in the boolean container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    /// The clause must match.
    Must,
    /// The clause contributes to scoring and matching when no must clause exists.
    Should,
    /// The clause must not match.
    MustNot,
}

/// One filter kind with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterSpec {
    /// Analyzed match of any of the terms.
    Match {
        /// Target field.
        field: String,
        /// Terms to match; falls back to `val` when empty.
        #[serde(default)]
        terms: Vec<String>,
        /// Scalar value.
        #[serde(default)]
        val: String,
    },
    /// Lexicographic range over raw terms, `[min, max)`.
    MatchRange {
        /// Target field.
        field: String,
        /// Inclusive lower bound.
        #[serde(default)]
        min: Option<String>,
        /// Exclusive upper bound.
        #[serde(default)]
        max: Option<String>,
    },
    /// Phrase match.
    Phrase {
        /// Target field.
        field: String,
        /// Phrase text.
        val: String,
    },
    /// Phrase that must not match, regardless of occurrence flags.
    ExcludePhrase {
        /// Target field.
        field: String,
        /// Phrase text.
        val: String,
    },
    /// Numeric range, `[min, max)`.
    NumericRange {
        /// Target field.
        field: String,
        /// Inclusive lower bound.
        #[serde(default)]
        min: Option<f64>,
        /// Exclusive upper bound.
        #[serde(default)]
        max: Option<f64>,
    },
    /// Date range, `[start, end)`.
    DateRange {
        /// Target field.
        field: String,
        /// Inclusive start.
        #[serde(default)]
        start: Option<DateTime<Utc>>,
        /// Exclusive end.
        #[serde(default)]
        end: Option<DateTime<Utc>>,
    },
    /// Restricts hits to a fixed set of document ids.
    SubDocIds {
        /// Allowed ids.
        doc_ids: Vec<String>,
    },
    /// Prefix match.
    Prefix {
        /// Target field.
        field: String,
        /// Prefix text.
        val: String,
    },
    /// Boolean field equality.
    Boolean {
        /// Target field.
        field: String,
        /// Expected value.
        val: bool,
    },
    /// Exact match of any of the terms.
    TermsQuery {
        /// Target field.
        field: String,
        /// Terms to match; falls back to `val` when empty.
        #[serde(default)]
        terms: Vec<String>,
        /// Scalar value.
        #[serde(default)]
        val: String,
    },
}

impl FilterSpec {
    /// Returns the kind name used in messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Match { .. } => "match",
            Self::MatchRange { .. } => "match_range",
            Self::Phrase { .. } => "phrase",
            Self::ExcludePhrase { .. } => "exclude_phrase",
            Self::NumericRange { .. } => "numeric_range",
            Self::DateRange { .. } => "date_range",
            Self::SubDocIds { .. } => "sub_doc_ids",
            Self::Prefix { .. } => "prefix",
            Self::Boolean { .. } => "boolean",
            Self::TermsQuery { .. } => "terms_query",
        }
    }

    /// Returns the target field, or `None` for id-set filters.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Match { field, .. }
            | Self::MatchRange { field, .. }
            | Self::Phrase { field, .. }
            | Self::ExcludePhrase { field, .. }
            | Self::NumericRange { field, .. }
            | Self::DateRange { field, .. }
            | Self::Prefix { field, .. }
            | Self::Boolean { field, .. }
            | Self::TermsQuery { field, .. } => Some(field),
            Self::SubDocIds { .. } => None,
        }
    }

    /// Returns the terms of a multi-term filter after scalar substitution.
    ///
    /// An empty term list with a non-empty `val` yields `[val]`. Empty strings are
    /// removed, so the result may be empty; callers drop such filters.
    pub fn effective_terms(&self) -> Vec<&str> {
        match self {
            Self::Match { terms, val, .. } | Self::TermsQuery { terms, val, .. } => {
                if terms.is_empty() {
                    if val.is_empty() { vec![] } else { vec![val.as_str()] }
                } else {
                    terms
                        .iter()
                        .map(String::as_str)
                        .filter(|t| !t.is_empty())
                        .collect()
                }
            }
            _ => Vec::new(),
        }
    }
}

/// A filter kind with its occurrence flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// The filter kind and parameters.
    #[serde(flatten)]
    pub spec: FilterSpec,
    /// Place the clause under Must.
    #[serde(default)]
    pub is_must: bool,
    /// Place the clause under MustNot. Takes precedence over `is_must`.
    #[serde(default)]
    pub is_exclude: bool,
}

impl Filter {
    /// A filter that must match.
    pub fn must(spec: FilterSpec) -> Self {
        Self {
            spec,
            is_must: true,
            is_exclude: false,
        }
    }

    /// A filter that should match.
    pub fn should(spec: FilterSpec) -> Self {
        Self {
            spec,
            is_must: false,
            is_exclude: false,
        }
    }

    /// A filter that must not match.
    pub fn exclude(spec: FilterSpec) -> Self {
        Self {
            spec,
            is_must: false,
            is_exclude: true,
        }
    }

    /// Returns where this filter's clause belongs.
    pub fn occurrence(&self) -> Occurrence {
        if self.is_exclude || matches!(self.spec, FilterSpec::ExcludePhrase { .. }) {
            Occurrence::MustNot
        } else if self.is_must {
            Occurrence::Must
        } else {
            Occurrence::Should
        }
    }

    /// Checks that field-scoped filters name a field.
    pub fn validate(&self) -> Result<(), QueryError> {
        match self.spec.field() {
            Some("") => Err(QueryError::EmptyFilterField {
                kind: self.spec.kind_name(),
            }),
            _ => Ok(()),
        }
    }
}
