//! Aggregation (facet) requests and results.

use serde::{Deserialize, Serialize};

use crate::{QueryError, opt::REC_PER_PAGE};

/// A numeric sub-range, `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeVal {
    /// Inclusive lower bound.
    pub from: f64,
    /// Exclusive upper bound.
    pub to: f64,
}

/// One facet request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggSpec {
    /// Field to facet on.
    pub field: String,
    /// Maximum term buckets; zero means [`REC_PER_PAGE`].
    #[serde(default)]
    pub size: usize,
    /// Bucket by numeric ranges instead of terms.
    #[serde(default)]
    pub is_numeric: bool,
    /// Ranges for numeric facets.
    #[serde(default)]
    pub numeric_ranges: Vec<RangeVal>,
}

impl AggSpec {
    /// A term facet on `field`.
    pub fn terms(field: impl Into<String>, size: usize) -> Self {
        Self {
            field: field.into(),
            size,
            is_numeric: false,
            numeric_ranges: Vec::new(),
        }
    }

    /// A numeric range facet on `field`.
    pub fn ranges(field: impl Into<String>, ranges: Vec<RangeVal>) -> Self {
        Self {
            field: field.into(),
            size: 0,
            is_numeric: true,
            numeric_ranges: ranges,
        }
    }

    /// Returns the bucket limit, applying the default.
    pub fn effective_size(&self) -> usize {
        if self.size == 0 { REC_PER_PAGE } else { self.size }
    }

    /// Returns the bucket name for a numeric range.
    ///
    /// The name combines the field with the integer part of `from`, so ranges whose
    /// lower bounds share an integer part get the same name.
    pub fn range_name(&self, range: &RangeVal) -> String {
        format!("{}-{}", self.field, range.from.trunc() as i64)
    }

    /// Checks that the spec names a field.
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.field.is_empty() {
            return Err(QueryError::EmptyAggField);
        }
        Ok(())
    }
}

/// One facet bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateBucket {
    /// Term value or range name.
    pub name: String,
    /// Lower bound for range buckets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Upper bound for range buckets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Documents in the bucket.
    pub count: u64,
}

/// Facet results for one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateGroup {
    /// Facet field.
    pub field: String,
    /// Buckets in engine order.
    pub buckets: Vec<AggregateBucket>,
}
