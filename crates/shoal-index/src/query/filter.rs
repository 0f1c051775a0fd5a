//! Sub-queries for individual filters.

use std::ops::Bound;

use chrono::{DateTime as ChronoDateTime, Utc};
use shoal_config::FieldType;
use shoal_query::FilterSpec;
use tantivy::{
    DateTime, Term,
    query::{Query, RangeQuery, TermSetQuery},
    schema::IndexRecordOption,
};

use super::compile::{QueryCompiler, disjunction, term_query};
use crate::IndexError;

#[allow(clippy::multiple_inherent_impl)]
impl QueryCompiler<'_> {
    /// Compiles one filter. `None` means the filter has nothing to match and is
    /// left out of the boolean query.
    pub(super) fn filter(
        &mut self,
        spec: &FilterSpec,
    ) -> Result<Option<Box<dyn Query>>, IndexError> {
        match spec {
            FilterSpec::Match { field, .. } => {
                let mut queries = Vec::new();
                for term in spec.effective_terms() {
                    queries.extend(self.matching(field, term)?);
                }
                Ok(disjunction(queries))
            }
            FilterSpec::TermsQuery { field, .. } => {
                let mapped = self.resolve(field, "terms filters")?;
                let terms = spec
                    .effective_terms()
                    .into_iter()
                    .map(|raw| self.exact_term(field, mapped, raw))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(match terms.len() {
                    0 => None,
                    1 => terms
                        .into_iter()
                        .next()
                        .map(|term| term_query(term, IndexRecordOption::WithFreqs)),
                    _ => Some(Box::new(TermSetQuery::new(terms))),
                })
            }
            FilterSpec::MatchRange { field, min, max } => {
                let mapped = self.resolve(field, "match_range filters")?;
                self.require_textual(field, mapped, "match_range filters")?;
                Ok(Some(Box::new(RangeQuery::new_str_bounds(
                    field.clone(),
                    min.as_deref().map_or(Bound::Unbounded, Bound::Included),
                    max.as_deref().map_or(Bound::Unbounded, Bound::Excluded),
                ))))
            }
            FilterSpec::Phrase { field, val } | FilterSpec::ExcludePhrase { field, val } => {
                self.phrase(field, val)
            }
            FilterSpec::Prefix { field, val } => self.prefix(field, val),
            FilterSpec::NumericRange { field, min, max } => {
                self.numeric_range(field, *min, *max).map(Some)
            }
            FilterSpec::DateRange { field, start, end } => {
                self.date_range(field, *start, *end).map(Some)
            }
            FilterSpec::SubDocIds { doc_ids } => {
                let terms = doc_ids
                    .iter()
                    .map(|id| Term::from_field_text(self.schema().id, id));
                Ok(Some(Box::new(TermSetQuery::new(terms))))
            }
            FilterSpec::Boolean { field, val } => {
                let mapped = self.resolve(field, "boolean filters")?;
                if mapped.ty != FieldType::Bool {
                    return Err(IndexError::FieldType {
                        field: field.clone(),
                        actual: mapped.ty,
                        usage: "boolean filters",
                    });
                }
                Ok(Some(term_query(
                    Term::from_field_bool(mapped.field, *val),
                    IndexRecordOption::Basic,
                )))
            }
        }
    }

    /// `[min, max)` over a numeric field.
    ///
    /// Integer fields round both bounds up: `v >= 5.5` is `v >= 6` and
    /// `v < 9.5` is `v < 10` for integers.
    fn numeric_range(
        &self,
        field: &str,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Result<Box<dyn Query>, IndexError> {
        let mapped = self.resolve(field, "numeric_range filters")?;
        let query = match mapped.ty {
            FieldType::F64 => RangeQuery::new_f64_bounds(
                field.to_string(),
                min.map_or(Bound::Unbounded, Bound::Included),
                max.map_or(Bound::Unbounded, Bound::Excluded),
            ),
            FieldType::I64 => RangeQuery::new_i64_bounds(
                field.to_string(),
                min.map_or(Bound::Unbounded, |v| Bound::Included(ceil_i64(v))),
                max.map_or(Bound::Unbounded, |v| Bound::Excluded(ceil_i64(v))),
            ),
            actual => {
                return Err(IndexError::FieldType {
                    field: field.to_string(),
                    actual,
                    usage: "numeric_range filters",
                });
            }
        };
        Ok(Box::new(query))
    }

    /// `[start, end)` over a date field.
    fn date_range(
        &self,
        field: &str,
        start: Option<ChronoDateTime<Utc>>,
        end: Option<ChronoDateTime<Utc>>,
    ) -> Result<Box<dyn Query>, IndexError> {
        let mapped = self.resolve(field, "date_range filters")?;
        if mapped.ty != FieldType::Date {
            return Err(IndexError::FieldType {
                field: field.to_string(),
                actual: mapped.ty,
                usage: "date_range filters",
            });
        }
        let convert = |date: ChronoDateTime<Utc>| {
            DateTime::from_timestamp_micros(date.timestamp_micros())
        };
        Ok(Box::new(RangeQuery::new_date_bounds(
            field.to_string(),
            start.map_or(Bound::Unbounded, |d| Bound::Included(convert(d))),
            end.map_or(Bound::Unbounded, |d| Bound::Excluded(convert(d))),
        )))
    }
}

/// Rounds up and saturates at the `i64` range.
fn ceil_i64(value: f64) -> i64 {
    let ceiled = value.ceil();
    if ceiled >= i64::MAX as f64 {
        i64::MAX
    } else if ceiled <= i64::MIN as f64 {
        i64::MIN
    } else {
        ceiled as i64
    }
}
