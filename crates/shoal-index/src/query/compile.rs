//! Query compiler.
//!
//! Compiles a [`QueryOpt`] into one Tantivy query: a primary query selected by
//! kind, wrapped together with the filters in a boolean query when any are
//! present.

use std::ops::Bound;

use chrono::DateTime as ChronoDateTime;
use shoal_config::FieldType;
use shoal_query::{GeoDistance, QueryKind, QueryOpt};
use tantivy::{
    DateTime, Term,
    query::{
        AllQuery, BooleanQuery, EmptyQuery, Occur, PhrasePrefixQuery, PhraseQuery, Query,
        RangeQuery, TermQuery,
    },
    schema::IndexRecordOption,
    tokenizer::TextAnalyzer,
};

use crate::{
    IndexError,
    analyzer::{analyze, build_prefix_analyzer},
    schema::{ALL_FIELD, IndexSchema, MappedField},
};

/// Upper bound on the number of index terms a prefix expands to.
const PREFIX_EXPANSIONS: u32 = 1000;

/// Compiles query options into Tantivy queries for one index.
pub struct QueryCompiler<'a> {
    /// Index schema for field lookups.
    schema: &'a IndexSchema,
    /// Analyzer matching the one used at index time.
    analyzer: TextAnalyzer,
    /// Unstemmed analyzer for prefix companion fields.
    prefix_analyzer: TextAnalyzer,
}

impl<'a> QueryCompiler<'a> {
    /// Creates a compiler for `schema`.
    pub fn new(schema: &'a IndexSchema, analyzer: TextAnalyzer) -> Self {
        Self {
            schema,
            analyzer,
            prefix_analyzer: build_prefix_analyzer(),
        }
    }

    /// Returns the schema queries are compiled against.
    pub fn schema(&self) -> &'a IndexSchema {
        self.schema
    }

    /// Compiles the options into a single query.
    ///
    /// Filters whose term list is empty are dropped rather than widened into a
    /// match-everything clause.
    pub fn compile(&mut self, opt: &QueryOpt) -> Result<Box<dyn Query>, IndexError> {
        opt.validate()?;
        let primary = self.primary(opt)?;
        if opt.filters.is_empty() {
            return Ok(primary);
        }

        let mut clauses = Vec::with_capacity(opt.filters.len() + 1);
        for filter in &opt.filters {
            if let Some(query) = self.filter(&filter.spec)? {
                clauses.push((super::occur(filter.occurrence()), query));
            }
        }
        clauses.push((Occur::Must, primary));
        Ok(Box::new(BooleanQuery::new(clauses)))
    }

    /// Builds the primary query for the options' kind.
    fn primary(&mut self, opt: &QueryOpt) -> Result<Box<dyn Query>, IndexError> {
        let kind = opt.effective_kind();
        let query = match kind {
            QueryKind::MatchAll => Some(Box::new(AllQuery) as Box<dyn Query>),
            QueryKind::Term => {
                let name = opt.fields.first().map_or(ALL_FIELD, String::as_str);
                let mapped = self.resolve(name, "term queries")?;
                Some(self.exact(name, mapped, &opt.key)?)
            }
            QueryKind::MatchQuery => self.across_fields(opt, Self::matching)?,
            QueryKind::Phrase | QueryKind::MatchPhrase => self.across_fields(opt, Self::phrase)?,
            QueryKind::Prefix => self.across_fields(opt, Self::prefix)?,
            QueryKind::GeoDistance => match &opt.geo {
                Some(geo) => Some(self.geo_distance(geo)?),
                None => None,
            },
        };
        Ok(query.unwrap_or_else(|| Box::new(EmptyQuery)))
    }

    /// Applies a per-field builder to every target field and ORs the results.
    fn across_fields(
        &mut self,
        opt: &QueryOpt,
        build: fn(&mut Self, &str, &str) -> Result<Option<Box<dyn Query>>, IndexError>,
    ) -> Result<Option<Box<dyn Query>>, IndexError> {
        let mut queries = Vec::new();
        if opt.fields.is_empty() {
            queries.extend(build(self, ALL_FIELD, &opt.key)?);
        } else {
            for name in &opt.fields {
                queries.extend(build(self, name, &opt.key)?);
            }
        }
        Ok(disjunction(queries))
    }

    /// Analyzed match: any token of `text` in field `name`.
    pub(crate) fn matching(
        &mut self,
        name: &str,
        text: &str,
    ) -> Result<Option<Box<dyn Query>>, IndexError> {
        let mapped = self.resolve(name, "match queries")?;
        if mapped.ty != FieldType::Text {
            return if text.is_empty() {
                Ok(None)
            } else {
                self.exact(name, mapped, text).map(Some)
            };
        }
        let queries = self
            .tokens(mapped, text)
            .into_iter()
            .map(|term| term_query(term, IndexRecordOption::WithFreqs))
            .collect();
        Ok(disjunction(queries))
    }

    /// Phrase of the analyzed tokens; a single token degrades to a term.
    pub(crate) fn phrase(
        &mut self,
        name: &str,
        text: &str,
    ) -> Result<Option<Box<dyn Query>>, IndexError> {
        let mapped = self.resolve(name, "phrase queries")?;
        self.require_textual(name, mapped, "phrase queries")?;
        let mut terms = self.tokens(mapped, text);
        Ok(match terms.len() {
            0 => None,
            1 => terms
                .pop()
                .map(|term| term_query(term, IndexRecordOption::WithFreqs)),
            _ => Some(Box::new(PhraseQuery::new(terms))),
        })
    }

    /// Prefix on the last token, preceded by the others as a phrase.
    ///
    /// Text fields match against their unstemmed companion, so a partial word
    /// such as `runni` still finds `running`.
    pub(crate) fn prefix(
        &mut self,
        name: &str,
        text: &str,
    ) -> Result<Option<Box<dyn Query>>, IndexError> {
        let mapped = self.resolve(name, "prefix queries")?;
        self.require_textual(name, mapped, "prefix queries")?;
        let terms = match self.schema.prefix_field(mapped.field) {
            Some(companion) => analyze(&mut self.prefix_analyzer, text)
                .iter()
                .map(|token| Term::from_field_text(companion, token))
                .collect(),
            None => self.tokens(mapped, text),
        };
        if terms.is_empty() {
            return Ok(None);
        }
        let mut query = PhrasePrefixQuery::new(terms);
        query.set_max_expansions(PREFIX_EXPANSIONS);
        Ok(Some(Box::new(query)))
    }

    /// Points inside the box circumscribing the search radius.
    fn geo_distance(&self, geo: &GeoDistance) -> Result<Box<dyn Query>, IndexError> {
        let fields = self.schema.geo(&geo.field).ok_or_else(|| {
            match self.schema.field(&geo.field) {
                Some(mapped) => IndexError::FieldType {
                    field: geo.field.clone(),
                    actual: mapped.ty,
                    usage: "geo_distance queries",
                },
                None => IndexError::UnknownField(geo.field.clone()),
            }
        })?;
        let bounds = geo.bounding_box();
        let lat = RangeQuery::new_f64_bounds(
            self.schema.name(fields.lat).to_string(),
            Bound::Included(bounds.min_lat),
            Bound::Included(bounds.max_lat),
        );
        let lon = RangeQuery::new_f64_bounds(
            self.schema.name(fields.lon).to_string(),
            Bound::Included(bounds.min_lon),
            Bound::Included(bounds.max_lon),
        );
        Ok(Box::new(BooleanQuery::intersection(vec![
            Box::new(lat),
            Box::new(lon),
        ])))
    }

    /// Exact, unanalyzed term query for `raw` parsed as the field's type.
    pub(super) fn exact(
        &self,
        name: &str,
        mapped: MappedField,
        raw: &str,
    ) -> Result<Box<dyn Query>, IndexError> {
        let term = self.exact_term(name, mapped, raw)?;
        Ok(term_query(term, IndexRecordOption::WithFreqs))
    }

    /// Builds the term for `raw` in the field's value type.
    pub(super) fn exact_term(
        &self,
        name: &str,
        mapped: MappedField,
        raw: &str,
    ) -> Result<Term, IndexError> {
        let field = mapped.field;
        let bad_value = || IndexError::FieldType {
            field: name.to_string(),
            actual: mapped.ty,
            usage: "this term value",
        };
        let trimmed = raw.trim();
        Ok(match mapped.ty {
            FieldType::Text | FieldType::Keyword => Term::from_field_text(field, raw),
            FieldType::F64 => Term::from_field_f64(field, trimmed.parse().map_err(|_| bad_value())?),
            FieldType::I64 => Term::from_field_i64(field, trimmed.parse().map_err(|_| bad_value())?),
            FieldType::Bool => Term::from_field_bool(field, trimmed.parse().map_err(|_| bad_value())?),
            FieldType::Date => {
                let date = ChronoDateTime::parse_from_rfc3339(trimmed).map_err(|_| bad_value())?;
                let micros = DateTime::from_timestamp_micros(date.timestamp_micros());
                Term::from_field_date(field, micros)
            }
            FieldType::Geo => return Err(bad_value()),
        })
    }

    /// Looks up a scalar field, reporting geo fields as a type mismatch.
    pub(super) fn resolve(
        &self,
        name: &str,
        usage: &'static str,
    ) -> Result<MappedField, IndexError> {
        if self.schema.geo(name).is_some() {
            return Err(IndexError::FieldType {
                field: name.to_string(),
                actual: FieldType::Geo,
                usage,
            });
        }
        self.schema.require(name)
    }

    /// Fails unless the field holds text or keywords.
    pub(super) fn require_textual(
        &self,
        name: &str,
        mapped: MappedField,
        usage: &'static str,
    ) -> Result<(), IndexError> {
        match mapped.ty {
            FieldType::Text | FieldType::Keyword => Ok(()),
            actual => Err(IndexError::FieldType {
                field: name.to_string(),
                actual,
                usage,
            }),
        }
    }

    /// Terms for `text` in a textual field: analyzed tokens for text fields, the
    /// whole value for keyword fields.
    fn tokens(&mut self, mapped: MappedField, text: &str) -> Vec<Term> {
        if mapped.ty == FieldType::Keyword {
            if text.is_empty() {
                return Vec::new();
            }
            return vec![Term::from_field_text(mapped.field, text)];
        }
        analyze(&mut self.analyzer, text)
            .iter()
            .map(|token| Term::from_field_text(mapped.field, token))
            .collect()
    }
}

/// Wraps a term in a term query.
pub(super) fn term_query(term: Term, option: IndexRecordOption) -> Box<dyn Query> {
    Box::new(TermQuery::new(term, option))
}

/// ORs queries together. `None` when there is nothing to match.
pub(super) fn disjunction(mut queries: Vec<Box<dyn Query>>) -> Option<Box<dyn Query>> {
    match queries.len() {
        0 => None,
        1 => queries.pop(),
        _ => Some(Box::new(BooleanQuery::union(queries))),
    }
}
