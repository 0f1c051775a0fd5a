//! Query, filter, and result model for shoal search.
//!
//! Callers describe a search with a [`QueryOpt`]: a primary query kind applied to
//! a key, a list of [`Filter`]s placed under must/should/must-not, sort keys,
//! paging, and optional facet requests. The index crate compiles these into engine
//! queries; this crate only holds the model, paging resolution and validation.
//!
//! ```
//! use shoal_query::{Filter, FilterSpec, QueryOpt};
//!
//! let mut opt = QueryOpt::matching("rust");
//! opt.filters.push(Filter::must(FilterSpec::NumericRange {
//!     field: "price".into(),
//!     min: Some(5.0),
//!     max: Some(10.0),
//! }));
//! opt.page = 2;
//! assert!(opt.validate().is_ok());
//! assert_eq!(opt.page().offset, 10);
//! ```

#![warn(missing_docs)]

mod agg;
mod error;
mod filter;
mod opt;
mod result;

pub use agg::{AggSpec, AggregateBucket, AggregateGroup, RangeVal};
pub use error::QueryError;
pub use filter::{Filter, FilterSpec, Occurrence};
pub use opt::{
    DEFAULT_GEO_FIELD, GeoBox, GeoDistance, MAX_OFFSET, MAX_PAGE_SIZE, Page, QueryKind, QueryOpt,
    REC_PER_PAGE, SortField,
};
pub use result::{HitDoc, SearchResult, SuggestEntry, SuggestList, SuggestOpt};
