//! Tantivy-backed index engine for shoal.
//!
//! This crate is the local half of a shoal node. It handles:
//! - One tantivy index per tag, built from a configured field mapping
//! - Compilation of [`shoal_query::QueryOpt`] into tantivy queries
//! - Search with paging, multi-field sorting and highlighting
//! - Facet aggregation over matching documents
//! - Suggestion indexes with asynchronous, count-dominant upserts
//! - A concurrent tag registry rooted at the data directory
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use shoal_config::{Mappings, SearchSettings};
//! use shoal_index::IndexRegistry;
//! use shoal_query::QueryOpt;
//!
//! let registry = IndexRegistry::new("./data", Mappings::default(), SearchSettings::default());
//! let index = registry.add_index("t1").unwrap();
//! index.index("d1", &json!({"title": "a"})).unwrap();
//!
//! let result = index.search(&QueryOpt::matching("a")).unwrap();
//! assert_eq!(result.total, 1);
//! ```

#![warn(missing_docs)]

mod aggregate;
mod analyzer;
mod document;
mod error;
mod handle;
mod hash;
mod query;
mod registry;
mod schema;
mod search;
mod suggest;

pub use aggregate::Aggregator;
pub use analyzer::{SHOAL_TOKENIZER, build_analyzer, build_analyzer_from_name, parse_language};
pub use document::{StoredDoc, lookup_path};
pub use error::IndexError;
pub use handle::IndexHandle;
pub use hash::{content_id, shard_for};
pub use query::QueryCompiler;
pub use registry::IndexRegistry;
pub use schema::{ALL_FIELD, GeoFields, ID_FIELD, IndexSchema, MappedField, SOURCE_FIELD};
pub use suggest::{SUGGEST_PREFIX, SuggestIndex, suggest_tag};
