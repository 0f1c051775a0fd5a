//! Error types for query validation and decoding.

use thiserror::Error;

use crate::{MAX_OFFSET, MAX_PAGE_SIZE, QueryKind};

/// A query description that cannot be compiled.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The query kind needs at least one target field.
    #[error("{kind} query requires a field")]
    MissingField {
        /// The query kind.
        kind: QueryKind,
    },

    /// The query kind needs a non-empty key.
    #[error("{kind} query requires a non-empty key")]
    MissingKey {
        /// The query kind.
        kind: QueryKind,
    },

    /// A geo-distance query was requested without a center and radius.
    #[error("geo_distance query requires lon, lat and distance")]
    MissingGeo,

    /// Geo-distance parameters are out of range.
    #[error("invalid geo_distance parameters: {0}")]
    InvalidGeo(String),

    /// A filter names no field.
    #[error("{kind} filter requires a field")]
    EmptyFilterField {
        /// The filter kind.
        kind: &'static str,
    },

    /// A sort entry names no field.
    #[error("sort field must not be empty")]
    EmptySortField,

    /// The requested page is too large or too deep.
    #[error(
        "page out of range: offset {offset}, size {size} \
         (max offset {MAX_OFFSET}, max size {MAX_PAGE_SIZE})"
    )]
    PageOutOfRange {
        /// Requested offset.
        offset: usize,
        /// Requested page size.
        size: usize,
    },

    /// A query kind name is not recognized.
    #[error("unknown query kind '{0}'")]
    UnknownKind(String),

    /// An aggregation spec names no field.
    #[error("aggregation field must not be empty")]
    EmptyAggField,

    /// The serialized query options could not be decoded.
    #[error("invalid query options: {0}")]
    Decode(#[from] serde_json::Error),
}
