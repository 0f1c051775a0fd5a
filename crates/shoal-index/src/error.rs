//! Error types for the shoal-index crate.

use std::{io, path::PathBuf};

use shoal_config::FieldType;
use shoal_query::QueryError;
use thiserror::Error;

/// Errors that can occur when working with an index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Failed to open or create the index.
    #[error("failed to open index at {path}: {message}")]
    OpenIndex {
        /// Path to the index directory.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Failed to write to the index.
    #[error("failed to write to index: {0}")]
    Write(String),

    /// Failed to commit changes to the index.
    #[error("failed to commit index: {0}")]
    Commit(String),

    /// Query execution failed inside the engine.
    #[error("search failed: {0}")]
    Search(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid stemmer language.
    #[error("unsupported stemmer language: {0}")]
    InvalidLanguage(String),

    /// The query description failed validation.
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] QueryError),

    /// A query or aggregation named a field the index does not map.
    #[error("unknown field '{0}'")]
    UnknownField(String),

    /// A field was used in a way its mapped type does not support.
    #[error("field '{field}' is mapped as {actual}, which does not support {usage}")]
    FieldType {
        /// Field name.
        field: String,
        /// Mapped type of the field.
        actual: FieldType,
        /// What the caller tried to do with it.
        usage: &'static str,
    },

    /// An aggregation request is malformed.
    #[error("invalid aggregation: {0}")]
    InvalidAggregation(String),

    /// A document payload could not be indexed.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// No index is registered under the tag.
    #[error("can't get index by tag '{0}'")]
    UnknownIndex(String),

    /// An index is already registered under the tag.
    #[error("index '{0}' already exists")]
    IndexExists(String),

    /// The tag cannot name an index directory.
    #[error("invalid index tag '{0}'")]
    InvalidTag(String),

    /// A bounded queue refused the operation.
    #[error("queue is full")]
    QueueFull,

    /// The queue consumer has stopped.
    #[error("queue is closed")]
    Closed,
}

impl IndexError {
    /// Creates an `OpenIndex` error from a path and Tantivy error.
    pub(crate) fn open_index(path: PathBuf, source: &tantivy::TantivyError) -> Self {
        Self::OpenIndex {
            path,
            message: source.to_string(),
        }
    }

    /// Creates a `Write` error from a Tantivy error.
    pub(crate) fn write(source: &tantivy::TantivyError) -> Self {
        Self::Write(source.to_string())
    }

    /// Creates a `Commit` error from a Tantivy error.
    pub(crate) fn commit(source: &tantivy::TantivyError) -> Self {
        Self::Commit(source.to_string())
    }

    /// Creates a `Search` error from a Tantivy error.
    pub(crate) fn search(source: &tantivy::TantivyError) -> Self {
        Self::Search(source.to_string())
    }

    /// Returns true if the error was caused by bad caller input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidQuery(_)
                | Self::UnknownField(_)
                | Self::FieldType { .. }
                | Self::InvalidAggregation(_)
                | Self::InvalidDocument(_)
                | Self::InvalidLanguage(_)
                | Self::InvalidTag(_)
        )
    }
}
