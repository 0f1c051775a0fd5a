//! Error types for the shoal-cluster crate.

use std::fmt;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use shoal_index::IndexError;
use thiserror::Error;

/// Error category, shared by both ends of the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or missing input.
    Validation,
    /// Unknown index tag.
    NotFound,
    /// The resource already exists.
    Conflict,
    /// The index engine failed.
    Engine,
    /// RPC or connection failure.
    Transport,
    /// A fan-out write failed on some nodes.
    PartialReplication,
    /// A bounded queue was saturated.
    QueueFull,
    /// A queue consumer has stopped.
    Closed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Engine => "engine",
            Self::Transport => "transport",
            Self::PartialReplication => "partial_replication",
            Self::QueueFull => "queue_full",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by cluster operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Bad or missing input. Never retried.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The index tag is unknown.
    #[error("{0}")]
    NotFound(String),

    /// The resource already exists.
    #[error("{0}")]
    Conflict(String),

    /// The index engine failed.
    #[error("engine error: {0}")]
    Engine(String),

    /// RPC or connection failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// A fan-out write did not reach every node. Accepted writes are not rolled back.
    #[error("replication failed on {failed} node(s), succeeded on {succeed}")]
    PartialReplication {
        /// Nodes that were inactive or refused the operation.
        failed: usize,
        /// Nodes that accepted the operation.
        succeed: usize,
    },

    /// A bounded queue was saturated.
    #[error("queue is full")]
    QueueFull,

    /// A queue consumer has stopped.
    #[error("queue is closed")]
    Closed,
}

impl ClusterError {
    /// Returns the error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Engine(_) => ErrorKind::Engine,
            Self::Transport(_) => ErrorKind::Transport,
            Self::PartialReplication { .. } => ErrorKind::PartialReplication,
            Self::QueueFull => ErrorKind::QueueFull,
            Self::Closed => ErrorKind::Closed,
        }
    }

    /// Returns the HTTP status this error replies with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::QueueFull | Self::Closed => StatusCode::SERVICE_UNAVAILABLE,
            Self::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Transport(_) | Self::PartialReplication { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Rebuilds an error received over the wire.
    ///
    /// Replication tallies are not carried on the wire, so a remote partial
    /// failure arrives as a transport error with the remote message.
    pub fn from_wire(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::Validation => Self::Validation(message),
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::Conflict => Self::Conflict(message),
            ErrorKind::Engine => Self::Engine(message),
            ErrorKind::Transport | ErrorKind::PartialReplication => Self::Transport(message),
            ErrorKind::QueueFull => Self::QueueFull,
            ErrorKind::Closed => Self::Closed,
        }
    }
}

impl From<IndexError> for ClusterError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::UnknownIndex(_) => Self::NotFound(err.to_string()),
            IndexError::IndexExists(_) => Self::Conflict(err.to_string()),
            IndexError::QueueFull => Self::QueueFull,
            IndexError::Closed => Self::Closed,
            err if err.is_validation() => Self::Validation(err.to_string()),
            err => Self::Engine(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for ClusterError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
