//! Wire protocol: JSON request and reply bodies exchanged over HTTP.
//!
//! Every RPC is a `POST` of one request body to a fixed route. Successful replies
//! carry `success: true`; failures reply with a non-2xx status and an
//! [`ErrorBody`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shoal_index::StoredDoc;
use shoal_query::QueryOpt;

use crate::ErrorKind;

/// Liveness probe.
pub const HEALTH: &str = "/health";
/// Creates an index.
pub const INDEX_CREATE: &str = "/rpc/index/create";
/// Runs a search, aggregation or suggestion query.
pub const DOC_QUERY: &str = "/rpc/doc/query";
/// Inserts or replaces a document.
pub const DOC_SYNC: &str = "/rpc/doc/sync";
/// Deletes documents.
pub const DOC_REMOVE: &str = "/rpc/doc/remove";
/// Fetches documents by id.
pub const DOC_GET: &str = "/rpc/doc/get";
/// Adds a suggestion entry.
pub const SUGGEST_ADD: &str = "/rpc/suggest/add";

/// Which engine a query runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocQueryKind {
    /// General search returning hits.
    #[default]
    Gen,
    /// Facet aggregation.
    Agg,
    /// Suggestion lookup.
    Suggest,
}

impl fmt::Display for DocQueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gen => "gen",
            Self::Agg => "agg",
            Self::Suggest => "suggest",
        })
    }
}

/// Body of [`HEALTH`] replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResp {
    /// Always `"ok"`.
    pub status: String,
}

/// Generic acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessResp {
    /// Whether the operation was applied.
    pub success: bool,
}

/// Body of [`INDEX_CREATE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexCreateReq {
    /// Index tag.
    pub tag: String,
}

/// Body of [`DOC_QUERY`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocQueryReq {
    /// Query kind.
    #[serde(default)]
    pub kind: DocQueryKind,
    /// Index tag, or the suggest tag for suggestion queries without one in `opt`.
    pub tag: String,
    /// Query options.
    pub opt: QueryOpt,
}

/// Reply to [`DOC_QUERY`].
///
/// The payload is a `SearchResult`, a list of `AggregateGroup`s or a
/// `SuggestList`, depending on the query kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocQueryResp {
    /// Whether the query ran.
    pub success: bool,
    /// Encoded result.
    pub payload: Value,
}

/// Body of [`DOC_SYNC`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocSyncReq {
    /// Index tag.
    pub tag: String,
    /// Document id.
    pub doc_id: String,
    /// Document body; must be a JSON object.
    pub json: Value,
}

/// Body of [`DOC_REMOVE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocRemoveReq {
    /// Index tag.
    pub tag: String,
    /// Ids to delete.
    pub doc_ids: Vec<String>,
}

/// Body of [`DOC_GET`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocGetReq {
    /// Index tag.
    pub tag: String,
    /// Ids to fetch.
    pub doc_ids: Vec<String>,
    /// Route through the server's worker queue when queued mode is on.
    #[serde(default)]
    pub use_queue: bool,
}

/// Reply to [`DOC_GET`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocGetResp {
    /// Whether the lookup ran.
    pub success: bool,
    /// Documents that exist, in request order.
    pub docs: Vec<StoredDoc>,
}

/// Body of [`SUGGEST_ADD`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestAddReq {
    /// Suggest tag.
    pub tag: String,
    /// Suggestion text.
    pub key: String,
    /// Popularity count.
    pub count: i64,
}

/// Error reply body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
    /// Error category.
    pub kind: ErrorKind,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn query_kind_defaults_to_gen() {
        let req: DocQueryReq = serde_json::from_value(json!({
            "tag": "t1",
            "opt": {"key": "rust"}
        }))
        .unwrap();
        assert_eq!(req.kind, DocQueryKind::Gen);
        assert_eq!(req.opt.key, "rust");
        assert!(req.opt.need_docs);
    }

    #[test]
    fn get_request_queue_flag_is_optional() {
        let req: DocGetReq =
            serde_json::from_value(json!({"tag": "t1", "doc_ids": ["a", "b"]})).unwrap();
        assert!(!req.use_queue);
        assert_eq!(req.doc_ids, vec!["a", "b"]);
    }

    #[test]
    fn error_body_shape() {
        let body = ErrorBody {
            error: "queue is full".into(),
            kind: ErrorKind::QueueFull,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"error": "queue is full", "kind": "queue_full"})
        );
    }
}
