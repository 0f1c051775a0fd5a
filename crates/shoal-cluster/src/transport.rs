//! Transport to a peer node.
//!
//! [`Transport`] is one established connection; [`Connector`] establishes them.
//! Node clients only see these traits, so tests drive the node lifecycle with
//! in-memory implementations. The production pair speaks JSON over HTTP.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use shoal_index::StoredDoc;
use shoal_query::{QueryOpt, SuggestEntry};

use crate::{
    ClusterError, ErrorKind,
    protocol::{
        self, DocGetReq, DocGetResp, DocQueryKind, DocQueryReq, DocQueryResp, DocRemoveReq,
        DocSyncReq, ErrorBody, HealthResp, IndexCreateReq, SuccessResp, SuggestAddReq,
    },
};

/// One connection to a peer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Checks that the peer answers.
    async fn health(&self) -> Result<(), ClusterError>;

    /// Creates an index on the peer.
    async fn index_create(&self, tag: &str) -> Result<bool, ClusterError>;

    /// Runs a query and returns the encoded payload.
    async fn doc_query(
        &self,
        kind: DocQueryKind,
        tag: &str,
        opt: &QueryOpt,
    ) -> Result<Value, ClusterError>;

    /// Inserts or replaces a document.
    async fn doc_sync(&self, tag: &str, doc_id: &str, json: &Value) -> Result<bool, ClusterError>;

    /// Deletes documents.
    async fn doc_remove(&self, tag: &str, doc_ids: &[String]) -> Result<bool, ClusterError>;

    /// Fetches documents.
    async fn doc_get(&self, tag: &str, doc_ids: &[String]) -> Result<Vec<StoredDoc>, ClusterError>;

    /// Adds a suggestion entry.
    async fn suggest_add(&self, tag: &str, entry: &SuggestEntry) -> Result<bool, ClusterError>;
}

/// Establishes transports to peer addresses.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connects to `addr` and verifies the peer answers.
    async fn connect(&self, addr: &str) -> Result<Arc<dyn Transport>, ClusterError>;
}

/// JSON-over-HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// Shared HTTP client.
    client: Client,
    /// Base URL without a trailing slash.
    base: String,
}

impl HttpTransport {
    /// Creates a transport for `addr` (`host:port` or a full URL).
    pub fn new(client: Client, addr: &str) -> Self {
        Self {
            client,
            base: base_url(addr),
        }
    }

    /// Returns the base URL.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Posts a JSON body and decodes the JSON reply.
    async fn post<Req, Resp>(&self, route: &str, body: &Req) -> Result<Resp, ClusterError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}{route}", self.base))
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(decode_error(status, &text));
        }
        response.json().await.map_err(|e| {
            ClusterError::Transport(format!("unreadable reply from {route}: {e}"))
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn health(&self) -> Result<(), ClusterError> {
        let response = self
            .client
            .get(format!("{}{}", self.base, protocol::HEALTH))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ClusterError::Transport(format!(
                "health check returned {}",
                response.status()
            )));
        }
        let health: HealthResp = response.json().await?;
        if health.status == "ok" {
            Ok(())
        } else {
            Err(ClusterError::Transport(format!(
                "peer reports status '{}'",
                health.status
            )))
        }
    }

    async fn index_create(&self, tag: &str) -> Result<bool, ClusterError> {
        let req = IndexCreateReq {
            tag: tag.to_string(),
        };
        let resp: SuccessResp = self.post(protocol::INDEX_CREATE, &req).await?;
        Ok(resp.success)
    }

    async fn doc_query(
        &self,
        kind: DocQueryKind,
        tag: &str,
        opt: &QueryOpt,
    ) -> Result<Value, ClusterError> {
        let req = DocQueryReq {
            kind,
            tag: tag.to_string(),
            opt: opt.clone(),
        };
        let resp: DocQueryResp = self.post(protocol::DOC_QUERY, &req).await?;
        Ok(resp.payload)
    }

    async fn doc_sync(&self, tag: &str, doc_id: &str, json: &Value) -> Result<bool, ClusterError> {
        let req = DocSyncReq {
            tag: tag.to_string(),
            doc_id: doc_id.to_string(),
            json: json.clone(),
        };
        let resp: SuccessResp = self.post(protocol::DOC_SYNC, &req).await?;
        Ok(resp.success)
    }

    async fn doc_remove(&self, tag: &str, doc_ids: &[String]) -> Result<bool, ClusterError> {
        let req = DocRemoveReq {
            tag: tag.to_string(),
            doc_ids: doc_ids.to_vec(),
        };
        let resp: SuccessResp = self.post(protocol::DOC_REMOVE, &req).await?;
        Ok(resp.success)
    }

    async fn doc_get(&self, tag: &str, doc_ids: &[String]) -> Result<Vec<StoredDoc>, ClusterError> {
        let req = DocGetReq {
            tag: tag.to_string(),
            doc_ids: doc_ids.to_vec(),
            use_queue: false,
        };
        let resp: DocGetResp = self.post(protocol::DOC_GET, &req).await?;
        Ok(resp.docs)
    }

    async fn suggest_add(&self, tag: &str, entry: &SuggestEntry) -> Result<bool, ClusterError> {
        let req = SuggestAddReq {
            tag: tag.to_string(),
            key: entry.key.clone(),
            count: entry.count,
        };
        let resp: SuccessResp = self.post(protocol::SUGGEST_ADD, &req).await?;
        Ok(resp.success)
    }
}

/// Connects [`HttpTransport`]s sharing one HTTP client.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    /// Shared HTTP client with the configured timeout.
    client: Client,
}

impl HttpConnector {
    /// Creates a connector whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ClusterError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| ClusterError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(&self, addr: &str) -> Result<Arc<dyn Transport>, ClusterError> {
        let transport = HttpTransport::new(self.client.clone(), addr);
        transport.health().await?;
        Ok(Arc::new(transport))
    }
}

/// Normalizes a peer address into a base URL.
fn base_url(addr: &str) -> String {
    let addr = addr.trim().trim_end_matches('/');
    if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else {
        format!("http://{addr}")
    }
}

/// Maps a non-2xx reply onto an error, preferring the structured body.
fn decode_error(status: StatusCode, body: &str) -> ClusterError {
    if let Ok(err) = serde_json::from_str::<ErrorBody>(body) {
        return ClusterError::from_wire(err.kind, err.error);
    }
    let kind = match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ErrorKind::Validation,
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::CONFLICT => ErrorKind::Conflict,
        StatusCode::SERVICE_UNAVAILABLE => ErrorKind::QueueFull,
        StatusCode::INTERNAL_SERVER_ERROR => ErrorKind::Engine,
        _ => ErrorKind::Transport,
    };
    ClusterError::from_wire(kind, format!("peer returned {status}: {body}"))
}
