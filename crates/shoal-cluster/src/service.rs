//! The RPC service a node exposes to its peers.
//!
//! [`RpcService`] binds the local index registry and suggestion index to the
//! routes in [`protocol`](crate::protocol). Engine calls are blocking, so every
//! handler runs them on the blocking pool.
//!
//! In queued mode document writes and fetches go to one of N workers instead,
//! each with its own bounded queue. The worker is picked by hashing the first
//! document id, so operations on one id apply in arrival order.
//!
//! [`RpcService::shutdown`] drains the worker queues and the suggestion queue,
//! so work acknowledged before shutdown is applied before the process exits.

use std::{
    mem,
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use axum::{
    Json, Router,
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::Value;
use shoal_config::Config;
use shoal_index::{IndexRegistry, StoredDoc, SuggestIndex, shard_for};
use shoal_query::{QueryOpt, SuggestEntry, SuggestOpt};
use tokio::{
    net::TcpListener,
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    task::{self, JoinHandle},
};
use tracing::{debug, info, warn};

use crate::{
    ClusterError,
    protocol::{
        self, DocGetReq, DocGetResp, DocQueryKind, DocQueryReq, DocQueryResp, DocRemoveReq,
        DocSyncReq, ErrorBody, HealthResp, IndexCreateReq, SuccessResp, SuggestAddReq,
    },
};

/// Local engine operations behind the RPC routes. All calls block.
struct Engine {
    /// Indexes by tag.
    registry: Arc<IndexRegistry>,
    /// Suggestion upserts and lookups.
    suggest: Arc<SuggestIndex>,
}

impl Engine {
    /// Creates a local index. An existing tag is a conflict.
    fn index_create(&self, tag: &str) -> Result<bool, ClusterError> {
        self.registry.create_index(tag)?;
        Ok(true)
    }

    /// Runs a search, aggregation or suggestion lookup.
    fn doc_query(
        &self,
        kind: DocQueryKind,
        tag: &str,
        opt: &QueryOpt,
    ) -> Result<Value, ClusterError> {
        let payload = match kind {
            DocQueryKind::Gen => to_payload(&self.registry.get_index(tag)?.search(opt)?)?,
            DocQueryKind::Agg => to_payload(&self.registry.get_index(tag)?.aggregate(opt)?)?,
            DocQueryKind::Suggest => {
                let mut suggest = SuggestOpt::from_query(opt);
                if suggest.tag.is_empty() {
                    suggest.tag = tag.to_string();
                }
                to_payload(&self.suggest.get_suggest(&suggest)?)?
            }
        };
        Ok(payload)
    }

    /// Indexes one document.
    fn doc_sync(&self, tag: &str, doc_id: &str, json: &Value) -> Result<(), ClusterError> {
        if doc_id.is_empty() {
            return Err(ClusterError::Validation("doc_id must not be empty".into()));
        }
        self.registry.get_index(tag)?.index(doc_id, json)?;
        Ok(())
    }

    /// Deletes documents by id.
    fn doc_remove(&self, tag: &str, doc_ids: &[String]) -> Result<(), ClusterError> {
        self.registry.get_index(tag)?.delete(doc_ids)?;
        Ok(())
    }

    /// Loads stored documents by id.
    fn doc_get(&self, tag: &str, doc_ids: &[String]) -> Result<Vec<StoredDoc>, ClusterError> {
        Ok(self.registry.get_index(tag)?.documents(doc_ids)?)
    }

    /// Queues a suggestion under the dominance rule.
    fn suggest_add(&self, tag: &str, entry: SuggestEntry) -> Result<(), ClusterError> {
        self.suggest.register_suggest(tag)?;
        self.suggest.add_suggest(tag, entry)?;
        Ok(())
    }
}

/// Encodes a result as a JSON payload.
fn to_payload<T: Serialize>(value: &T) -> Result<Value, ClusterError> {
    serde_json::to_value(value).map_err(|e| ClusterError::Engine(format!("encode failed: {e}")))
}

/// Runs a blocking engine call off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, ClusterError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ClusterError> + Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| ClusterError::Engine(format!("engine task failed: {e}")))?
}

/// A document job for the queued mode.
enum Job {
    /// Insert or replace.
    Sync {
        /// Index tag.
        tag: String,
        /// Document id.
        doc_id: String,
        /// Document body.
        json: Value,
        /// Receives the outcome.
        reply: oneshot::Sender<Result<(), ClusterError>>,
    },
    /// Delete.
    Remove {
        /// Index tag.
        tag: String,
        /// Ids to delete.
        doc_ids: Vec<String>,
        /// Receives the outcome.
        reply: oneshot::Sender<Result<(), ClusterError>>,
    },
    /// Fetch.
    Get {
        /// Index tag.
        tag: String,
        /// Ids to fetch.
        doc_ids: Vec<String>,
        /// Receives the documents.
        reply: oneshot::Sender<Result<Vec<StoredDoc>, ClusterError>>,
    },
}

impl Job {
    /// The id that picks the worker.
    fn shard_key(&self) -> &str {
        match self {
            Self::Sync { doc_id, .. } => doc_id.as_str(),
            Self::Remove { doc_ids, .. } | Self::Get { doc_ids, .. } => {
                doc_ids.first().map_or("", String::as_str)
            }
        }
    }

    /// Executes the job, logging failures.
    fn run(self, engine: &Engine) {
        // A dropped receiver means the HTTP caller went away; nothing to report.
        let delivered = match self {
            Self::Sync {
                tag,
                doc_id,
                json,
                reply,
            } => reply.send(engine.doc_sync(&tag, &doc_id, &json)).is_ok(),
            Self::Remove {
                tag,
                doc_ids,
                reply,
            } => reply.send(engine.doc_remove(&tag, &doc_ids)).is_ok(),
            Self::Get {
                tag,
                doc_ids,
                reply,
            } => reply.send(engine.doc_get(&tag, &doc_ids)).is_ok(),
        };
        if !delivered {
            debug!("queued job finished after its caller left");
        }
    }
}

/// Drains one shard queue.
async fn run_queue_worker(id: usize, engine: Arc<Engine>, mut rx: mpsc::Receiver<Job>) {
    while let Some(job) = rx.recv().await {
        let engine = Arc::clone(&engine);
        if let Err(e) = task::spawn_blocking(move || job.run(&engine)).await {
            warn!(worker = id, error = %e, "queued job panicked");
        }
    }
    debug!(worker = id, "queue worker stopped");
}

/// The RPC facade over the local engine.
pub struct RpcService {
    /// Local engine.
    engine: Arc<Engine>,
    /// Whether writes go through the worker queues.
    queued: bool,
    /// Per-worker job queues; emptied by shutdown.
    queues: RwLock<Vec<mpsc::Sender<Job>>>,
    /// Queue worker tasks.
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl RpcService {
    /// Creates a service that runs every call directly.
    pub fn new(registry: Arc<IndexRegistry>, suggest: Arc<SuggestIndex>) -> Self {
        Self {
            engine: Arc::new(Engine { registry, suggest }),
            queued: false,
            queues: RwLock::new(Vec::new()),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Opens the data directory, reopens existing indexes and starts the
    /// suggestion consumer as configured. Queued mode starts its workers, so it
    /// must run inside a Tokio runtime.
    pub fn open(config: &Config) -> Result<Self, ClusterError> {
        let registry = Arc::new(IndexRegistry::new(
            config.server.data_dir.clone(),
            config.mappings.clone(),
            config.search.clone(),
        ));
        let opened = registry.load_existing()?;
        info!(
            data_dir = %config.server.data_dir.display(),
            indexes = opened.len(),
            "opened data directory"
        );
        let suggest = Arc::new(SuggestIndex::start(
            Arc::clone(&registry),
            config.suggest.queue_capacity,
        )?);
        let service = Self::new(registry, suggest);
        Ok(if config.server.queue_mode {
            service.with_queue(config.server.queue_workers, config.server.queue_capacity)
        } else {
            service
        })
    }

    /// Routes writes and fetches through `workers` queued workers.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn with_queue(mut self, workers: usize, capacity: usize) -> Self {
        let (senders, handles) = (0..workers.max(1))
            .map(|id| {
                let (tx, rx) = mpsc::channel(capacity.max(1));
                let handle = tokio::spawn(run_queue_worker(id, Arc::clone(&self.engine), rx));
                (tx, handle)
            })
            .unzip();
        self.queued = true;
        self.queues = RwLock::new(senders);
        self.workers = Mutex::new(handles);
        self
    }

    /// Stops the worker queues, waits for queued jobs to finish and flushes
    /// pending suggestions.
    ///
    /// Call after the server has stopped accepting requests. Queued writes
    /// arriving afterwards fail with [`ClusterError::Closed`].
    pub async fn shutdown(&self) -> Result<(), ClusterError> {
        drop(mem::take(
            &mut *self.queues.write().unwrap_or_else(PoisonError::into_inner),
        ));
        let workers = mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "queue worker failed");
            }
        }

        let suggest = Arc::clone(&self.engine.suggest);
        blocking(move || suggest.flush().map_err(ClusterError::from)).await?;
        info!("rpc service drained");
        Ok(())
    }

    /// Returns the local index registry.
    pub fn registry(&self) -> &Arc<IndexRegistry> {
        &self.engine.registry
    }

    /// Returns the suggestion index.
    pub fn suggest(&self) -> &Arc<SuggestIndex> {
        &self.engine.suggest
    }

    /// Creates an index. Fails with a conflict if the tag exists.
    pub async fn index_create(&self, tag: String) -> Result<bool, ClusterError> {
        let engine = Arc::clone(&self.engine);
        blocking(move || engine.index_create(&tag)).await
    }

    /// Runs a query of the given kind and returns the encoded result.
    pub async fn doc_query(
        &self,
        kind: DocQueryKind,
        tag: String,
        opt: QueryOpt,
    ) -> Result<Value, ClusterError> {
        let engine = Arc::clone(&self.engine);
        blocking(move || engine.doc_query(kind, &tag, &opt)).await
    }

    /// Inserts or replaces a document.
    pub async fn doc_sync(
        &self,
        tag: String,
        doc_id: String,
        json: Value,
    ) -> Result<(), ClusterError> {
        if !self.queued {
            let engine = Arc::clone(&self.engine);
            return blocking(move || engine.doc_sync(&tag, &doc_id, &json)).await;
        }
        self.dispatch(|reply| Job::Sync {
            tag,
            doc_id,
            json,
            reply,
        })
        .await
    }

    /// Deletes documents.
    pub async fn doc_remove(&self, tag: String, doc_ids: Vec<String>) -> Result<(), ClusterError> {
        if !self.queued {
            let engine = Arc::clone(&self.engine);
            return blocking(move || engine.doc_remove(&tag, &doc_ids)).await;
        }
        self.dispatch(|reply| Job::Remove {
            tag,
            doc_ids,
            reply,
        })
        .await
    }

    /// Fetches documents. `use_queue` routes the fetch through the worker
    /// queues when queued mode is on.
    pub async fn doc_get(
        &self,
        tag: String,
        doc_ids: Vec<String>,
        use_queue: bool,
    ) -> Result<Vec<StoredDoc>, ClusterError> {
        if !use_queue || !self.queued {
            let engine = Arc::clone(&self.engine);
            return blocking(move || engine.doc_get(&tag, &doc_ids)).await;
        }
        self.dispatch(|reply| Job::Get {
            tag,
            doc_ids,
            reply,
        })
        .await
    }

    /// Registers the suggest tag if needed and queues the entry.
    pub async fn suggest_add(&self, tag: String, entry: SuggestEntry) -> Result<(), ClusterError> {
        let engine = Arc::clone(&self.engine);
        blocking(move || engine.suggest_add(&tag, entry)).await
    }

    /// Routes a job to its shard queue and awaits the reply.
    async fn dispatch<T>(
        &self,
        job: impl FnOnce(oneshot::Sender<Result<T, ClusterError>>) -> Job,
    ) -> Result<T, ClusterError> {
        let (reply, rx) = oneshot::channel();
        let job = job(reply);
        let queue = {
            let queues = self.queues.read().unwrap_or_else(PoisonError::into_inner);
            let worker = shard_for(job.shard_key(), queues.len());
            queues.get(worker).cloned().ok_or(ClusterError::Closed)?
        };
        queue.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => ClusterError::QueueFull,
            TrySendError::Closed(_) => ClusterError::Closed,
        })?;
        rx.await.map_err(|_| ClusterError::Closed)?
    }
}

impl IntoResponse for ClusterError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
        };
        (status, Json(body)).into_response()
    }
}

/// Builds the router for `service`.
pub fn router(service: Arc<RpcService>) -> Router {
    Router::new()
        .route(protocol::HEALTH, get(health))
        .route(protocol::INDEX_CREATE, post(index_create))
        .route(protocol::DOC_QUERY, post(doc_query))
        .route(protocol::DOC_SYNC, post(doc_sync))
        .route(protocol::DOC_REMOVE, post(doc_remove))
        .route(protocol::DOC_GET, post(doc_get))
        .route(protocol::SUGGEST_ADD, post(suggest_add))
        .with_state(service)
}

/// Serves `service` on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    service: Arc<RpcService>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ClusterError> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "rpc service listening");
    }
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ClusterError::Transport(format!("server failed: {e}")))
}

/// Shared handler state.
type Svc = State<Arc<RpcService>>;

/// Liveness probe.
async fn health() -> Json<HealthResp> {
    Json(HealthResp {
        status: "ok".to_string(),
    })
}

/// POST /index/create
async fn index_create(
    State(svc): Svc,
    Json(req): Json<IndexCreateReq>,
) -> Result<Json<SuccessResp>, ClusterError> {
    let success = svc.index_create(req.tag).await?;
    Ok(Json(SuccessResp { success }))
}

/// POST /doc/query
async fn doc_query(
    State(svc): Svc,
    Json(req): Json<DocQueryReq>,
) -> Result<Json<DocQueryResp>, ClusterError> {
    let payload = svc.doc_query(req.kind, req.tag, req.opt).await?;
    Ok(Json(DocQueryResp {
        success: true,
        payload,
    }))
}

/// POST /doc/sync
async fn doc_sync(
    State(svc): Svc,
    Json(req): Json<DocSyncReq>,
) -> Result<Json<SuccessResp>, ClusterError> {
    svc.doc_sync(req.tag, req.doc_id, req.json).await?;
    Ok(Json(SuccessResp { success: true }))
}

/// POST /doc/remove
async fn doc_remove(
    State(svc): Svc,
    Json(req): Json<DocRemoveReq>,
) -> Result<Json<SuccessResp>, ClusterError> {
    svc.doc_remove(req.tag, req.doc_ids).await?;
    Ok(Json(SuccessResp { success: true }))
}

/// POST /doc/get
async fn doc_get(
    State(svc): Svc,
    Json(req): Json<DocGetReq>,
) -> Result<Json<DocGetResp>, ClusterError> {
    let docs = svc.doc_get(req.tag, req.doc_ids, req.use_queue).await?;
    Ok(Json(DocGetResp {
        success: true,
        docs,
    }))
}

/// POST /suggest/add
async fn suggest_add(
    State(svc): Svc,
    Json(req): Json<SuggestAddReq>,
) -> Result<Json<SuccessResp>, ClusterError> {
    svc.suggest_add(req.tag, SuggestEntry::new(req.key, req.count))
        .await?;
    Ok(Json(SuccessResp { success: true }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;
    use shoal_config::{FieldType, Mappings, SearchSettings};
    use shoal_query::{SearchResult, SuggestList};
    use tempfile::TempDir;

    use super::*;

    fn service(temp: &TempDir) -> RpcService {
        let mappings = Mappings {
            default: [("title".to_string(), FieldType::Text)]
                .into_iter()
                .collect(),
            ..Mappings::default()
        };
        let registry = Arc::new(IndexRegistry::new(
            temp.path(),
            mappings,
            SearchSettings::default(),
        ));
        let suggest = Arc::new(SuggestIndex::start(Arc::clone(&registry), 16).unwrap());
        RpcService::new(registry, suggest)
    }

    #[tokio::test]
    async fn create_conflicts_on_existing_tag() {
        let temp = TempDir::new().unwrap();
        let svc = service(&temp);
        assert!(svc.index_create("t1".into()).await.unwrap());
        let err = svc.index_create("t1".into()).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn sync_then_query_and_get() {
        let temp = TempDir::new().unwrap();
        let svc = service(&temp);
        svc.index_create("t1".into()).await.unwrap();
        svc.doc_sync("t1".into(), "d1".into(), json!({"title": "a"}))
            .await
            .unwrap();

        let payload = svc
            .doc_query(DocQueryKind::Gen, "t1".into(), QueryOpt::matching("a"))
            .await
            .unwrap();
        let result: SearchResult = serde_json::from_value(payload).unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.records[0].id, "d1");

        let docs = svc
            .doc_get("t1".into(), vec!["d1".into(), "nope".into()], false)
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);

        svc.doc_remove("t1".into(), vec!["d1".into()]).await.unwrap();
        let docs = svc
            .doc_get("t1".into(), vec!["d1".into()], false)
            .await
            .unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn writes_to_unknown_tag_are_not_found() {
        let temp = TempDir::new().unwrap();
        let svc = service(&temp);
        let err = svc
            .doc_sync("nope".into(), "d1".into(), json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn queued_mode_applies_in_order() {
        let temp = TempDir::new().unwrap();
        let svc = service(&temp).with_queue(2, 8);
        svc.index_create("t1".into()).await.unwrap();
        for title in ["first", "second"] {
            svc.doc_sync("t1".into(), "d1".into(), json!({"title": title}))
                .await
                .unwrap();
        }
        let docs = svc
            .doc_get("t1".into(), vec!["d1".into()], true)
            .await
            .unwrap();
        assert_eq!(docs[0].source["title"], "second");
    }

    #[tokio::test]
    async fn suggest_add_registers_and_queries() {
        let temp = TempDir::new().unwrap();
        let svc = service(&temp);
        svc.suggest_add("words".into(), SuggestEntry::new("rust", 3))
            .await
            .unwrap();
        svc.suggest().flush().unwrap();

        let opt = QueryOpt {
            suggest_tag: "words".into(),
            ..QueryOpt::default()
        };
        let payload = svc
            .doc_query(DocQueryKind::Suggest, "ignored".into(), opt)
            .await
            .unwrap();
        let list: SuggestList = serde_json::from_value(payload).unwrap();
        assert_eq!(list.list, vec![SuggestEntry::new("rust", 3)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_drains_queued_work_and_suggestions() {
        let temp = TempDir::new().unwrap();
        let svc = service(&temp).with_queue(2, 8);
        svc.index_create("t1".into()).await.unwrap();
        svc.doc_sync("t1".into(), "d1".into(), json!({"title": "kept"}))
            .await
            .unwrap();
        for count in [2, 7] {
            svc.suggest_add("words".into(), SuggestEntry::new("rust", count))
                .await
                .unwrap();
        }

        svc.shutdown().await.unwrap();

        let list = svc
            .suggest()
            .get_suggest(&SuggestOpt {
                tag: "words".into(),
                ..SuggestOpt::default()
            })
            .unwrap();
        assert_eq!(list.list, vec![SuggestEntry::new("rust", 7)]);
        let docs = svc
            .doc_get("t1".into(), vec!["d1".into()], false)
            .await
            .unwrap();
        assert_eq!(docs[0].source["title"], "kept");

        let err = svc
            .doc_sync("t1".into(), "d2".into(), json!({"title": "late"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::Closed), "got {err:?}");
        // A second shutdown has nothing left to drain.
        svc.shutdown().await.unwrap();
    }

    #[test]
    fn error_statuses() {
        assert_eq!(
            ClusterError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ClusterError::QueueFull.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ClusterError::Engine("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
