//! The caller-facing client and its request workers.
//!
//! Requests go through one shared bounded queue drained by a fixed number of
//! workers. Submission is FIFO, but with more than one worker unrelated
//! requests can complete in any order.
//!
//! Backpressure is split by request type. Writes fail fast with
//! [`ClusterError::QueueFull`] when the queue is saturated. Reads wait for
//! space and then for their reply.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use serde::de::DeserializeOwned;
use serde_json::Value;
use shoal_config::ClientSettings;
use shoal_index::{IndexRegistry, StoredDoc};
use shoal_query::{AggregateGroup, QueryOpt, SearchResult, SuggestEntry, SuggestList};
use tokio::{
    sync::{
        Mutex as AsyncMutex,
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    ClusterError,
    manager::{ReplicationManager, Tally},
    node::NodeSettings,
    protocol::DocQueryKind,
    transport::{Connector, HttpConnector, Transport},
};

/// Reply channel for one request.
type Reply<T> = oneshot::Sender<Result<T, ClusterError>>;

/// A queued request.
enum Request {
    /// Fan-out document write.
    Sync {
        /// Index tag.
        tag: String,
        /// Document id.
        doc_id: String,
        /// Document body.
        json: Value,
        /// Receives the tally.
        reply: Reply<Tally>,
    },
    /// Fan-out delete.
    Remove {
        /// Index tag.
        tag: String,
        /// Ids to delete.
        doc_ids: Vec<String>,
        /// Receives the tally.
        reply: Reply<Tally>,
    },
    /// Document fetch from the first active node.
    Get {
        /// Index tag.
        tag: String,
        /// Ids to fetch.
        doc_ids: Vec<String>,
        /// Receives the documents.
        reply: Reply<Vec<StoredDoc>>,
    },
    /// Query against the first active node.
    Query {
        /// Query flavor.
        kind: DocQueryKind,
        /// Index tag.
        tag: String,
        /// Query options.
        opt: Box<QueryOpt>,
        /// Receives the encoded payload.
        reply: Reply<Value>,
    },
}

impl Request {
    /// Operation name for logs.
    fn name(&self) -> &'static str {
        match self {
            Self::Sync { .. } => "sync",
            Self::Remove { .. } => "remove",
            Self::Get { .. } => "get",
            Self::Query { .. } => "query",
        }
    }
}

/// Fixed pool of workers draining one bounded request queue.
pub struct WorkerPool {
    /// Submission side; taken on quit so workers see the queue close.
    tx: Mutex<Option<mpsc::Sender<Request>>>,
    /// Worker tasks, taken on quit.
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Starts `workers` workers over a queue of `capacity`.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(manager: Arc<ReplicationManager>, workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(AsyncMutex::new(rx));
        let handles = (0..workers.max(1))
            .map(|id| tokio::spawn(run_worker(id, Arc::clone(&manager), Arc::clone(&rx))))
            .collect();
        Self {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
        }
    }

    /// Clones the queue sender, or fails once the pool has quit.
    fn sender(&self) -> Result<mpsc::Sender<Request>, ClusterError> {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ClusterError::Closed)
    }

    /// Queues without waiting.
    fn try_submit(&self, request: Request) -> Result<(), ClusterError> {
        self.sender()?.try_send(request).map_err(|e| match e {
            TrySendError::Full(_) => ClusterError::QueueFull,
            TrySendError::Closed(_) => ClusterError::Closed,
        })
    }

    /// Queues, waiting for space.
    async fn submit(&self, request: Request) -> Result<(), ClusterError> {
        self.sender()?
            .send(request)
            .await
            .map_err(|_| ClusterError::Closed)
    }

    /// Closes the queue and waits for the workers to finish what is queued.
    pub async fn quit(&self) {
        drop(self.tx.lock().unwrap_or_else(PoisonError::into_inner).take());
        let workers = {
            let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            workers.drain(..).collect::<Vec<_>>()
        };
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "request worker ended abnormally");
            }
        }
    }
}

/// Serves requests from the shared queue until it closes.
async fn run_worker(
    id: usize,
    manager: Arc<ReplicationManager>,
    rx: Arc<AsyncMutex<mpsc::Receiver<Request>>>,
) {
    loop {
        // Only the dequeue holds the lock; handling runs concurrently.
        let Some(request) = rx.lock().await.recv().await else {
            break;
        };
        let name = request.name();
        if !handle(&manager, request).await {
            warn!(worker = id, request = name, "caller went away before the reply");
        }
    }
    debug!(worker = id, "request worker stopped");
}

/// Handles one request. Returns false if the caller dropped its reply channel.
async fn handle(manager: &ReplicationManager, request: Request) -> bool {
    match request {
        Request::Sync {
            tag,
            doc_id,
            json,
            reply,
        } => reply.send(manager.doc_sync(&tag, &doc_id, &json)).is_ok(),
        Request::Remove {
            tag,
            doc_ids,
            reply,
        } => reply.send(manager.doc_remove(&tag, &doc_ids)).is_ok(),
        Request::Get {
            tag,
            doc_ids,
            reply,
        } => {
            let result = match active_transport(manager) {
                Ok(transport) => transport.doc_get(&tag, &doc_ids).await,
                Err(e) => Err(e),
            };
            log_failure("get", &tag, &result);
            reply.send(result).is_ok()
        }
        Request::Query {
            kind,
            tag,
            opt,
            reply,
        } => {
            let result = match active_transport(manager) {
                Ok(transport) => transport.doc_query(kind, &tag, &opt).await,
                Err(e) => Err(e),
            };
            log_failure("query", &tag, &result);
            reply.send(result).is_ok()
        }
    }
}

/// Transport of the first active node.
fn active_transport(
    manager: &ReplicationManager,
) -> Result<Arc<dyn Transport>, ClusterError> {
    manager
        .first_active()
        .ok_or_else(|| ClusterError::Transport("no active node".to_string()))?
        .transport()
}

/// Logs a failed request.
fn log_failure<T>(op: &str, tag: &str, result: &Result<T, ClusterError>) {
    if let Err(e) = result {
        warn!(op, tag, error = %e, "request failed");
    }
}

/// Client for a set of peer nodes.
///
/// Writes fan out to every active node and are acknowledged once queued on
/// each. Reads go to the first active node in address order; there is no
/// read-your-writes guarantee across nodes.
pub struct Client {
    /// Peers and fan-out.
    manager: Arc<ReplicationManager>,
    /// Request workers.
    pool: WorkerPool,
}

impl Client {
    /// Creates a client over `manager`.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(manager: Arc<ReplicationManager>, settings: &ClientSettings) -> Self {
        let pool = WorkerPool::start(
            Arc::clone(&manager),
            settings.request_workers,
            settings.request_capacity,
        );
        Self { manager, pool }
    }

    /// Creates a client using `connector` and registers every configured node.
    pub fn with_connector(
        registry: Arc<IndexRegistry>,
        connector: Arc<dyn Connector>,
        settings: &ClientSettings,
    ) -> Self {
        let manager = Arc::new(ReplicationManager::new(
            registry,
            connector,
            NodeSettings::from_client(settings),
        ));
        for addr in &settings.nodes {
            manager.add_node(addr);
        }
        Self::new(manager, settings)
    }

    /// Creates an HTTP client and registers every configured node.
    pub fn connect(
        registry: Arc<IndexRegistry>,
        settings: &ClientSettings,
    ) -> Result<Self, ClusterError> {
        let connector = HttpConnector::new(settings.rpc_timeout())?;
        Ok(Self::with_connector(registry, Arc::new(connector), settings))
    }

    /// Returns the replication manager for direct fan-out and node control.
    pub fn manager(&self) -> &Arc<ReplicationManager> {
        &self.manager
    }

    /// Waits until every node has completed a probe.
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        self.manager.wait_probed(timeout).await
    }

    /// Creates an index on every active node.
    pub async fn create_index(&self, tag: &str) -> Result<Tally, ClusterError> {
        self.manager.create_index_on_nodes(tag).await
    }

    /// Replicates a document write. Fails fast when the request queue is full.
    pub async fn sync(&self, tag: &str, doc_id: &str, json: Value) -> Result<Tally, ClusterError> {
        let (reply, rx) = oneshot::channel();
        self.pool.try_submit(Request::Sync {
            tag: tag.to_string(),
            doc_id: doc_id.to_string(),
            json,
            reply,
        })?;
        rx.await.map_err(|_| ClusterError::Closed)?
    }

    /// Replicates a delete. Fails fast when the request queue is full.
    pub async fn remove(&self, tag: &str, doc_ids: &[String]) -> Result<Tally, ClusterError> {
        let (reply, rx) = oneshot::channel();
        self.pool.try_submit(Request::Remove {
            tag: tag.to_string(),
            doc_ids: doc_ids.to_vec(),
            reply,
        })?;
        rx.await.map_err(|_| ClusterError::Closed)?
    }

    /// Fetches documents by id from the first active node.
    pub async fn get(&self, tag: &str, doc_ids: &[String]) -> Result<Vec<StoredDoc>, ClusterError> {
        let (reply, rx) = oneshot::channel();
        self.pool
            .submit(Request::Get {
                tag: tag.to_string(),
                doc_ids: doc_ids.to_vec(),
                reply,
            })
            .await?;
        rx.await.map_err(|_| ClusterError::Closed)?
    }

    /// Runs a search on the first active node.
    pub async fn query(&self, tag: &str, opt: &QueryOpt) -> Result<SearchResult, ClusterError> {
        self.query_as(DocQueryKind::Gen, tag, opt).await
    }

    /// Runs an aggregation on the first active node.
    pub async fn aggregate(
        &self,
        tag: &str,
        opt: &QueryOpt,
    ) -> Result<Vec<AggregateGroup>, ClusterError> {
        self.query_as(DocQueryKind::Agg, tag, opt).await
    }

    /// Looks up suggestions on the first active node. The suggest tag is
    /// `opt.suggest_tag`, or `tag` when that is empty.
    pub async fn suggest(&self, tag: &str, opt: &QueryOpt) -> Result<SuggestList, ClusterError> {
        self.query_as(DocQueryKind::Suggest, tag, opt).await
    }

    /// Sends a suggestion entry to every active node.
    pub async fn add_suggest(&self, tag: &str, entry: &SuggestEntry) -> Result<Tally, ClusterError> {
        self.manager.suggest_add_on_nodes(tag, entry).await
    }

    /// Runs a query and decodes its payload.
    async fn query_as<T: DeserializeOwned>(
        &self,
        kind: DocQueryKind,
        tag: &str,
        opt: &QueryOpt,
    ) -> Result<T, ClusterError> {
        let (reply, rx) = oneshot::channel();
        self.pool
            .submit(Request::Query {
                kind,
                tag: tag.to_string(),
                opt: Box::new(opt.clone()),
                reply,
            })
            .await?;
        let payload = rx.await.map_err(|_| ClusterError::Closed)??;
        serde_json::from_value(payload)
            .map_err(|e| ClusterError::Transport(format!("unreadable {kind} payload: {e}")))
    }

    /// Stops the workers, then every node client.
    pub async fn quit(&self) {
        self.pool.quit().await;
        self.manager.quit().await;
    }
}
