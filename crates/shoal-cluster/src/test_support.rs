//! In-memory peers for exercising node lifecycle and fan-out without a network.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{Value, json};
use shoal_index::StoredDoc;
use shoal_query::{QueryOpt, SuggestEntry};
use tokio::time::{Instant, sleep};

use crate::{
    ClusterError,
    protocol::DocQueryKind,
    transport::{Connector, Transport},
};

/// A fake peer. Flip `healthy`/`reachable` to simulate failures.
#[derive(Default)]
pub struct MockPeer {
    /// Health checks on an existing connection succeed.
    pub healthy: AtomicBool,
    /// New connections succeed.
    pub reachable: AtomicBool,
    /// Successful connection attempts.
    pub connects: AtomicUsize,
    /// Applied syncs as `(tag, doc_id)`.
    pub synced: Mutex<Vec<(String, String)>>,
    /// Applied removes as `(tag, ids)`.
    pub removed: Mutex<Vec<(String, Vec<String>)>>,
    /// Stored documents by id.
    pub docs: Mutex<HashMap<String, Value>>,
}

impl MockPeer {
    /// A peer that is up.
    pub fn up() -> Arc<Self> {
        let peer = Self::default();
        peer.healthy.store(true, Ordering::SeqCst);
        peer.reachable.store(true, Ordering::SeqCst);
        Arc::new(peer)
    }

    /// A peer that refuses every connection.
    pub fn down() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Takes the peer down or brings it back.
    pub fn set_up(&self, up: bool) {
        self.healthy.store(up, Ordering::SeqCst);
        self.reachable.store(up, Ordering::SeqCst);
    }

    /// Number of applied syncs.
    pub fn sync_count(&self) -> usize {
        self.synced.lock().map(|s| s.len()).unwrap_or_default()
    }
}

/// Transport backed by a [`MockPeer`].
struct MockTransport {
    /// The peer this connection talks to.
    peer: Arc<MockPeer>,
}

impl MockTransport {
    /// Fails when the node is marked down.
    fn check(&self) -> Result<(), ClusterError> {
        if self.peer.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ClusterError::Transport("connection reset".into()))
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn health(&self) -> Result<(), ClusterError> {
        self.check()
    }

    async fn index_create(&self, _tag: &str) -> Result<bool, ClusterError> {
        self.check()?;
        Ok(true)
    }

    async fn doc_query(
        &self,
        _kind: DocQueryKind,
        _tag: &str,
        opt: &QueryOpt,
    ) -> Result<Value, ClusterError> {
        self.check()?;
        let docs = self.peer.docs.lock().map(|d| d.len()).unwrap_or_default();
        Ok(json!({"total": docs, "records": [], "key": opt.key}))
    }

    async fn doc_sync(&self, tag: &str, doc_id: &str, json: &Value) -> Result<bool, ClusterError> {
        self.check()?;
        if let Ok(mut synced) = self.peer.synced.lock() {
            synced.push((tag.to_string(), doc_id.to_string()));
        }
        if let Ok(mut docs) = self.peer.docs.lock() {
            docs.insert(doc_id.to_string(), json.clone());
        }
        Ok(true)
    }

    async fn doc_remove(&self, tag: &str, doc_ids: &[String]) -> Result<bool, ClusterError> {
        self.check()?;
        if let Ok(mut removed) = self.peer.removed.lock() {
            removed.push((tag.to_string(), doc_ids.to_vec()));
        }
        Ok(true)
    }

    async fn doc_get(&self, _tag: &str, doc_ids: &[String]) -> Result<Vec<StoredDoc>, ClusterError> {
        self.check()?;
        let docs = self.peer.docs.lock().map_err(|_| ClusterError::Closed)?;
        Ok(doc_ids
            .iter()
            .filter_map(|id| {
                docs.get(id).and_then(Value::as_object).map(|source| StoredDoc {
                    id: id.clone(),
                    source: source.clone(),
                })
            })
            .collect())
    }

    async fn suggest_add(&self, _tag: &str, _entry: &SuggestEntry) -> Result<bool, ClusterError> {
        self.check()?;
        Ok(true)
    }
}

/// Connector resolving addresses to registered mock peers.
#[derive(Default)]
pub struct MockConnector {
    /// Peers by address.
    peers: Mutex<HashMap<String, Arc<MockPeer>>>,
}

impl MockConnector {
    /// Registers a peer under `addr` and returns it.
    pub fn add(&self, addr: &str, peer: Arc<MockPeer>) -> Arc<MockPeer> {
        if let Ok(mut peers) = self.peers.lock() {
            peers.insert(addr.to_string(), Arc::clone(&peer));
        }
        peer
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, addr: &str) -> Result<Arc<dyn Transport>, ClusterError> {
        let peer = self
            .peers
            .lock()
            .ok()
            .and_then(|peers| peers.get(addr).cloned())
            .ok_or_else(|| ClusterError::Transport(format!("no route to {addr}")))?;
        if !peer.reachable.load(Ordering::SeqCst) {
            return Err(ClusterError::Transport(format!("connection refused: {addr}")));
        }
        peer.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockTransport { peer }))
    }
}

/// Polls `cond` until it holds or `timeout` passes. Returns the final result.
pub async fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(5)).await;
    }
}
