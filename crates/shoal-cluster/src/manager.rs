//! Fan-out replication across peer nodes.
//!
//! The manager owns the local index registry and one [`NodeClient`] per peer.
//! Writes are offered to every registered node independently:
//!
//! - there is no quorum and no coordinator
//! - a write accepted by some nodes is never rolled back when others fail
//! - nodes apply their queues independently, so there is no read-your-writes
//!   guarantee and no ordering across nodes
//!
//! A write "succeeds" on a node once it is accepted into that node's queue.

use std::{
    collections::BTreeMap,
    mem,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shoal_index::{IndexHandle, IndexRegistry};
use shoal_query::SuggestEntry;
use tokio::{
    task::JoinSet,
    time::{Instant, sleep},
};
use tracing::{info, warn};

use crate::{
    ClusterError,
    node::{NodeClient, NodeSettings, NodeState},
    transport::{Connector, Transport},
};

/// Per-node outcome counts of a fan-out operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    /// Nodes that accepted the operation.
    pub succeed: usize,
    /// Nodes that were inactive or refused it.
    pub failed: usize,
}

impl Tally {
    /// Converts the tally into an error when any node failed.
    pub fn into_result(self) -> Result<Self, ClusterError> {
        if self.failed > 0 {
            Err(ClusterError::PartialReplication {
                failed: self.failed,
                succeed: self.succeed,
            })
        } else {
            Ok(self)
        }
    }

    /// Counts one node outcome.
    fn record<T, E>(&mut self, result: &Result<T, E>) {
        if result.is_ok() {
            self.succeed += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// A snapshot of one registered node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Peer address.
    pub addr: String,
    /// State as of the last probe.
    pub state: NodeState,
}

/// Owner of the index registry and the peer set.
pub struct ReplicationManager {
    /// Local indexes by tag.
    registry: Arc<IndexRegistry>,
    /// Peers by address, in address order.
    nodes: RwLock<BTreeMap<String, Arc<NodeClient>>>,
    /// Establishes peer connections.
    connector: Arc<dyn Connector>,
    /// Settings for new node clients.
    settings: NodeSettings,
}

impl ReplicationManager {
    /// Creates a manager with no peers.
    pub fn new(
        registry: Arc<IndexRegistry>,
        connector: Arc<dyn Connector>,
        settings: NodeSettings,
    ) -> Self {
        Self {
            registry,
            nodes: RwLock::new(BTreeMap::new()),
            connector,
            settings,
        }
    }

    /// Returns the local index registry.
    pub fn registry(&self) -> &Arc<IndexRegistry> {
        &self.registry
    }

    /// Opens or creates a local index. Succeeds if the tag already exists.
    pub fn add_index(&self, tag: &str) -> Result<Arc<IndexHandle>, ClusterError> {
        Ok(self.registry.add_index(tag)?)
    }

    /// Returns a local index.
    pub fn get_index(&self, tag: &str) -> Result<Arc<IndexHandle>, ClusterError> {
        Ok(self.registry.get_index(tag)?)
    }

    /// Closes a local index, leaving its directory on disk.
    pub fn remove_index(&self, tag: &str) -> bool {
        self.registry.remove_index(tag)
    }

    /// Registers and starts a client for `addr`. Returns false if the address
    /// was already registered.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn add_node(&self, addr: &str) -> bool {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        if nodes.contains_key(addr) {
            return false;
        }
        let node = NodeClient::start(addr, Arc::clone(&self.connector), self.settings);
        nodes.insert(addr.to_string(), Arc::new(node));
        info!(node = addr, "added node");
        true
    }

    /// Unregisters `addr` and stops its client. Returns false if it was unknown.
    pub async fn remove_node(&self, addr: &str) -> bool {
        let removed = self
            .nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(addr);
        match removed {
            Some(node) => {
                node.quit().await;
                info!(node = addr, "removed node");
                true
            }
            None => false,
        }
    }

    /// Returns every registered node with its state, in address order.
    pub fn nodes(&self) -> Vec<NodeInfo> {
        self.snapshot()
            .iter()
            .map(|node| NodeInfo {
                addr: node.addr().to_string(),
                state: node.state(),
            })
            .collect()
    }

    /// Returns the first active node in address order.
    pub fn first_active(&self) -> Option<Arc<NodeClient>> {
        self.snapshot().into_iter().find(|node| node.is_active())
    }

    /// Waits until no node is still waiting for its first probe. Returns false
    /// on timeout.
    pub async fn wait_probed(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let pending = self
                .snapshot()
                .iter()
                .any(|node| node.state() == NodeState::Connecting);
            if !pending {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(Duration::from_millis(10)).await;
        }
    }

    /// Offers a document write to every node.
    ///
    /// Inactive nodes count as failed. Any failure surfaces as
    /// [`ClusterError::PartialReplication`] with the counts.
    pub fn doc_sync(&self, tag: &str, doc_id: &str, json: &Value) -> Result<Tally, ClusterError> {
        require("tag", tag)?;
        require("doc_id", doc_id)?;
        if !json.is_object() {
            return Err(ClusterError::Validation(
                "document must be a JSON object".to_string(),
            ));
        }
        self.fan_out("sync", tag, |node| node.sync(tag, doc_id, json))
    }

    /// Offers a delete to every node. See [`doc_sync`](Self::doc_sync).
    pub fn doc_remove(&self, tag: &str, doc_ids: &[String]) -> Result<Tally, ClusterError> {
        require("tag", tag)?;
        if doc_ids.is_empty() || doc_ids.iter().any(String::is_empty) {
            return Err(ClusterError::Validation(
                "doc_ids must be non-empty ids".to_string(),
            ));
        }
        self.fan_out("remove", tag, |node| node.remove(tag, doc_ids))
    }

    /// Creates an index on every active node concurrently.
    ///
    /// A node that already has the index counts as a success.
    pub async fn create_index_on_nodes(&self, tag: &str) -> Result<Tally, ClusterError> {
        require("tag", tag)?;
        let owned = tag.to_string();
        self.call_active("index_create", tag, move |transport| {
            let tag = owned.clone();
            async move {
                match transport.index_create(&tag).await {
                    Ok(_) | Err(ClusterError::Conflict(_)) => Ok(()),
                    Err(e) => Err(e),
                }
            }
        })
        .await
    }

    /// Sends a suggestion entry to every active node concurrently.
    pub async fn suggest_add_on_nodes(
        &self,
        tag: &str,
        entry: &SuggestEntry,
    ) -> Result<Tally, ClusterError> {
        require("tag", tag)?;
        require("key", &entry.key)?;
        let owned = (tag.to_string(), entry.clone());
        self.call_active("suggest_add", tag, move |transport| {
            let (tag, entry) = owned.clone();
            async move { transport.suggest_add(&tag, &entry).await.map(drop) }
        })
        .await
    }

    /// Stops every node client.
    pub async fn quit(&self) {
        let nodes: Vec<_> = {
            let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
            mem::take(&mut *nodes).into_values().collect()
        };
        for node in nodes {
            node.quit().await;
        }
    }

    /// Runs `call` against every active node concurrently and tallies the results.
    async fn call_active<F, Fut>(&self, op: &str, tag: &str, call: F) -> Result<Tally, ClusterError>
    where
        F: Fn(Arc<dyn Transport>) -> Fut,
        Fut: Future<Output = Result<(), ClusterError>> + Send + 'static,
    {
        let nodes = self.snapshot();
        if nodes.is_empty() {
            return Err(ClusterError::Transport("no nodes registered".to_string()));
        }

        let mut tally = Tally::default();
        let mut calls = JoinSet::new();
        for node in nodes {
            let transport = match node.transport() {
                Ok(transport) if node.is_active() => transport,
                _ => {
                    tally.failed += 1;
                    continue;
                }
            };
            let addr = node.addr().to_string();
            let fut = call(transport);
            calls.spawn(async move { (addr, fut.await) });
        }
        while let Some(joined) = calls.join_next().await {
            match joined {
                Ok((addr, result)) => {
                    if let Err(e) = &result {
                        warn!(node = %addr, op, tag, error = %e, "node call failed");
                    }
                    tally.record(&result);
                }
                Err(e) => {
                    warn!(op, tag, error = %e, "node call task failed");
                    tally.failed += 1;
                }
            }
        }
        log_tally(op, tag, tally);
        tally.into_result()
    }

    /// Clones the current node list.
    fn snapshot(&self) -> Vec<Arc<NodeClient>> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Submits a write to every active node queue.
    fn fan_out(
        &self,
        op: &str,
        tag: &str,
        submit: impl Fn(&NodeClient) -> Result<(), ClusterError>,
    ) -> Result<Tally, ClusterError> {
        let nodes = self.snapshot();
        if nodes.is_empty() {
            return Err(ClusterError::Transport("no nodes registered".to_string()));
        }
        let mut tally = Tally::default();
        for node in nodes {
            if !node.is_active() {
                tally.failed += 1;
                continue;
            }
            let result = submit(&node);
            if let Err(e) = &result {
                warn!(node = node.addr(), op, tag, error = %e, "write not queued");
            }
            tally.record(&result);
        }
        log_tally(op, tag, tally);
        tally.into_result()
    }
}

/// Rejects an empty identifier.
fn require(name: &str, value: &str) -> Result<(), ClusterError> {
    if value.is_empty() {
        Err(ClusterError::Validation(format!("{name} must not be empty")))
    } else {
        Ok(())
    }
}

/// Warns when some nodes missed a write.
fn log_tally(op: &str, tag: &str, tally: Tally) {
    if tally.failed > 0 {
        warn!(
            op,
            tag,
            failed = tally.failed,
            succeed = tally.succeed,
            "partial replication"
        );
    }
}
