//! One client per peer node.
//!
//! A node client owns a connection to its peer and two background tasks:
//!
//! - a probe task that checks the connection on a fixed interval and reconnects
//!   when the check fails
//! - a consumer task that drains the bounded queue of outbound writes
//!
//! The state moves `Connecting → Active ↔ Inactive`. [`NodeClient::is_active`]
//! reports the result of the last probe only; it does not contact the peer.
//! Writes are accepted once queued, before the peer has applied them.

use std::{
    fmt, mem,
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shoal_config::ClientSettings;
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        watch,
    },
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    ClusterError,
    transport::{Connector, Transport},
};

/// Liveness of a peer as of the last probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// No probe has completed yet.
    Connecting,
    /// The last probe succeeded.
    Active,
    /// The last probe and reconnect attempt failed.
    Inactive,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Inactive => "inactive",
        })
    }
}

/// Timing and capacity for node clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSettings {
    /// Time between health probes.
    pub probe_interval: Duration,
    /// Capacity of each node's outbound queue.
    pub queue_capacity: usize,
}

impl NodeSettings {
    /// Takes node settings from the client configuration.
    pub fn from_client(settings: &ClientSettings) -> Self {
        Self {
            probe_interval: settings.probe_interval(),
            queue_capacity: settings.node_queue_capacity,
        }
    }
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self::from_client(&ClientSettings::default())
    }
}

/// An outbound write.
#[derive(Debug, Clone, PartialEq)]
enum NodeOp {
    /// Insert or replace a document.
    Sync {
        /// Index tag.
        tag: String,
        /// Document id.
        doc_id: String,
        /// Document body.
        json: Value,
    },
    /// Delete documents.
    Remove {
        /// Index tag.
        tag: String,
        /// Ids to delete.
        doc_ids: Vec<String>,
    },
}

/// State shared between the client handle and its tasks.
struct Shared {
    /// Peer address.
    addr: String,
    /// State as of the last probe.
    state: RwLock<NodeState>,
    /// Current connection. Readers clone the handle; reconnects swap it.
    transport: RwLock<Option<Arc<dyn Transport>>>,
    /// Establishes new connections.
    connector: Arc<dyn Connector>,
}

impl Shared {
    /// Current connection state.
    fn state(&self) -> NodeState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a state change, logging transitions.
    fn set_state(&self, next: NodeState) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state != next {
            info!(node = %self.addr, from = %*state, to = %next, "node state changed");
            *state = next;
        }
    }

    /// The live transport, if connected.
    fn current(&self) -> Option<Arc<dyn Transport>> {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swaps the live transport.
    fn replace(&self, transport: Option<Arc<dyn Transport>>) {
        *self.transport.write().unwrap_or_else(PoisonError::into_inner) = transport;
    }

    /// Checks the current connection, reconnecting if it fails.
    async fn probe(&self) {
        if let Some(transport) = self.current() {
            match transport.health().await {
                Ok(()) => {
                    self.set_state(NodeState::Active);
                    return;
                }
                Err(e) => warn!(node = %self.addr, error = %e, "probe failed"),
            }
        }
        match self.connector.connect(&self.addr).await {
            Ok(transport) => {
                self.replace(Some(transport));
                self.set_state(NodeState::Active);
            }
            Err(e) => {
                debug!(node = %self.addr, error = %e, "reconnect failed");
                self.set_state(NodeState::Inactive);
            }
        }
    }

    /// Sends one queued write to the peer.
    async fn apply(&self, op: NodeOp) {
        let Some(transport) = self.current() else {
            warn!(node = %self.addr, "dropping write, node not connected");
            return;
        };
        let (tag, result) = match &op {
            NodeOp::Sync { tag, doc_id, json } => (tag, transport.doc_sync(tag, doc_id, json).await),
            NodeOp::Remove { tag, doc_ids } => (tag, transport.doc_remove(tag, doc_ids).await),
        };
        match result {
            Ok(true) => {}
            Ok(false) => warn!(node = %self.addr, tag = %tag, "peer did not apply write"),
            Err(e) => warn!(node = %self.addr, tag = %tag, error = %e, "replication write failed"),
        }
    }
}

/// Client for one peer node.
pub struct NodeClient {
    /// State shared with the background tasks.
    shared: Arc<Shared>,
    /// Outbound write queue.
    tx: mpsc::Sender<NodeOp>,
    /// Quit signal for the background tasks.
    quit: watch::Sender<bool>,
    /// Background tasks, taken on quit.
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl NodeClient {
    /// Starts a client for `addr`. The first probe runs immediately.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(addr: &str, connector: Arc<dyn Connector>, settings: NodeSettings) -> Self {
        let shared = Arc::new(Shared {
            addr: addr.to_string(),
            state: RwLock::new(NodeState::Connecting),
            transport: RwLock::new(None),
            connector,
        });
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        let (quit, quit_rx) = watch::channel(false);

        let probe = tokio::spawn(run_probe(
            Arc::clone(&shared),
            settings.probe_interval,
            quit_rx.clone(),
        ));
        let consumer = tokio::spawn(run_consumer(Arc::clone(&shared), rx, quit_rx));
        debug!(node = addr, "started node client");

        Self {
            shared,
            tx,
            quit,
            tasks: Mutex::new(vec![probe, consumer]),
        }
    }

    /// Returns the peer address.
    pub fn addr(&self) -> &str {
        &self.shared.addr
    }

    /// Returns the state as of the last probe.
    pub fn state(&self) -> NodeState {
        self.shared.state()
    }

    /// Returns true if the last probe succeeded.
    pub fn is_active(&self) -> bool {
        self.state() == NodeState::Active
    }

    /// Returns the current connection.
    pub fn transport(&self) -> Result<Arc<dyn Transport>, ClusterError> {
        self.shared
            .current()
            .ok_or_else(|| ClusterError::Transport(format!("node {} is not connected", self.addr())))
    }

    /// Queues a document write. Returns once the write is queued.
    pub fn sync(&self, tag: &str, doc_id: &str, json: &Value) -> Result<(), ClusterError> {
        self.submit(NodeOp::Sync {
            tag: tag.to_string(),
            doc_id: doc_id.to_string(),
            json: json.clone(),
        })
    }

    /// Queues a document delete. Returns once the delete is queued.
    pub fn remove(&self, tag: &str, doc_ids: &[String]) -> Result<(), ClusterError> {
        self.submit(NodeOp::Remove {
            tag: tag.to_string(),
            doc_ids: doc_ids.to_vec(),
        })
    }

    /// Queues an operation without waiting.
    fn submit(&self, op: NodeOp) -> Result<(), ClusterError> {
        self.tx.try_send(op).map_err(|e| match e {
            TrySendError::Full(_) => ClusterError::QueueFull,
            TrySendError::Closed(_) => ClusterError::Closed,
        })
    }

    /// Stops the background tasks and closes the connection.
    ///
    /// Writes still queued are sent if the node is active and discarded
    /// otherwise. Calling `quit` again is a no-op.
    pub async fn quit(&self) {
        self.quit.send_replace(true);
        let tasks = mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            if let Err(e) = task.await {
                warn!(node = %self.addr(), error = %e, "node task ended abnormally");
            }
        }
        self.shared.replace(None);
        self.shared.set_state(NodeState::Inactive);
    }
}

/// Probes the node until quit, reconnecting as needed.
async fn run_probe(shared: Arc<Shared>, interval: Duration, mut quit: watch::Receiver<bool>) {
    let mut ticker = time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => shared.probe().await,
            changed = quit.changed() => {
                if changed.is_err() || *quit.borrow() {
                    break;
                }
            }
        }
    }
}

/// Sends queued operations to the node in order.
async fn run_consumer(
    shared: Arc<Shared>,
    mut rx: mpsc::Receiver<NodeOp>,
    mut quit: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            op = rx.recv() => match op {
                Some(op) => shared.apply(op).await,
                None => return,
            },
            changed = quit.changed() => {
                if changed.is_err() || *quit.borrow() {
                    break;
                }
            }
        }
    }

    rx.close();
    let drain = shared.state() == NodeState::Active;
    let mut discarded = 0_usize;
    while let Some(op) = rx.recv().await {
        if drain {
            shared.apply(op).await;
        } else {
            discarded += 1;
        }
    }
    if discarded > 0 {
        warn!(node = %shared.addr, discarded, "discarded queued writes on quit");
    }
}
