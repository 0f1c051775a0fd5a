//! Peer replication and RPC for shoal.
//!
//! A shoal deployment is a set of nodes, each serving its local indexes through
//! [`RpcService`]. A [`Client`] keeps one [`NodeClient`] per peer and replicates
//! writes to all of them.
//!
//! # Consistency
//!
//! Replication is fire-and-forget fan-out:
//! - a write is acknowledged once it is queued on each active node
//! - inactive nodes count as failures and are reported, never retried
//! - writes accepted by some nodes are never rolled back
//! - each node drains its own queue, so nodes converge in no particular order
//!
//! Reads go to the first active node and may not observe recent writes.
//!
//! # Example
//!
//! ```no_run
//! # async fn run() -> Result<(), shoal_cluster::ClusterError> {
//! use std::{sync::Arc, time::Duration};
//!
//! use serde_json::json;
//! use shoal_cluster::Client;
//! use shoal_config::{ClientSettings, Mappings, SearchSettings};
//! use shoal_index::IndexRegistry;
//! use shoal_query::QueryOpt;
//!
//! let settings = ClientSettings {
//!     nodes: vec!["127.0.0.1:6060".into()],
//!     ..ClientSettings::default()
//! };
//! let registry = Arc::new(IndexRegistry::new("./data", Mappings::default(), SearchSettings::default()));
//! let client = Client::connect(registry, &settings)?;
//! client.wait_ready(Duration::from_secs(5)).await;
//!
//! client.create_index("t1").await?;
//! client.sync("t1", "d1", json!({"title": "a"})).await?;
//! let result = client.query("t1", &QueryOpt::matching("a")).await?;
//! println!("{} hits", result.total);
//! client.quit().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod error;
mod manager;
mod node;
mod pool;
pub mod protocol;
mod service;
#[cfg(test)]
mod test_support;
mod transport;

pub use error::{ClusterError, ErrorKind};
pub use manager::{NodeInfo, ReplicationManager, Tally};
pub use node::{NodeClient, NodeSettings, NodeState};
pub use pool::{Client, WorkerPool};
pub use service::{RpcService, router, serve};
pub use transport::{Connector, HttpConnector, HttpTransport, Transport};
