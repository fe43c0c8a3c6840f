//! Per-node client connections.
//!
//! The launcher is the only RPC client of the compute nodes, and this pool
//! is the only place connections live. Everything else reaches a node
//! through [`ClientPool::get`].

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::debug;

use vram_core::{HealthReport, NodeClient, NodeId, PoolError, RemoteNode, Result};
use vram_dispatch::HealthProbe;

/// Establishes a client connection to one configured node.
///
/// The wire implementation lives with the RPC stack; tests use the
/// in-memory connector from [`crate::fake`].
pub trait NodeConnector: Send + Sync {
    /// Connects to the node and returns its client.
    fn connect<'a>(&'a self, node: &'a RemoteNode) -> BoxFuture<'a, Result<Arc<dyn NodeClient>>>;
}

/// The dispatcher's pool of node connections.
#[derive(Default)]
pub struct ClientPool {
    clients: RwLock<HashMap<NodeId, Arc<dyn NodeClient>>>,
}

impl ClientPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the connection for a node.
    pub fn insert(&self, node: NodeId, client: Arc<dyn NodeClient>) {
        debug!(%node, "node connection established");
        self.clients.write().insert(node, client);
    }

    /// Returns the connection for a node.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::NodeUnreachable`] if no connection exists.
    pub fn get(&self, node: &NodeId) -> Result<Arc<dyn NodeClient>> {
        self.clients
            .read()
            .get(node)
            .cloned()
            .ok_or_else(|| PoolError::NodeUnreachable {
                node: node.clone(),
                reason: "no connection".to_string(),
            })
    }

    /// Returns true if a connection exists for the node.
    #[must_use]
    pub fn contains(&self, node: &NodeId) -> bool {
        self.clients.read().contains_key(node)
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    /// Returns true if the pool holds no connections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }
}

impl HealthProbe for ClientPool {
    fn probe<'a>(&'a self, node: &'a NodeId) -> BoxFuture<'a, Result<HealthReport>> {
        Box::pin(async move {
            // Clone the client out so the lock is not held across the await.
            let client = self.get(node)?;
            client.probe_health().await
        })
    }
}

impl std::fmt::Debug for ClientPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientPool")
            .field("connections", &self.len())
            .finish()
    }
}
