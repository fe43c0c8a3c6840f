//! Node-list configuration.
//!
//! File loading and watching live outside the core; callers hand the
//! registry an already-parsed [`NodeListConfig`] (or JSON text) through
//! `load` / `reload`.

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, Result};
use crate::node::{NodeCapabilities, NodeId, NumaNode, RemoteNode};

const fn default_priority() -> u8 {
    50
}

/// Configuration for one remote node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique node id.
    pub id: String,
    /// RPC (control-plane) address.
    pub address: String,
    /// Datagram data-plane address.
    #[serde(default)]
    pub data_address: Option<String>,
    /// High-speed-fabric interface name.
    #[serde(default)]
    pub fabric_interface: Option<String>,
    /// Scheduling priority (0-100).
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Total memory in bytes.
    pub total_memory: u64,
    /// Initially available memory; defaults to `total_memory`.
    #[serde(default)]
    pub available_memory: Option<u64>,
    /// NUMA domain of the node's GPUs.
    #[serde(default)]
    pub numa: Option<u32>,
    /// Node supports one-sided RDMA.
    #[serde(default)]
    pub rdma: bool,
    /// Node has a high-speed GPU interconnect.
    #[serde(default)]
    pub fabric: bool,
    /// Node supports GPU-direct transfers.
    #[serde(default)]
    pub gdr: bool,
}

impl From<&NodeConfig> for RemoteNode {
    fn from(cfg: &NodeConfig) -> Self {
        Self {
            id: NodeId::new(&cfg.id),
            address: cfg.address.clone(),
            data_address: cfg.data_address.clone(),
            fabric_interface: cfg.fabric_interface.clone(),
            priority: cfg.priority,
            total_memory: cfg.total_memory,
            available_memory: cfg.available_memory.unwrap_or(cfg.total_memory),
            numa: cfg.numa.map(NumaNode::new),
            cpu_utilization: 0.0,
            gpu_utilization: 0.0,
            latency_ms: 0.0,
            capabilities: NodeCapabilities {
                rdma: cfg.rdma,
                fabric: cfg.fabric,
                gdr: cfg.gdr,
            },
            staleness: 0,
        }
    }
}

/// The full node list handed to the registry at startup or reload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeListConfig {
    /// Configured nodes, in scoring tie-break order.
    pub nodes: Vec<NodeConfig>,
}

impl NodeListConfig {
    /// Parses a node list from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Config`] if the text is not valid JSON or the
    /// parsed list fails validation.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).map_err(|e| PoolError::Config {
            message: format!("invalid node list: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the node list.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Config`] for empty ids, out-of-range priorities,
    /// zero-sized nodes, oversubscribed availability, or duplicate ids.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for node in &self.nodes {
            if node.id.is_empty() {
                return Err(PoolError::Config {
                    message: "node id cannot be empty".to_string(),
                });
            }
            if !seen.insert(node.id.as_str()) {
                return Err(PoolError::Config {
                    message: format!("duplicate node id '{}'", node.id),
                });
            }
            if node.priority > 100 {
                return Err(PoolError::Config {
                    message: format!("node '{}': priority must be 0-100", node.id),
                });
            }
            if node.total_memory == 0 {
                return Err(PoolError::Config {
                    message: format!("node '{}': total_memory cannot be zero", node.id),
                });
            }
            if let Some(available) = node.available_memory {
                if available > node.total_memory {
                    return Err(PoolError::Config {
                        message: format!(
                            "node '{}': available_memory exceeds total_memory",
                            node.id
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}
