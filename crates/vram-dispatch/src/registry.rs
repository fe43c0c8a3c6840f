//! The registry of remote GPU-hosting nodes.

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use vram_core::{HealthReport, NodeId, NodeListConfig, PoolError, RemoteNode, Result};

/// Tuning for the node registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Consecutive failed probes after which a node is excluded from scoring.
    pub staleness_threshold: u32,
    /// EWMA weight given to a fresh health sample, in (0, 1].
    pub smoothing_factor: f64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            staleness_threshold: 3,
            smoothing_factor: 0.3,
        }
    }
}

/// Holds the set of remote nodes and their live health metrics.
///
/// Nodes are created from configuration and never deleted while the process
/// runs; a node that stops answering probes accumulates staleness and drops
/// out of scoring until it answers again. Scoring reads snapshot copies in
/// stable insertion order, so tie-breaks are deterministic.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: RwLock<Vec<RemoteNode>>,
    config: RegistryConfig,
}

impl NodeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            nodes: RwLock::new(Vec::new()),
            config,
        }
    }

    /// Adds a node, or updates its configured fields if the id is known.
    ///
    /// Smoothed health metrics survive an update; only configuration-owned
    /// fields (address, priority, capacities, capabilities) are replaced.
    pub fn add_node(&self, node: RemoteNode) {
        let mut nodes = self.nodes.write();
        if let Some(existing) = nodes.iter_mut().find(|n| n.id == node.id) {
            debug!(node = %node.id, "updating configured node");
            existing.address = node.address;
            existing.data_address = node.data_address;
            existing.fabric_interface = node.fabric_interface;
            existing.priority = node.priority;
            existing.total_memory = node.total_memory;
            existing.available_memory = node.available_memory;
            existing.numa = node.numa;
            existing.capabilities = node.capabilities;
        } else {
            info!(node = %node.id, address = %node.address, "registered node");
            nodes.push(node);
        }
    }

    /// Loads the registry from a node list at startup.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Config`] if the list fails validation.
    pub fn load(&self, config: &NodeListConfig) -> Result<()> {
        config.validate()?;
        for node_config in &config.nodes {
            self.add_node(RemoteNode::from(node_config));
        }
        info!(nodes = config.nodes.len(), "registry loaded");
        Ok(())
    }

    /// Applies a reloaded node list.
    ///
    /// Configured nodes are upserted. Nodes missing from the new list are
    /// not deleted; they are pushed past the staleness threshold so scoring
    /// ignores them until a health probe brings them back.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Config`] if the list fails validation.
    pub fn reload(&self, config: &NodeListConfig) -> Result<()> {
        config.validate()?;
        for node_config in &config.nodes {
            self.add_node(RemoteNode::from(node_config));
        }

        let retired_threshold = self.config.staleness_threshold + 1;
        let mut nodes = self.nodes.write();
        for node in nodes.iter_mut() {
            let still_configured = config.nodes.iter().any(|c| c.id == node.id.as_str());
            if !still_configured && node.staleness < retired_threshold {
                warn!(node = %node.id, "node absent from reloaded config; excluding from scoring");
                node.staleness = retired_threshold;
            }
        }
        Ok(())
    }

    /// Snapshot of every node, in stable insertion order.
    #[must_use]
    pub fn list_nodes(&self) -> Vec<RemoteNode> {
        self.nodes.read().clone()
    }

    /// Snapshot of the nodes eligible for scoring.
    #[must_use]
    pub fn eligible_nodes(&self) -> Vec<RemoteNode> {
        self.nodes
            .read()
            .iter()
            .filter(|n| n.staleness <= self.config.staleness_threshold)
            .cloned()
            .collect()
    }

    /// Looks up a node by id.
    #[must_use]
    pub fn get_by_id(&self, id: &NodeId) -> Option<RemoteNode> {
        self.nodes.read().iter().find(|n| &n.id == id).cloned()
    }

    /// Applies a fresh health sample to a node.
    ///
    /// Utilization and latency are EWMA-smoothed; available memory is taken
    /// as reported. A successful refresh clears staleness.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::NodeUnreachable`] if the node is not registered.
    pub fn refresh_health(&self, id: &NodeId, report: &HealthReport) -> Result<()> {
        let alpha = self.config.smoothing_factor;
        let mut nodes = self.nodes.write();
        let node = nodes
            .iter_mut()
            .find(|n| &n.id == id)
            .ok_or_else(|| PoolError::NodeUnreachable {
                node: id.clone(),
                reason: "not registered".to_string(),
            })?;

        node.available_memory = report.available_memory;
        node.cpu_utilization = alpha * report.cpu_utilization + (1.0 - alpha) * node.cpu_utilization;
        node.gpu_utilization = alpha * report.gpu_utilization + (1.0 - alpha) * node.gpu_utilization;
        node.latency_ms = alpha * report.latency_ms + (1.0 - alpha) * node.latency_ms;
        if node.staleness > 0 {
            info!(node = %id, staleness = node.staleness, "node answering again");
            node.staleness = 0;
        }
        Ok(())
    }

    /// Records a failed health probe for a node.
    ///
    /// The node keeps its last-known metrics but accumulates staleness;
    /// crossing the threshold excludes it from scoring.
    pub fn mark_probe_failed(&self, id: &NodeId) {
        let mut nodes = self.nodes.write();
        if let Some(node) = nodes.iter_mut().find(|n| &n.id == id) {
            node.staleness = node.staleness.saturating_add(1);
            if node.staleness == self.config.staleness_threshold + 1 {
                warn!(node = %id, staleness = node.staleness, "node excluded from scoring");
            }
        }
    }

    /// Number of registered nodes, stale ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Returns true if no nodes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vram_core::NodeConfig;

    fn make_config(id: &str, total: u64) -> NodeConfig {
        NodeConfig {
            id: id.to_string(),
            address: format!("10.0.0.{}:7000", total % 250),
            data_address: None,
            fabric_interface: None,
            priority: 50,
            total_memory: total,
            available_memory: None,
            numa: None,
            rdma: false,
            fabric: false,
            gdr: false,
        }
    }

    fn make_registry(ids: &[&str]) -> NodeRegistry {
        let registry = NodeRegistry::new(RegistryConfig::default());
        let config = NodeListConfig {
            nodes: ids.iter().map(|id| make_config(id, 4096)).collect(),
        };
        registry.load(&config).expect("load");
        registry
    }

    // ==================== LOAD TESTS ====================

    #[test]
    fn test_load_registers_all_nodes() {
        let registry = make_registry(&["a", "b", "c"]);
        assert_eq!(registry.len(), 3);
        assert!(registry.get_by_id(&NodeId::new("b")).is_some());
    }

    #[test]
    fn test_load_preserves_insertion_order() {
        let registry = make_registry(&["a", "b", "c"]);
        let ids: Vec<_> = registry
            .list_nodes()
            .into_iter()
            .map(|n| n.id.to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_load_invalid_config_rejected() {
        let registry = NodeRegistry::new(RegistryConfig::default());
        let config = NodeListConfig {
            nodes: vec![make_config("a", 4096), make_config("a", 4096)],
        };
        assert!(matches!(
            registry.load(&config),
            Err(PoolError::Config { .. })
        ));
    }

    // ==================== RELOAD TESTS ====================

    #[test]
    fn test_reload_retires_absent_nodes_without_deleting() {
        let registry = make_registry(&["a", "b"]);

        let config = NodeListConfig {
            nodes: vec![make_config("a", 4096)],
        };
        registry.reload(&config).expect("reload");

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.eligible_nodes().len(), 1);
        assert_eq!(registry.eligible_nodes()[0].id, NodeId::new("a"));
    }

    #[test]
    fn test_retired_node_returns_after_successful_probe() {
        let registry = make_registry(&["a", "b"]);
        registry
            .reload(&NodeListConfig {
                nodes: vec![make_config("a", 4096)],
            })
            .expect("reload");

        registry
            .refresh_health(&NodeId::new("b"), &HealthReport::default())
            .expect("refresh");
        assert_eq!(registry.eligible_nodes().len(), 2);
    }

    #[test]
    fn test_reload_updates_configured_fields_keeping_metrics() {
        let registry = make_registry(&["a"]);
        registry
            .refresh_health(
                &NodeId::new("a"),
                &HealthReport {
                    available_memory: 1024,
                    cpu_utilization: 50.0,
                    gpu_utilization: 40.0,
                    latency_ms: 2.0,
                },
            )
            .expect("refresh");

        let mut updated = make_config("a", 8192);
        updated.priority = 90;
        registry
            .reload(&NodeListConfig {
                nodes: vec![updated],
            })
            .expect("reload");

        let node = registry.get_by_id(&NodeId::new("a")).expect("node");
        assert_eq!(node.priority, 90);
        assert_eq!(node.total_memory, 8192);
        // Smoothed metrics survive the reload.
        assert!(node.cpu_utilization > 0.0);
    }

    // ==================== HEALTH TESTS ====================

    #[test]
    fn test_refresh_smooths_utilization() {
        let registry = make_registry(&["a"]);
        let id = NodeId::new("a");
        let report = HealthReport {
            available_memory: 2048,
            cpu_utilization: 100.0,
            gpu_utilization: 100.0,
            latency_ms: 10.0,
        };

        registry.refresh_health(&id, &report).expect("refresh");
        let node = registry.get_by_id(&id).expect("node");
        // First sample from zero: alpha * 100.
        assert!((node.cpu_utilization - 30.0).abs() < 1e-9);
        assert_eq!(node.available_memory, 2048);

        registry.refresh_health(&id, &report).expect("refresh");
        let node = registry.get_by_id(&id).expect("node");
        assert!(node.cpu_utilization > 30.0);
        assert!(node.cpu_utilization < 100.0);
    }

    #[test]
    fn test_refresh_unknown_node_is_unreachable() {
        let registry = make_registry(&["a"]);
        let result = registry.refresh_health(&NodeId::new("ghost"), &HealthReport::default());
        assert!(matches!(result, Err(PoolError::NodeUnreachable { .. })));
    }

    #[test]
    fn test_staleness_excludes_after_threshold() {
        let registry = make_registry(&["a", "b"]);
        let id = NodeId::new("a");

        for _ in 0..3 {
            registry.mark_probe_failed(&id);
        }
        // At the threshold the node is still eligible.
        assert_eq!(registry.eligible_nodes().len(), 2);

        registry.mark_probe_failed(&id);
        assert_eq!(registry.eligible_nodes().len(), 1);

        // A successful probe brings it back.
        registry
            .refresh_health(&id, &HealthReport::default())
            .expect("refresh");
        assert_eq!(registry.eligible_nodes().len(), 2);
    }

    #[test]
    fn test_stale_node_keeps_last_known_metrics() {
        let registry = make_registry(&["a"]);
        let id = NodeId::new("a");
        registry
            .refresh_health(
                &id,
                &HealthReport {
                    available_memory: 1234,
                    ..HealthReport::default()
                },
            )
            .expect("refresh");

        for _ in 0..10 {
            registry.mark_probe_failed(&id);
        }
        let node = registry.get_by_id(&id).expect("node");
        assert_eq!(node.available_memory, 1234);
        assert_eq!(node.staleness, 10);
    }
}
