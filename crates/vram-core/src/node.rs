//! Remote node descriptors and health metrics.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a remote GPU-hosting node, as declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node id from its configured string form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A NUMA locality domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NumaNode(u32);

impl NumaNode {
    /// Creates a NUMA domain id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw domain id.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for NumaNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "numa{}", self.0)
    }
}

/// Data-movement capabilities a node advertises.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCapabilities {
    /// One-sided RDMA read/write supported.
    #[serde(default)]
    pub rdma: bool,
    /// High-speed GPU interconnect (e.g. NVLink-class fabric) present.
    #[serde(default)]
    pub fabric: bool,
    /// GPU-direct data movement (bypassing host memory) supported.
    #[serde(default)]
    pub gdr: bool,
}

/// Health metrics reported by a node probe.
///
/// Latency is measured by the caller around the probe round-trip, so a
/// node's own report may leave it zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Available memory in bytes.
    pub available_memory: u64,
    /// CPU utilization percentage (0-100).
    pub cpu_utilization: f64,
    /// GPU utilization percentage (0-100).
    pub gpu_utilization: f64,
    /// Network round-trip latency in milliseconds.
    pub latency_ms: f64,
}

/// A remote GPU-hosting node known to the dispatcher.
///
/// Created from configuration at startup or reload; never deleted while the
/// process runs. Only the health-refresh loop and registry load mutate a
/// node; scoring reads snapshot clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteNode {
    /// Configured node id.
    pub id: NodeId,
    /// RPC (control-plane) address.
    pub address: String,
    /// Datagram data-plane address, if the node exposes one.
    pub data_address: Option<String>,
    /// High-speed-fabric interface name, if any.
    pub fabric_interface: Option<String>,
    /// Configured scheduling priority (0-100).
    pub priority: u8,
    /// Total memory in bytes.
    pub total_memory: u64,
    /// Last-known available memory in bytes.
    pub available_memory: u64,
    /// NUMA domain the node's GPUs are attached to.
    pub numa: Option<NumaNode>,
    /// Smoothed CPU utilization percentage (0-100).
    pub cpu_utilization: f64,
    /// Smoothed GPU utilization percentage (0-100).
    pub gpu_utilization: f64,
    /// Smoothed network latency in milliseconds.
    pub latency_ms: f64,
    /// Advertised data-movement capabilities.
    pub capabilities: NodeCapabilities,
    /// Consecutive failed health probes.
    #[serde(default)]
    pub staleness: u32,
}

impl RemoteNode {
    /// Returns true if the node has at least `size` bytes available.
    #[must_use]
    pub const fn has_capacity(&self, size: u64) -> bool {
        self.available_memory >= size
    }

    /// Fraction of this node's memory currently in use, in [0, 1].
    #[must_use]
    pub fn memory_utilization(&self) -> f64 {
        if self.total_memory == 0 {
            return 0.0;
        }
        let used = self.total_memory.saturating_sub(self.available_memory);
        used as f64 / self.total_memory as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_node(total: u64, available: u64) -> RemoteNode {
        RemoteNode {
            id: NodeId::new("n0"),
            address: "10.0.0.1:7000".to_string(),
            data_address: None,
            fabric_interface: None,
            priority: 50,
            total_memory: total,
            available_memory: available,
            numa: None,
            cpu_utilization: 0.0,
            gpu_utilization: 0.0,
            latency_ms: 0.0,
            capabilities: NodeCapabilities::default(),
            staleness: 0,
        }
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId::new("gpu-west-1").to_string(), "gpu-west-1");
    }

    #[test]
    fn test_numa_display() {
        assert_eq!(NumaNode::new(3).to_string(), "numa3");
    }

    #[test]
    fn test_has_capacity() {
        let node = make_node(4096, 2048);
        assert!(node.has_capacity(2048));
        assert!(!node.has_capacity(2049));
    }

    #[test]
    fn test_memory_utilization() {
        let node = make_node(4096, 1024);
        let util = node.memory_utilization();
        assert!((util - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_memory_utilization_zero_total() {
        let node = make_node(0, 0);
        assert!(node.memory_utilization().abs() < f64::EPSILON);
    }
}
