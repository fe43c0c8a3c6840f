//! Allocation plans and the signals that shape them.
//!
//! An [`AllocationPlan`] is a value produced fresh for every request by the
//! placement planner; it is never stored or shared across requests.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::node::{NodeId, NumaNode};

/// Where data lives on the remote node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    /// Resident in device (GPU) memory.
    DeviceResident,
    /// Resident in host (CPU) memory on the remote node.
    HostResident,
}

impl fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceResident => write!(f, "device"),
            Self::HostResident => write!(f, "host"),
        }
    }
}

/// Data-movement path class chosen by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportClass {
    /// No network movement; data stays colocated.
    Local,
    /// One-sided RDMA write/read.
    Rdma,
    /// Zero-copy unreliable datagram.
    Datagram,
    /// Reliable connection-oriented RPC carrying the payload inline.
    Stream,
    /// Split duplex: RDMA for read-dominated access, datagram for writes.
    RdmaThenDatagram,
}

impl fmt::Display for TransportClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Rdma => write!(f, "rdma"),
            Self::Datagram => write!(f, "datagram"),
            Self::Stream => write!(f, "stream"),
            Self::RdmaThenDatagram => write!(f, "rdma+datagram"),
        }
    }
}

/// Direction of a planned transfer, from the client's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    /// Client memory into the remote allocation.
    HostToDevice,
    /// Remote allocation back into client memory.
    DeviceToHost,
}

impl TransferDirection {
    /// Returns true if the transfer writes toward the remote node.
    #[must_use]
    pub const fn is_write(&self) -> bool {
        matches!(self, Self::HostToDevice)
    }
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostToDevice => write!(f, "host-to-device"),
            Self::DeviceToHost => write!(f, "device-to-host"),
        }
    }
}

/// Access-pattern signals the cooling tracker feeds the planner.
///
/// The default value describes data that has never been observed: cold,
/// immobile, unstable, of unknown locality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CoolingSignals {
    /// Recency-weighted heat in [0, 1].
    pub temperature: f64,
    /// Whether the temperature is above the hot threshold.
    pub hot: bool,
    /// Number of tier/node migrations observed.
    pub mobility: u32,
    /// Access stability score in [0, 1].
    pub stability: f64,
    /// NUMA domain the data was last placed in.
    pub numa: Option<NumaNode>,
}

/// Placement decision for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationPlan {
    /// Node the data should live on.
    pub target: NodeId,
    /// Memory tier on that node.
    pub tier: MemoryTier,
    /// Transport class for moving the data.
    pub transport: TransportClass,
    /// Source and target share a NUMA domain.
    pub numa_match: bool,
    /// Prefetch recommended to amortize a cross-NUMA hop.
    pub prefetch_hint: bool,
    /// Target GPU memory is nearly full; migration should be considered.
    pub migration_trigger: bool,
    /// Target GPU memory has headroom; the stable zone may grow.
    pub expand_stable_zone: bool,
    /// GPU-direct transfer is worthwhile for this data.
    pub gdr: bool,
}
