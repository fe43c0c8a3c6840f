//! # vram-core
//!
//! Shared foundation for the vramgrid launcher: opaque memory handles, node
//! descriptors, allocation plans, kernel launch descriptors, the shared
//! error taxonomy, and the capability traits behind which the RDMA and
//! node-RPC bindings live.
//!
//! Every other vramgrid crate builds on these types; none of them hold
//! state of their own here.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod handle;
pub mod launch;
pub mod node;
pub mod plan;
pub mod traits;

pub use config::{NodeConfig, NodeListConfig};
pub use error::{PoolError, Result};
pub use handle::{MemHandle, RemoteHandle};
pub use launch::{Dim3, KernelLaunch, KernelParam, MemoryHint, ResolvedLaunch, ResolvedParam};
pub use node::{HealthReport, NodeCapabilities, NodeId, NumaNode, RemoteNode};
pub use plan::{AllocationPlan, CoolingSignals, MemoryTier, TransferDirection, TransportClass};
pub use traits::{AllocRequest, NodeClient, RdmaDriver, RdmaRegion, RemoteAllocation, RemoteRegion};
