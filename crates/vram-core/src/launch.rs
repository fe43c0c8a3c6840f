//! Kernel launch descriptors and memory advice.

use serde::{Deserialize, Serialize};

use crate::handle::{MemHandle, RemoteHandle};
use crate::node::NumaNode;
use crate::plan::MemoryTier;

/// Three-dimensional launch geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dim3 {
    /// Extent along x.
    pub x: u32,
    /// Extent along y.
    pub y: u32,
    /// Extent along z.
    pub z: u32,
}

impl Dim3 {
    /// Creates launch geometry from three extents.
    #[must_use]
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Total element count across all three dimensions.
    #[must_use]
    pub const fn linear(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }
}

impl Default for Dim3 {
    fn default() -> Self {
        Self::new(1, 1, 1)
    }
}

/// One kernel parameter as the client supplies it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KernelParam {
    /// Raw bytes passed through unchanged.
    Immediate(Vec<u8>),
    /// A pool allocation; resolved to the owning node's handle at dispatch.
    Buffer(MemHandle),
}

/// A kernel launch request as it enters the coordination service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelLaunch {
    /// Kernel function name.
    pub kernel: String,
    /// Grid geometry.
    pub grid: Dim3,
    /// Block geometry.
    pub block: Dim3,
    /// Dynamic shared memory in bytes.
    pub shared_mem_bytes: u32,
    /// Launch parameters in declaration order.
    pub params: Vec<KernelParam>,
}

impl KernelLaunch {
    /// Creates a launch request with no parameters.
    #[must_use]
    pub fn new(kernel: impl Into<String>, grid: Dim3, block: Dim3) -> Self {
        Self {
            kernel: kernel.into(),
            grid,
            block,
            shared_mem_bytes: 0,
            params: Vec::new(),
        }
    }

    /// Sets the dynamic shared memory size.
    #[must_use]
    pub const fn with_shared_mem(mut self, bytes: u32) -> Self {
        self.shared_mem_bytes = bytes;
        self
    }

    /// Appends a launch parameter.
    #[must_use]
    pub fn with_param(mut self, param: KernelParam) -> Self {
        self.params.push(param);
        self
    }

    /// Iterates over the buffer handles referenced by this launch.
    pub fn buffer_handles(&self) -> impl Iterator<Item = MemHandle> + '_ {
        self.params.iter().filter_map(|p| match p {
            KernelParam::Buffer(handle) => Some(*handle),
            KernelParam::Immediate(_) => None,
        })
    }
}

/// One kernel parameter after handle resolution, as sent to the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResolvedParam {
    /// Raw bytes passed through unchanged.
    Immediate(Vec<u8>),
    /// The owning node's storage handle.
    Buffer(RemoteHandle),
}

/// A kernel launch with all buffer parameters resolved to node-local handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLaunch {
    /// Kernel function name.
    pub kernel: String,
    /// Grid geometry.
    pub grid: Dim3,
    /// Block geometry.
    pub block: Dim3,
    /// Dynamic shared memory in bytes.
    pub shared_mem_bytes: u32,
    /// Resolved launch parameters in declaration order.
    pub params: Vec<ResolvedParam>,
}

/// Client advice about how an allocation will be used.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MemoryHint {
    /// The data belongs in the given NUMA domain.
    PreferredLocation(NumaNode),
    /// The data is about to be accessed; warm its cooling record.
    AccessedBy,
    /// The data just migrated to the given tier.
    Migrated {
        /// Tier the data now lives in.
        tier: MemoryTier,
    },
}
