//! Capability traits for the FFI and RPC boundaries.
//!
//! The RDMA verbs library and the per-node RPC stack are external
//! collaborators. The core consumes them through these traits so placement,
//! arbitration, and bookkeeping stay testable with in-memory fakes.

use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::handle::RemoteHandle;
use crate::launch::ResolvedLaunch;
use crate::node::{HealthReport, NumaNode};
use crate::plan::MemoryTier;

/// Address and protection key of a registered region on a remote node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRegion {
    /// Remote virtual address.
    pub addr: u64,
    /// Remote protection key.
    pub rkey: u32,
}

/// Token for a locally registered memory region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RdmaRegion {
    /// Local virtual address the registration covers.
    pub addr: u64,
    /// Length of the registered range in bytes.
    pub len: u64,
    /// Local protection key.
    pub lkey: u32,
}

/// One-sided RDMA driver boundary.
///
/// Implementations wrap a verbs-style library; completion waits are bounded
/// by the supplied timeout, never indefinite.
pub trait RdmaDriver: Send + Sync {
    /// Registers a local buffer and returns its region token.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PoolError::RegistrationFailed`] if the driver cannot
    /// register the region.
    fn register(&self, buf: &[u8]) -> Result<RdmaRegion>;

    /// Posts a one-sided write of `buf` to `remote` and waits for completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the post fails or completion does not arrive
    /// within `timeout`.
    fn write(
        &self,
        region: &RdmaRegion,
        buf: &[u8],
        remote: RemoteRegion,
        timeout: Duration,
    ) -> Result<()>;

    /// Posts a one-sided read from `remote` into `buf` and waits for completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the post fails or completion does not arrive
    /// within `timeout`.
    fn read(
        &self,
        region: &RdmaRegion,
        buf: &mut [u8],
        remote: RemoteRegion,
        timeout: Duration,
    ) -> Result<()>;
}

/// Parameters of a remote allocation request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AllocRequest {
    /// Requested size in bytes.
    pub size: u64,
    /// Tier the planner chose for the data.
    pub tier: MemoryTier,
    /// NUMA domain the node should prefer, if known.
    pub numa_hint: Option<NumaNode>,
}

/// A successful remote allocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RemoteAllocation {
    /// Node-local storage handle.
    pub handle: RemoteHandle,
    /// Remote region for one-sided access, when the node supports it.
    pub region: RemoteRegion,
}

/// RPC client for one remote node's allocate/free/launch surface.
///
/// The launcher is the only RPC client of the nodes; every connection lives
/// behind one of these. Calls are asynchronous and never block a request
/// thread on the network round-trip.
pub trait NodeClient: Send + Sync {
    /// Allocates memory on the node.
    fn allocate(&self, req: AllocRequest) -> BoxFuture<'_, Result<RemoteAllocation>>;

    /// Frees a previous allocation on the node.
    fn free(&self, handle: RemoteHandle) -> BoxFuture<'_, Result<()>>;

    /// Launches a kernel with resolved parameters.
    fn launch_kernel(&self, launch: ResolvedLaunch) -> BoxFuture<'_, Result<()>>;

    /// Writes payload bytes into an allocation over the reliable RPC channel.
    fn write_inline(
        &self,
        handle: RemoteHandle,
        offset: u64,
        payload: Vec<u8>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Reads bytes back from an allocation over the reliable RPC channel.
    fn read_inline(
        &self,
        handle: RemoteHandle,
        offset: u64,
        len: u64,
    ) -> BoxFuture<'_, Result<Vec<u8>>>;

    /// Answers a health probe with current node metrics.
    fn probe_health(&self) -> BoxFuture<'_, Result<HealthReport>>;
}
