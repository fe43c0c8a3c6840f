//! In-memory node fake.
//!
//! A complete [`NodeClient`] implementation backed by process memory, with
//! failure injection. The launcher core is dependency-injected end to end,
//! so this fake is all the tests (here and downstream) need to exercise
//! every façade operation without a wire protocol.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::future::BoxFuture;
use parking_lot::Mutex;

use vram_core::{
    AllocRequest, HealthReport, MemoryTier, NodeClient, NodeId, PoolError, RemoteAllocation,
    RemoteHandle, RemoteNode, RemoteRegion, ResolvedLaunch, Result,
};

use crate::nodes::NodeConnector;

#[derive(Debug)]
struct FakeAllocation {
    tier: MemoryTier,
    bytes: Vec<u8>,
}

/// An in-process compute node.
pub struct InMemoryNode {
    id: NodeId,
    next_handle: AtomicU64,
    allocations: Mutex<HashMap<RemoteHandle, FakeAllocation>>,
    launches: Mutex<Vec<ResolvedLaunch>>,
    health: Mutex<HealthReport>,
    fail_allocations: AtomicBool,
    fail_inline: AtomicBool,
    fail_probes: AtomicBool,
}

impl InMemoryNode {
    /// Creates a fake node answering as `id`.
    #[must_use]
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            next_handle: AtomicU64::new(0x100),
            allocations: Mutex::new(HashMap::new()),
            launches: Mutex::new(Vec::new()),
            health: Mutex::new(HealthReport::default()),
            fail_allocations: AtomicBool::new(false),
            fail_inline: AtomicBool::new(false),
            fail_probes: AtomicBool::new(false),
        }
    }

    /// Sets the health metrics future probes will report.
    pub fn set_health(&self, report: HealthReport) {
        *self.health.lock() = report;
    }

    /// Makes every subsequent allocation fail.
    pub fn set_fail_allocations(&self, fail: bool) {
        self.fail_allocations.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent inline read/write fail.
    pub fn set_fail_inline(&self, fail: bool) {
        self.fail_inline.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent health probe fail.
    pub fn set_fail_probes(&self, fail: bool) {
        self.fail_probes.store(fail, Ordering::SeqCst);
    }

    /// Number of live allocations on this node.
    #[must_use]
    pub fn allocation_count(&self) -> usize {
        self.allocations.lock().len()
    }

    /// Kernel launches this node has received.
    #[must_use]
    pub fn launched(&self) -> Vec<ResolvedLaunch> {
        self.launches.lock().clone()
    }

    /// Bytes currently stored for an allocation.
    #[must_use]
    pub fn stored_bytes(&self, handle: RemoteHandle) -> Option<Vec<u8>> {
        self.allocations.lock().get(&handle).map(|a| a.bytes.clone())
    }

    /// Tier an allocation was placed in.
    #[must_use]
    pub fn stored_tier(&self, handle: RemoteHandle) -> Option<MemoryTier> {
        self.allocations.lock().get(&handle).map(|a| a.tier)
    }

    fn unreachable(&self, reason: &str) -> PoolError {
        PoolError::NodeUnreachable {
            node: self.id.clone(),
            reason: reason.to_string(),
        }
    }
}

impl NodeClient for InMemoryNode {
    fn allocate(&self, req: AllocRequest) -> BoxFuture<'_, Result<RemoteAllocation>> {
        Box::pin(async move {
            if self.fail_allocations.load(Ordering::SeqCst) {
                return Err(self.unreachable("injected allocation failure"));
            }
            let raw = self.next_handle.fetch_add(1, Ordering::SeqCst);
            let handle = RemoteHandle::from_raw(raw);
            self.allocations.lock().insert(
                handle,
                FakeAllocation {
                    tier: req.tier,
                    bytes: vec![0u8; req.size as usize],
                },
            );
            Ok(RemoteAllocation {
                handle,
                region: RemoteRegion {
                    addr: raw << 12,
                    rkey: 1,
                },
            })
        })
    }

    fn free(&self, handle: RemoteHandle) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.allocations
                .lock()
                .remove(&handle)
                .map(|_| ())
                .ok_or_else(|| self.unreachable("unknown remote handle"))
        })
    }

    fn launch_kernel(&self, launch: ResolvedLaunch) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.launches.lock().push(launch);
            Ok(())
        })
    }

    fn write_inline(
        &self,
        handle: RemoteHandle,
        offset: u64,
        payload: Vec<u8>,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.fail_inline.load(Ordering::SeqCst) {
                return Err(self.unreachable("injected inline failure"));
            }
            let mut allocations = self.allocations.lock();
            let allocation = allocations
                .get_mut(&handle)
                .ok_or_else(|| self.unreachable("unknown remote handle"))?;
            let end = offset as usize + payload.len();
            if allocation.bytes.len() < end {
                allocation.bytes.resize(end, 0);
            }
            allocation.bytes[offset as usize..end].copy_from_slice(&payload);
            Ok(())
        })
    }

    fn read_inline(
        &self,
        handle: RemoteHandle,
        offset: u64,
        len: u64,
    ) -> BoxFuture<'_, Result<Vec<u8>>> {
        Box::pin(async move {
            if self.fail_inline.load(Ordering::SeqCst) {
                return Err(self.unreachable("injected inline failure"));
            }
            let allocations = self.allocations.lock();
            let allocation = allocations
                .get(&handle)
                .ok_or_else(|| self.unreachable("unknown remote handle"))?;
            let start = (offset as usize).min(allocation.bytes.len());
            let end = (start + len as usize).min(allocation.bytes.len());
            Ok(allocation.bytes[start..end].to_vec())
        })
    }

    fn probe_health(&self) -> BoxFuture<'_, Result<HealthReport>> {
        Box::pin(async move {
            if self.fail_probes.load(Ordering::SeqCst) {
                return Err(self.unreachable("injected probe failure"));
            }
            Ok(self.health.lock().clone())
        })
    }
}

impl std::fmt::Debug for InMemoryNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryNode")
            .field("id", &self.id)
            .field("allocations", &self.allocation_count())
            .finish_non_exhaustive()
    }
}

/// Connector that hands out [`InMemoryNode`] clients, creating them on
/// first connect.
#[derive(Debug, Default)]
pub struct InMemoryConnector {
    nodes: Mutex<HashMap<NodeId, Arc<InMemoryNode>>>,
}

impl InMemoryConnector {
    /// Creates an empty connector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the fake behind a node id, creating it if needed.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Arc<InMemoryNode> {
        Arc::clone(
            self.nodes
                .lock()
                .entry(id.clone())
                .or_insert_with(|| Arc::new(InMemoryNode::new(id.clone()))),
        )
    }
}

impl NodeConnector for InMemoryConnector {
    fn connect<'a>(&'a self, node: &'a RemoteNode) -> BoxFuture<'a, Result<Arc<dyn NodeClient>>> {
        Box::pin(async move { Ok(self.node(&node.id) as Arc<dyn NodeClient>) })
    }
}
