//! The coordination service façade.
//!
//! Thin composition of the registry, planner, cooling tracker, handle
//! table, and transport arbitrator. The service owns no placement state of
//! its own; it dispatches, shapes responses, and keeps the bookkeeping
//! honest (allocate pairs planning with handle registration and rolls back
//! on remote failure; free kills the handle before touching the network).

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use vram_core::{
    AllocRequest, AllocationPlan, CoolingSignals, KernelLaunch, KernelParam, MemHandle,
    MemoryHint, MemoryTier, NodeId, NodeListConfig, NumaNode, PoolError, ResolvedLaunch,
    ResolvedParam, Result, TransferDirection, TransportClass,
};
use vram_cooling::{CoolingConfig, CoolingTracker, DecayTaskHandle, start_decay_task};
use vram_dispatch::{
    HealthProbe, HealthTaskConfig, HealthTaskHandle, NodeRegistry, PlacementPlanner, PlanRequest,
    PlannerConfig, RegistryConfig, start_health_task,
};
use vram_memory::{AllocationRecord, HandleAllocator, HandleTable};
use vram_transport::{TransferBuffer, TransferRoute, TransportArbitrator, TransportConfig};

use crate::nodes::{ClientPool, NodeConnector};

/// Tuning for the whole launcher core.
#[derive(Debug, Clone, Default)]
pub struct LauncherConfig {
    /// Placement planner tuning.
    pub planner: PlannerConfig,
    /// Cooling tracker tuning.
    pub cooling: CoolingConfig,
    /// Node registry tuning.
    pub registry: RegistryConfig,
    /// Health-refresh task tuning.
    pub health: HealthTaskConfig,
    /// Transport execution tuning.
    pub transport: TransportConfig,
}

/// What a successful allocation hands back to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationTicket {
    /// The minted client-visible handle.
    pub handle: MemHandle,
    /// Node the data lives on.
    pub node: NodeId,
    /// Tier the data was placed in.
    pub tier: MemoryTier,
}

/// Where an allocation currently lives.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    /// Owning node.
    pub node: NodeId,
    /// Current memory tier.
    pub tier: MemoryTier,
}

/// Acknowledgement of a dispatched kernel launch.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchReceipt {
    /// Node the kernel ran on.
    pub node: NodeId,
}

#[derive(Debug, Default)]
struct BackgroundTasks {
    health: Option<HealthTaskHandle>,
    decay: Option<DecayTaskHandle>,
}

/// The launcher-side coordination brain.
///
/// Explicitly constructed and dependency-injected: hand it a
/// [`NodeConnector`] (and optionally RDMA/datagram drivers) and every
/// collaborator is reachable for tests.
pub struct CoordinationService {
    registry: Arc<NodeRegistry>,
    cooling: Arc<CoolingTracker>,
    table: Arc<HandleTable>,
    allocator: HandleAllocator,
    planner: PlacementPlanner,
    arbitrator: TransportArbitrator,
    pool: Arc<ClientPool>,
    connector: Arc<dyn NodeConnector>,
    health_config: HealthTaskConfig,
    tasks: Mutex<BackgroundTasks>,
}

impl CoordinationService {
    /// Creates a service with only the stream transport configured.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Config`] if the planner weights are invalid.
    pub fn new(config: LauncherConfig, connector: Arc<dyn NodeConnector>) -> Result<Self> {
        let planner = PlacementPlanner::new(config.planner)?;
        Ok(Self {
            registry: Arc::new(NodeRegistry::new(config.registry)),
            cooling: Arc::new(CoolingTracker::new(config.cooling)),
            table: Arc::new(HandleTable::new()),
            allocator: HandleAllocator::new(),
            planner,
            arbitrator: TransportArbitrator::new(config.transport),
            pool: Arc::new(ClientPool::new()),
            connector,
            health_config: config.health,
            tasks: Mutex::new(BackgroundTasks::default()),
        })
    }

    /// Enables the RDMA transport path.
    #[must_use]
    pub fn with_rdma_driver(mut self, driver: Arc<dyn vram_core::RdmaDriver>) -> Self {
        self.arbitrator = self.arbitrator.with_rdma(driver);
        self
    }

    /// Enables the datagram transport path.
    #[must_use]
    pub fn with_datagram_link(mut self, link: Arc<dyn vram_transport::DatagramLink>) -> Self {
        self.arbitrator = self.arbitrator.with_datagram(link);
        self
    }

    /// The node registry.
    #[must_use]
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// The cooling tracker.
    #[must_use]
    pub fn cooling(&self) -> &CoolingTracker {
        &self.cooling
    }

    /// The remote-handle table.
    #[must_use]
    pub fn table(&self) -> &HandleTable {
        &self.table
    }

    // ==================== Configuration ====================

    /// Loads the node list and connects to every configured node.
    ///
    /// A node that refuses its connection stays registered; the health loop
    /// will mark it stale until it answers.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Config`] if the node list fails validation.
    pub async fn load(&self, config: &NodeListConfig) -> Result<()> {
        self.registry.load(config)?;
        self.connect_missing().await;
        Ok(())
    }

    /// Applies a reloaded node list, connecting any newly configured nodes.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Config`] if the node list fails validation.
    pub async fn reload(&self, config: &NodeListConfig) -> Result<()> {
        self.registry.reload(config)?;
        self.connect_missing().await;
        Ok(())
    }

    async fn connect_missing(&self) {
        for node in self.registry.list_nodes() {
            if self.pool.contains(&node.id) {
                continue;
            }
            match self.connector.connect(&node).await {
                Ok(client) => self.pool.insert(node.id.clone(), client),
                Err(e) => {
                    warn!(node = %node.id, error = %e, "connection failed; leaving node stale");
                }
            }
        }
    }

    // ==================== Background tasks ====================

    /// Starts the health-refresh and cooling-decay tasks, once.
    pub fn start_background_tasks(&self) {
        let mut tasks = self.tasks.lock();
        if tasks.health.is_none() {
            tasks.health = Some(start_health_task(
                Arc::clone(&self.registry),
                Arc::clone(&self.pool) as Arc<dyn HealthProbe>,
                self.health_config.clone(),
            ));
        }
        if tasks.decay.is_none() {
            tasks.decay = Some(start_decay_task(Arc::clone(&self.cooling)));
        }
        info!("background tasks running");
    }

    /// Stops the background tasks after their current rounds.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock();
        if let Some(health) = tasks.health.take() {
            health.stop();
        }
        if let Some(decay) = tasks.decay.take() {
            decay.stop();
        }
        info!("background tasks stopped");
    }

    // ==================== Façade operations ====================

    /// Allocates `size` bytes somewhere in the pool.
    ///
    /// Planning and handle registration are paired: the table entry is
    /// created only after the remote allocation commits, so a remote
    /// failure leaves nothing behind.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::OutOfCapacity`] when no node fits the request,
    /// or the remote node's error when its allocation fails.
    pub async fn allocate(&self, size: u64, numa_hint: Option<NumaNode>) -> Result<AllocationTicket> {
        let request = PlanRequest {
            size,
            numa: numa_hint,
            signals: CoolingSignals::default(),
        };
        let plan = self.planner.plan(&request, &self.registry.eligible_nodes())?;
        let node = self
            .registry
            .get_by_id(&plan.target)
            .ok_or_else(|| PoolError::NodeUnreachable {
                node: plan.target.clone(),
                reason: "vanished between planning and allocation".to_string(),
            })?;
        let client = self.pool.get(&plan.target)?;

        let remote = client
            .allocate(AllocRequest {
                size,
                tier: plan.tier,
                numa_hint: request.effective_numa(),
            })
            .await?;

        let handle = self.allocator.mint();
        self.table.add(
            handle,
            AllocationRecord::new(
                plan.target.clone(),
                remote.handle,
                size,
                node.numa,
                plan.tier,
                remote.region,
            ),
        );
        if let Some(numa) = node.numa {
            self.cooling.set_numa(handle, numa);
        }
        self.cooling.apply_capacity_hint(plan.expand_stable_zone);

        info!(%handle, node = %plan.target, tier = %plan.tier, size, "allocation committed");
        Ok(AllocationTicket {
            handle,
            node: plan.target,
            tier: plan.tier,
        })
    }

    /// Frees an allocation.
    ///
    /// The handle dies first; the remote free is at-least-once, so a node
    /// error is surfaced but never resurrects the handle.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidHandle`] for an unknown or already-freed
    /// handle, or [`PoolError::NodeUnreachable`] if the remote free fails.
    pub async fn free(&self, handle: MemHandle) -> Result<()> {
        let record = self
            .table
            .remove(handle)
            .ok_or(PoolError::InvalidHandle { handle })?;

        let client = self.pool.get(&record.node)?;
        if let Err(e) = client.free(record.remote_handle).await {
            warn!(%handle, node = %record.node, error = %e, "remote free failed; handle is dead regardless");
            return Err(e);
        }
        info!(%handle, node = %record.node, "freed");
        Ok(())
    }

    /// Plans the transport for moving `size` bytes to or from a handle.
    ///
    /// Counts as an access for cooling purposes.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidHandle`] for an unknown handle.
    pub fn plan_transfer(
        &self,
        handle: MemHandle,
        size: u64,
        direction: TransferDirection,
    ) -> Result<AllocationPlan> {
        let record = self
            .table
            .get(handle)
            .ok_or(PoolError::InvalidHandle { handle })?;
        let node = self
            .registry
            .get_by_id(&record.node)
            .ok_or_else(|| PoolError::NodeUnreachable {
                node: record.node.clone(),
                reason: "owner not registered".to_string(),
            })?;

        let request = PlanRequest {
            size,
            numa: record.numa,
            signals: self.cooling.signals(handle),
        };
        let mut plan = self.planner.plan_for_node(&node, &request);
        // The data already lives somewhere; report where, not a wish.
        plan.tier = record.tier;

        self.table.touch(handle)?;
        self.cooling.record_access(handle);
        self.cooling.apply_capacity_hint(plan.expand_stable_zone);

        debug!(%handle, %direction, transport = %plan.transport, size, "transfer planned");
        Ok(plan)
    }

    /// Plans and executes a transfer in one call.
    ///
    /// Returns the transport that actually carried the data.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidHandle`] for an unknown handle, or
    /// [`PoolError::TransferFailed`] once every transport is exhausted.
    pub async fn execute_transfer(
        &self,
        handle: MemHandle,
        buffer: TransferBuffer<'_>,
    ) -> Result<TransportClass> {
        let record = self
            .table
            .get(handle)
            .ok_or(PoolError::InvalidHandle { handle })?;
        let plan = self.plan_transfer(handle, buffer.len() as u64, buffer.direction())?;
        let client = self.pool.get(&record.node)?;

        let route = TransferRoute {
            node: record.node,
            remote_handle: record.remote_handle,
            region: record.region,
            transport: plan.transport,
        };
        self.arbitrator.execute(&route, client.as_ref(), buffer).await
    }

    /// Launches a kernel on the node owning its buffer parameters.
    ///
    /// Every buffer parameter must live on the launch target; a handle
    /// owned by a different node is invalid there.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidHandle`] for unknown or foreign buffer
    /// handles, [`PoolError::OutOfCapacity`] when a bufferless launch finds
    /// no eligible node, or the node's own launch error.
    pub async fn launch(&self, launch: &KernelLaunch) -> Result<LaunchReceipt> {
        let target = match launch.buffer_handles().next() {
            Some(first) => {
                self.table
                    .get(first)
                    .ok_or(PoolError::InvalidHandle { handle: first })?
                    .node
            }
            None => {
                let plan = self
                    .planner
                    .plan(&PlanRequest::default(), &self.registry.eligible_nodes())?;
                plan.target
            }
        };

        let mut params = Vec::with_capacity(launch.params.len());
        for param in &launch.params {
            match param {
                KernelParam::Immediate(bytes) => params.push(ResolvedParam::Immediate(bytes.clone())),
                KernelParam::Buffer(handle) => {
                    let record = self
                        .table
                        .get(*handle)
                        .ok_or(PoolError::InvalidHandle { handle: *handle })?;
                    if record.node != target {
                        warn!(
                            handle = %handle,
                            owner = %record.node,
                            %target,
                            "kernel parameter lives on another node"
                        );
                        return Err(PoolError::InvalidHandle { handle: *handle });
                    }
                    params.push(ResolvedParam::Buffer(record.remote_handle));
                }
            }
        }

        let client = self.pool.get(&target)?;
        client
            .launch_kernel(ResolvedLaunch {
                kernel: launch.kernel.clone(),
                grid: launch.grid,
                block: launch.block,
                shared_mem_bytes: launch.shared_mem_bytes,
                params,
            })
            .await?;

        for handle in launch.buffer_handles() {
            self.cooling.record_access(handle);
            if let Err(e) = self.table.touch(handle) {
                warn!(%handle, error = %e, "freed mid-launch");
            }
        }
        info!(kernel = %launch.kernel, node = %target, "kernel dispatched");
        Ok(LaunchReceipt { node: target })
    }

    /// Applies client advice about an allocation's future use.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidHandle`] for an unknown handle.
    pub fn advise(&self, handle: MemHandle, hint: MemoryHint) -> Result<()> {
        if !self.table.contains(handle) {
            return Err(PoolError::InvalidHandle { handle });
        }
        match hint {
            MemoryHint::PreferredLocation(numa) => self.cooling.set_numa(handle, numa),
            MemoryHint::AccessedBy => {
                self.cooling.record_access(handle);
                self.table.touch(handle)?;
            }
            MemoryHint::Migrated { tier } => {
                self.cooling.record_migration(handle);
                self.table.update_tier(handle, tier)?;
            }
        }
        debug!(%handle, ?hint, "advice applied");
        Ok(())
    }

    /// Reports where an allocation currently lives.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidHandle`] for an unknown handle.
    pub fn get_location(&self, handle: MemHandle) -> Result<Location> {
        let record = self
            .table
            .get(handle)
            .ok_or(PoolError::InvalidHandle { handle })?;
        Ok(Location {
            node: record.node,
            tier: record.tier,
        })
    }

    /// Exports the handle table for crash forensics.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Snapshot`] if the export fails.
    pub fn snapshot(&self, path: &std::path::Path) -> Result<()> {
        self.table.snapshot_to_storage(path)
    }
}

impl std::fmt::Debug for CoordinationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinationService")
            .field("nodes", &self.registry.len())
            .field("handles", &self.table.len())
            .finish_non_exhaustive()
    }
}
