//! The placement planner.
//!
//! A pure decision function: given a request (size, NUMA affinity, cooling
//! signals) and a registry snapshot, pick the target node, the memory tier,
//! and the transport class. The same snapshot and request always produce
//! the same plan.

use tracing::debug;

use vram_core::{
    AllocationPlan, CoolingSignals, MemoryTier, NumaNode, PoolError, RemoteNode, Result,
    TransportClass,
};

/// Weights of the node-scoring factors. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    /// Weight of the free-memory factor.
    pub memory: f64,
    /// Weight of the network-latency factor.
    pub latency: f64,
    /// Weight of the cpu/gpu-load factor.
    pub load: f64,
    /// Weight of the configured-priority factor.
    pub priority: f64,
    /// Weight of the NUMA-affinity factor.
    pub numa: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            memory: 0.3,
            latency: 0.2,
            load: 0.2,
            priority: 0.1,
            numa: 0.2,
        }
    }
}

impl ScoreWeights {
    /// Validates that all weights are non-negative and sum to 1.0.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Config`] otherwise.
    pub fn validate(&self) -> Result<()> {
        let weights = [self.memory, self.latency, self.load, self.priority, self.numa];
        if weights.iter().any(|w| *w < 0.0) {
            return Err(PoolError::Config {
                message: "score weights cannot be negative".to_string(),
            });
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(PoolError::Config {
                message: format!("score weights must sum to 1.0, got {sum}"),
            });
        }
        Ok(())
    }
}

/// Tuning for placement decisions.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Scoring weights.
    pub weights: ScoreWeights,
    /// Transfers below this size always use the stream transport.
    pub small_transfer_threshold: u64,
    /// Device tier requires `available > size * headroom` on a NUMA match.
    pub device_headroom_factor: u64,
    /// Stability above which hot data counts as stable.
    pub stability_threshold: f64,
    /// Hot data below this mobility prefers RDMA over split duplex.
    pub rdma_mobility_ceiling: u32,
    /// Mobility above which data is pinned to the host tier.
    pub host_mobility_floor: u32,
    /// GPU-memory utilization that triggers migration.
    pub migration_utilization: f64,
    /// GPU-memory utilization below which the stable zone may expand.
    pub expand_utilization: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            small_transfer_threshold: 4096,
            device_headroom_factor: 2,
            stability_threshold: 0.8,
            rdma_mobility_ceiling: 3,
            host_mobility_floor: 5,
            migration_utilization: 0.85,
            expand_utilization: 0.70,
        }
    }
}

/// One placement request.
#[derive(Debug, Clone, Default)]
pub struct PlanRequest {
    /// Requested (or transferred) size in bytes.
    pub size: u64,
    /// NUMA domain of the requesting context, if known.
    pub numa: Option<NumaNode>,
    /// Cooling signals for the data, default-cold for new allocations.
    pub signals: CoolingSignals,
}

impl PlanRequest {
    /// NUMA affinity to plan against: the requester's domain, falling back
    /// to where the data was last observed.
    #[must_use]
    pub fn effective_numa(&self) -> Option<NumaNode> {
        self.numa.or(self.signals.numa)
    }
}

/// Pure placement decision function over registry snapshots.
#[derive(Debug, Clone)]
pub struct PlacementPlanner {
    config: PlannerConfig,
}

impl PlacementPlanner {
    /// Creates a planner, validating the configured weights.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Config`] if the weights are invalid.
    pub fn new(config: PlannerConfig) -> Result<Self> {
        config.weights.validate()?;
        Ok(Self { config })
    }

    /// Returns the planner's tuning.
    #[must_use]
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plans placement for a request against a registry snapshot.
    ///
    /// The node with the strictly highest score wins; ties keep the node
    /// encountered first in the snapshot's stable order.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::OutOfCapacity`] when no node has enough memory.
    pub fn plan(&self, request: &PlanRequest, nodes: &[RemoteNode]) -> Result<AllocationPlan> {
        let numa = request.effective_numa();
        let mut best: Option<(&RemoteNode, f64)> = None;

        for node in nodes {
            if !node.has_capacity(request.size) {
                continue;
            }
            let score = self.score(node, request.size, numa);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((node, score)),
            }
        }

        let (node, score) = best.ok_or(PoolError::OutOfCapacity {
            requested: request.size,
        })?;
        debug!(
            node = %node.id,
            score,
            size = request.size,
            temperature = request.signals.temperature,
            mobility = request.signals.mobility,
            stability = request.signals.stability,
            "placement decision"
        );
        Ok(self.plan_for_node(node, request))
    }

    /// Builds the tier/transport/flag decisions for a known target node.
    ///
    /// Used directly when the data already lives somewhere (transfer
    /// planning), where node selection would be meaningless.
    #[must_use]
    pub fn plan_for_node(&self, node: &RemoteNode, request: &PlanRequest) -> AllocationPlan {
        let numa = request.effective_numa();
        let numa_match = numa_matches(node, numa);
        let crossing_numa = numa.is_some() && node.numa.is_some() && !numa_match;
        let utilization = node.memory_utilization();

        AllocationPlan {
            target: node.id.clone(),
            tier: self.decide_tier(node, request, numa_match),
            transport: self.decide_transport(node, request),
            numa_match,
            prefetch_hint: crossing_numa,
            migration_trigger: utilization > self.config.migration_utilization,
            expand_stable_zone: utilization < self.config.expand_utilization,
            gdr: node.capabilities.gdr && request.signals.mobility > 0,
        }
    }

    /// Weighted score of one node for a request, in [0, 1].
    #[must_use]
    pub fn score(&self, node: &RemoteNode, size: u64, numa: Option<NumaNode>) -> f64 {
        let weights = &self.config.weights;

        let memory_score = if node.total_memory == 0 {
            0.0
        } else {
            ((node.available_memory.saturating_sub(size)) as f64 / node.total_memory as f64)
                .clamp(0.0, 1.0)
        };
        let latency_score = 1.0 / (1.0 + node.latency_ms);
        let load_score =
            (1.0 - (node.cpu_utilization + node.gpu_utilization) / 200.0).clamp(0.0, 1.0);
        let priority_score = f64::from(node.priority) / 100.0;
        let numa_score = if numa_matches(node, numa) { 1.0 } else { 0.5 };

        weights.memory * memory_score
            + weights.latency * latency_score
            + weights.load * load_score
            + weights.priority * priority_score
            + weights.numa * numa_score
    }

    fn decide_tier(&self, node: &RemoteNode, request: &PlanRequest, numa_match: bool) -> MemoryTier {
        let signals = &request.signals;

        // Stable hot data is worth device residency regardless of locality.
        if signals.stability > self.config.stability_threshold && signals.hot {
            return MemoryTier::DeviceResident;
        }
        // Highly mobile data stays in host memory where both the RDMA-read
        // and datagram-write paths can reach it cheaply.
        if signals.mobility > self.config.host_mobility_floor {
            return MemoryTier::HostResident;
        }
        if numa_match
            && node.available_memory > request.size.saturating_mul(self.config.device_headroom_factor)
        {
            return MemoryTier::DeviceResident;
        }
        MemoryTier::HostResident
    }

    fn decide_transport(&self, node: &RemoteNode, request: &PlanRequest) -> TransportClass {
        // Per-transfer setup cost dominates small payloads on every other
        // path, so the size override beats all cooling signals.
        if request.size < self.config.small_transfer_threshold {
            return TransportClass::Stream;
        }

        let signals = &request.signals;
        if signals.hot && signals.stability > self.config.stability_threshold {
            return TransportClass::Local;
        }
        if signals.hot && signals.mobility < self.config.rdma_mobility_ceiling {
            return if node.capabilities.rdma {
                TransportClass::Rdma
            } else {
                TransportClass::Datagram
            };
        }
        TransportClass::RdmaThenDatagram
    }
}

fn numa_matches(node: &RemoteNode, numa: Option<NumaNode>) -> bool {
    matches!((node.numa, numa), (Some(a), Some(b)) if a == b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;
    use vram_core::{NodeCapabilities, NodeId};

    fn make_node(id: &str, total: u64, available: u64) -> RemoteNode {
        RemoteNode {
            id: NodeId::new(id),
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

    fn planner() -> PlacementPlanner {
        PlacementPlanner::new(PlannerConfig::default()).expect("planner")
    }

    fn hot_signals(stability: f64, mobility: u32) -> CoolingSignals {
        CoolingSignals {
            temperature: 0.95,
            hot: true,
            mobility,
            stability,
            numa: None,
        }
    }

    // ==================== WEIGHT VALIDATION TESTS ====================

    #[test]
    fn test_default_weights_are_valid() {
        ScoreWeights::default().validate().expect("valid");
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let weights = ScoreWeights {
            memory: 0.5,
            ..ScoreWeights::default()
        };
        assert!(matches!(
            weights.validate(),
            Err(PoolError::Config { .. })
        ));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let weights = ScoreWeights {
            memory: -0.1,
            latency: 0.3,
            load: 0.3,
            priority: 0.2,
            numa: 0.3,
        };
        assert!(matches!(
            weights.validate(),
            Err(PoolError::Config { .. })
        ));
    }

    // ==================== NODE SELECTION TESTS ====================

    #[test]
    fn test_most_available_memory_wins_all_else_equal() {
        let nodes = vec![
            make_node("small", 8192, 1024),
            make_node("large", 8192, 4096),
            make_node("medium", 8192, 2048),
        ];
        let request = PlanRequest {
            size: 3000,
            ..PlanRequest::default()
        };

        let plan = planner().plan(&request, &nodes).expect("plan");
        assert_eq!(plan.target, NodeId::new("large"));
    }

    #[test]
    fn test_nodes_without_capacity_are_skipped() {
        let nodes = vec![make_node("tiny", 8192, 100), make_node("fits", 8192, 4096)];
        let request = PlanRequest {
            size: 2048,
            ..PlanRequest::default()
        };

        let plan = planner().plan(&request, &nodes).expect("plan");
        assert_eq!(plan.target, NodeId::new("fits"));
    }

    #[test]
    fn test_no_capacity_anywhere_is_out_of_capacity() {
        let nodes = vec![make_node("a", 8192, 100), make_node("b", 8192, 200)];
        let request = PlanRequest {
            size: 1 << 20,
            ..PlanRequest::default()
        };

        let result = planner().plan(&request, &nodes);
        assert!(matches!(
            result,
            Err(PoolError::OutOfCapacity { requested }) if requested == 1 << 20
        ));
    }

    #[test]
    fn test_empty_snapshot_is_out_of_capacity() {
        let result = planner().plan(&PlanRequest::default(), &[]);
        assert!(matches!(result, Err(PoolError::OutOfCapacity { .. })));
    }

    #[test]
    fn test_selection_is_deterministic() {
        let nodes = vec![
            make_node("a", 8192, 3000),
            make_node("b", 8192, 3000),
            make_node("c", 8192, 4096),
        ];
        let request = PlanRequest {
            size: 1000,
            ..PlanRequest::default()
        };

        let planner = planner();
        let first = planner.plan(&request, &nodes).expect("plan");
        for _ in 0..10 {
            let next = planner.plan(&request, &nodes).expect("plan");
            assert_eq!(next, first);
        }
    }

    #[test]
    fn test_tie_breaks_to_first_in_snapshot_order() {
        let nodes = vec![make_node("first", 8192, 4096), make_node("second", 8192, 4096)];
        let request = PlanRequest {
            size: 1024,
            ..PlanRequest::default()
        };

        let plan = planner().plan(&request, &nodes).expect("plan");
        assert_eq!(plan.target, NodeId::new("first"));
    }

    #[test]
    fn test_numa_affinity_beats_slightly_more_memory() {
        let mut near = make_node("near", 8192, 4000);
        near.numa = Some(NumaNode::new(0));
        let mut far = make_node("far", 8192, 4096);
        far.numa = Some(NumaNode::new(1));

        let request = PlanRequest {
            size: 1024,
            numa: Some(NumaNode::new(0)),
            ..PlanRequest::default()
        };

        let plan = planner().plan(&request, &[far, near]).expect("plan");
        assert_eq!(plan.target, NodeId::new("near"));
    }

    #[test]
    fn test_higher_priority_wins_all_else_equal() {
        let mut preferred = make_node("preferred", 8192, 4096);
        preferred.priority = 90;
        let other = make_node("other", 8192, 4096);

        let request = PlanRequest {
            size: 1024,
            ..PlanRequest::default()
        };

        let plan = planner().plan(&request, &[other, preferred]).expect("plan");
        assert_eq!(plan.target, NodeId::new("preferred"));
    }

    // ==================== TIER TESTS ====================

    #[test]
    fn test_stable_hot_data_goes_to_device() {
        let node = make_node("a", 1 << 20, 1 << 19);
        let request = PlanRequest {
            size: 8192,
            signals: hot_signals(0.9, 0),
            ..PlanRequest::default()
        };
        let plan = planner().plan_for_node(&node, &request);
        assert_eq!(plan.tier, MemoryTier::DeviceResident);
    }

    #[test]
    fn test_high_mobility_data_goes_to_host() {
        let mut node = make_node("a", 1 << 20, 1 << 19);
        node.numa = Some(NumaNode::new(0));
        let request = PlanRequest {
            size: 8192,
            numa: Some(NumaNode::new(0)),
            signals: CoolingSignals {
                mobility: 6,
                ..CoolingSignals::default()
            },
        };
        let plan = planner().plan_for_node(&node, &request);
        assert_eq!(plan.tier, MemoryTier::HostResident);
    }

    #[test]
    fn test_numa_match_with_headroom_goes_to_device() {
        let mut node = make_node("a", 1 << 20, 1 << 19);
        node.numa = Some(NumaNode::new(2));
        let request = PlanRequest {
            size: 8192,
            numa: Some(NumaNode::new(2)),
            ..PlanRequest::default()
        };
        let plan = planner().plan_for_node(&node, &request);
        assert_eq!(plan.tier, MemoryTier::DeviceResident);
        assert!(plan.numa_match);
    }

    #[test]
    fn test_cold_remote_data_goes_to_host() {
        let node = make_node("a", 1 << 20, 1 << 19);
        let request = PlanRequest {
            size: 8192,
            ..PlanRequest::default()
        };
        let plan = planner().plan_for_node(&node, &request);
        assert_eq!(plan.tier, MemoryTier::HostResident);
    }

    #[test]
    fn test_numa_match_without_headroom_goes_to_host() {
        let mut node = make_node("a", 1 << 20, 10_000);
        node.numa = Some(NumaNode::new(0));
        let request = PlanRequest {
            size: 8192,
            numa: Some(NumaNode::new(0)),
            ..PlanRequest::default()
        };
        let plan = planner().plan_for_node(&node, &request);
        assert_eq!(plan.tier, MemoryTier::HostResident);
    }

    // ==================== TRANSPORT TESTS ====================

    #[test_case(CoolingSignals::default(); "cold data")]
    #[test_case(hot_signals(0.9, 0); "stable hot data")]
    #[test_case(hot_signals(0.1, 2); "unstable hot data")]
    #[test_case(CoolingSignals { mobility: 9, ..CoolingSignals::default() }; "mobile data")]
    fn test_small_transfers_always_stream(signals: CoolingSignals) {
        let mut node = make_node("a", 1 << 20, 1 << 19);
        node.capabilities.rdma = true;
        let request = PlanRequest {
            size: 100,
            signals,
            ..PlanRequest::default()
        };
        let plan = planner().plan_for_node(&node, &request);
        assert_eq!(plan.transport, TransportClass::Stream);
    }

    #[test]
    fn test_stable_hot_data_stays_local() {
        let node = make_node("a", 1 << 20, 1 << 19);
        let request = PlanRequest {
            size: 8192,
            signals: hot_signals(0.9, 0),
            ..PlanRequest::default()
        };
        let plan = planner().plan_for_node(&node, &request);
        assert_eq!(plan.transport, TransportClass::Local);
    }

    #[test]
    fn test_hot_low_mobility_uses_rdma_when_capable() {
        let mut node = make_node("a", 1 << 20, 1 << 19);
        node.capabilities.rdma = true;
        let request = PlanRequest {
            size: 8192,
            signals: hot_signals(0.5, 2),
            ..PlanRequest::default()
        };
        let plan = planner().plan_for_node(&node, &request);
        assert_eq!(plan.transport, TransportClass::Rdma);
    }

    #[test]
    fn test_hot_low_mobility_falls_back_to_datagram() {
        let node = make_node("a", 1 << 20, 1 << 19);
        let request = PlanRequest {
            size: 8192,
            signals: hot_signals(0.5, 2),
            ..PlanRequest::default()
        };
        let plan = planner().plan_for_node(&node, &request);
        assert_eq!(plan.transport, TransportClass::Datagram);
    }

    #[test]
    fn test_everything_else_is_split_duplex() {
        let node = make_node("a", 1 << 20, 1 << 19);
        let request = PlanRequest {
            size: 8192,
            ..PlanRequest::default()
        };
        let plan = planner().plan_for_node(&node, &request);
        assert_eq!(plan.transport, TransportClass::RdmaThenDatagram);
    }

    // ==================== FLAG TESTS ====================

    #[test]
    fn test_cross_numa_sets_prefetch_hint() {
        let mut node = make_node("a", 1 << 20, 1 << 19);
        node.numa = Some(NumaNode::new(1));
        let request = PlanRequest {
            size: 8192,
            numa: Some(NumaNode::new(0)),
            ..PlanRequest::default()
        };
        let plan = planner().plan_for_node(&node, &request);
        assert!(plan.prefetch_hint);
        assert!(!plan.numa_match);
    }

    #[test]
    fn test_unknown_numa_sets_no_prefetch_hint() {
        let node = make_node("a", 1 << 20, 1 << 19);
        let request = PlanRequest {
            size: 8192,
            ..PlanRequest::default()
        };
        let plan = planner().plan_for_node(&node, &request);
        assert!(!plan.prefetch_hint);
    }

    #[test]
    fn test_nearly_full_node_triggers_migration() {
        let node = make_node("a", 1 << 20, 1 << 20 >> 4); // ~94% used
        let request = PlanRequest {
            size: 1024,
            ..PlanRequest::default()
        };
        let plan = planner().plan_for_node(&node, &request);
        assert!(plan.migration_trigger);
        assert!(!plan.expand_stable_zone);
    }

    #[test]
    fn test_idle_node_expands_stable_zone() {
        let node = make_node("a", 1 << 20, 1 << 19); // 50% used
        let request = PlanRequest {
            size: 1024,
            ..PlanRequest::default()
        };
        let plan = planner().plan_for_node(&node, &request);
        assert!(plan.expand_stable_zone);
        assert!(!plan.migration_trigger);
    }

    #[test]
    fn test_gdr_flag_needs_capability_and_mobility() {
        let mut node = make_node("a", 1 << 20, 1 << 19);
        node.capabilities.gdr = true;

        let still = PlanRequest {
            size: 8192,
            ..PlanRequest::default()
        };
        assert!(!planner().plan_for_node(&node, &still).gdr);

        let moving = PlanRequest {
            size: 8192,
            signals: CoolingSignals {
                mobility: 1,
                ..CoolingSignals::default()
            },
            ..PlanRequest::default()
        };
        assert!(planner().plan_for_node(&node, &moving).gdr);
    }

    // ==================== PROPERTY TESTS ====================

    proptest::proptest! {
        #[test]
        fn prop_score_is_bounded(
            total in 1u64..=(1 << 40),
            available_frac in 0.0f64..=1.0,
            cpu in 0.0f64..=100.0,
            gpu in 0.0f64..=100.0,
            latency in 0.0f64..=1000.0,
            priority in 0u8..=100,
            size_frac in 0.0f64..=1.0,
        ) {
            let available = (total as f64 * available_frac) as u64;
            let size = (available as f64 * size_frac) as u64;
            let mut node = make_node("a", total, available);
            node.cpu_utilization = cpu;
            node.gpu_utilization = gpu;
            node.latency_ms = latency;
            node.priority = priority;

            let score = planner().score(&node, size, None);
            proptest::prop_assert!((0.0..=1.0).contains(&score));
        }
    }
}
