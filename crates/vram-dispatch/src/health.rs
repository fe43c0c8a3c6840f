//! Background health-refresh task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tracing::{trace, warn};

use vram_core::{HealthReport, NodeId, Result};

use crate::registry::NodeRegistry;

/// Capability for probing one node's health.
///
/// Implemented by whatever holds the node connections (the launcher's
/// client pool); the loop itself stays free of RPC details.
pub trait HealthProbe: Send + Sync {
    /// Probes the node and returns its current metrics.
    fn probe<'a>(&'a self, node: &'a NodeId) -> BoxFuture<'a, Result<HealthReport>>;
}

/// Configuration for the health-refresh task.
#[derive(Debug, Clone)]
pub struct HealthTaskConfig {
    /// Interval between refresh rounds.
    pub interval: Duration,
}

impl Default for HealthTaskConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

/// Handle for controlling the health-refresh task.
#[derive(Debug)]
pub struct HealthTaskHandle {
    running: Arc<AtomicBool>,
}

impl HealthTaskHandle {
    /// Check if the refresh task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the refresh task after its current round.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Start the periodic health-refresh task.
///
/// Every round probes each registered node (stale ones included, so they
/// can come back), overwrites the report's latency with the measured
/// round-trip time, and applies the result to the registry. Probe failures
/// are logged and counted; the loop never terminates the process.
pub fn start_health_task(
    registry: Arc<NodeRegistry>,
    probe: Arc<dyn HealthProbe>,
    config: HealthTaskConfig,
) -> HealthTaskHandle {
    let running = Arc::new(AtomicBool::new(true));
    let task_running = Arc::clone(&running);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval);

        while task_running.load(Ordering::SeqCst) {
            ticker.tick().await;
            if !task_running.load(Ordering::SeqCst) {
                break;
            }

            for node in registry.list_nodes() {
                let started = Instant::now();
                match probe.probe(&node.id).await {
                    Ok(mut report) => {
                        report.latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                        trace!(node = %node.id, available = report.available_memory, "health refreshed");
                        if let Err(e) = registry.refresh_health(&node.id, &report) {
                            warn!(node = %node.id, error = %e, "failed to apply health report");
                        }
                    }
                    Err(e) => {
                        warn!(node = %node.id, error = %e, "health probe failed");
                        registry.mark_probe_failed(&node.id);
                    }
                }
            }
        }
    });

    HealthTaskHandle { running }
}
