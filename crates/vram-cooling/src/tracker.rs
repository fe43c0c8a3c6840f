//! The cooling tracker: per-handle heat, stability, and mobility.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

use vram_core::{CoolingSignals, MemHandle, NumaNode};

/// Simplified access-pattern regularity factor; a full pattern analysis is
/// a node-side concern.
const PATTERN_FACTOR: f64 = 0.5;

/// Tuning for the cooling tracker and its decay loop.
#[derive(Debug, Clone)]
pub struct CoolingConfig {
    /// How often the decay loop wakes.
    pub cooling_interval: Duration,
    /// Access-count decrement applied to idle entries per pass.
    pub decay_amount: u64,
    /// Idle time before an entry starts decaying.
    pub access_window: Duration,
    /// Temperature above which data counts as hot.
    pub hot_threshold: f64,
    /// Temperature decay constant, per idle millisecond.
    pub temperature_decay_rate: f64,
    /// Stability time-factor half-life in seconds.
    pub stability_halflife_secs: f64,
}

impl Default for CoolingConfig {
    fn default() -> Self {
        Self {
            cooling_interval: Duration::from_secs(10),
            decay_amount: 1,
            access_window: Duration::from_secs(5),
            hot_threshold: 0.8,
            temperature_decay_rate: 0.001,
            stability_halflife_secs: 3600.0,
        }
    }
}

#[derive(Debug, Clone)]
struct AccessRecord {
    access_count: u64,
    last_access: Instant,
    mobility_count: u32,
    stability_score: f64,
    temperature: f64,
    numa: Option<NumaNode>,
}

impl AccessRecord {
    fn new() -> Self {
        Self {
            access_count: 0,
            last_access: Instant::now(),
            mobility_count: 0,
            stability_score: 0.0,
            temperature: 0.0,
            numa: None,
        }
    }
}

/// Tracks access heat per handle and feeds the planner its cooling signals.
///
/// Entries are created lazily on first access and pruned once their access
/// count decays to zero. Stability and temperature are recomputed only by
/// [`CoolingTracker::decay_pass`], never by request threads.
#[derive(Debug)]
pub struct CoolingTracker {
    records: RwLock<HashMap<MemHandle, AccessRecord>>,
    config: CoolingConfig,
    expanded_window: AtomicBool,
}

impl CoolingTracker {
    /// Creates a tracker with the given tuning.
    #[must_use]
    pub fn new(config: CoolingConfig) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            config,
            expanded_window: AtomicBool::new(false),
        }
    }

    /// Returns the tracker's tuning.
    #[must_use]
    pub fn config(&self) -> &CoolingConfig {
        &self.config
    }

    /// Records one access: bumps the count and sets instantaneous heat.
    pub fn record_access(&self, handle: MemHandle) {
        let mut records = self.records.write();
        let record = records.entry(handle).or_insert_with(AccessRecord::new);
        record.access_count += 1;
        record.last_access = Instant::now();
        record.temperature = 1.0;
    }

    /// Remembers which NUMA domain the data was placed in.
    pub fn set_numa(&self, handle: MemHandle, numa: NumaNode) {
        let mut records = self.records.write();
        let record = records.entry(handle).or_insert_with(AccessRecord::new);
        record.numa = Some(numa);
    }

    /// Counts one tier or node migration for the handle.
    pub fn record_migration(&self, handle: MemHandle) {
        let mut records = self.records.write();
        let record = records.entry(handle).or_insert_with(AccessRecord::new);
        record.mobility_count += 1;
    }

    /// Returns true if the handle's temperature is above the hot threshold.
    #[must_use]
    pub fn is_hot(&self, handle: MemHandle) -> bool {
        self.records
            .read()
            .get(&handle)
            .is_some_and(|r| r.temperature > self.config.hot_threshold)
    }

    /// Number of migrations observed for the handle.
    #[must_use]
    pub fn mobility(&self, handle: MemHandle) -> u32 {
        self.records
            .read()
            .get(&handle)
            .map_or(0, |r| r.mobility_count)
    }

    /// Stability score in [0, 1]; unknown handles score 0.
    #[must_use]
    pub fn stability(&self, handle: MemHandle) -> f64 {
        self.records
            .read()
            .get(&handle)
            .map_or(0.0, |r| r.stability_score)
    }

    /// Current temperature in [0, 1]; unknown handles are cold.
    #[must_use]
    pub fn temperature(&self, handle: MemHandle) -> f64 {
        self.records
            .read()
            .get(&handle)
            .map_or(0.0, |r| r.temperature)
    }

    /// NUMA domain the data was last placed in, if known.
    #[must_use]
    pub fn numa_node(&self, handle: MemHandle) -> Option<NumaNode> {
        self.records.read().get(&handle).and_then(|r| r.numa)
    }

    /// All planner-facing signals for a handle in one lock acquisition.
    #[must_use]
    pub fn signals(&self, handle: MemHandle) -> CoolingSignals {
        let records = self.records.read();
        records.get(&handle).map_or_else(CoolingSignals::default, |r| CoolingSignals {
            temperature: r.temperature,
            hot: r.temperature > self.config.hot_threshold,
            mobility: r.mobility_count,
            stability: r.stability_score,
            numa: r.numa,
        })
    }

    /// Consumes the planner's stable-zone advisory.
    ///
    /// Expanding the stable zone stretches the decay window so warm data
    /// cools more slowly while the destination GPUs have headroom.
    pub fn apply_capacity_hint(&self, expand: bool) {
        let was = self.expanded_window.swap(expand, Ordering::Relaxed);
        if was != expand {
            debug!(expand, "stable-zone advisory changed");
        }
    }

    /// Number of tracked handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Runs one decay pass over every entry.
    ///
    /// Idle entries lose access count (and are pruned at zero); surviving
    /// entries get their stability and temperature recomputed. Temperature
    /// and access count never increase here.
    pub fn decay_pass(&self) {
        let now = Instant::now();
        let window = if self.expanded_window.load(Ordering::Relaxed) {
            self.config.access_window * 2
        } else {
            self.config.access_window
        };

        let mut records = self.records.write();
        let before = records.len();
        records.retain(|handle, record| {
            let idle = now.saturating_duration_since(record.last_access);

            if idle > window {
                record.access_count = record.access_count.saturating_sub(self.config.decay_amount);
                if record.access_count == 0 {
                    debug!(%handle, "pruned cold access record");
                    return false;
                }
            }

            let frequency_factor = (record.access_count as f64 / 100.0).min(1.0);
            let time_factor =
                1.0 - (-idle.as_secs_f64() / self.config.stability_halflife_secs).exp();
            record.stability_score = frequency_factor * PATTERN_FACTOR * time_factor;

            record.temperature *=
                (-self.config.temperature_decay_rate * idle.as_millis() as f64).exp();
            true
        });

        let pruned = before - records.len();
        if pruned > 0 {
            debug!(pruned, remaining = records.len(), "cooling decay pass");
        }
    }

    /// Rewinds an entry's last access, for deterministic decay tests.
    #[cfg(test)]
    pub(crate) fn backdate(&self, handle: MemHandle, by: Duration) {
        let mut records = self.records.write();
        if let Some(record) = records.get_mut(&handle) {
            if let Some(earlier) = record.last_access.checked_sub(by) {
                record.last_access = earlier;
            }
        }
    }
}
