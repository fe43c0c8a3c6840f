//! Background decay task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::trace;

use crate::tracker::CoolingTracker;

/// Handle for controlling the decay task.
#[derive(Debug)]
pub struct DecayTaskHandle {
    running: Arc<AtomicBool>,
}

impl DecayTaskHandle {
    /// Check if the decay task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the decay task after its current tick.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Start the periodic cooling decay task.
///
/// Wakes every [`crate::CoolingConfig::cooling_interval`] and runs one
/// decay pass. Per-entry work never fails, and the loop never terminates
/// the process; it runs until its handle is stopped.
pub fn start_decay_task(tracker: Arc<CoolingTracker>) -> DecayTaskHandle {
    let running = Arc::new(AtomicBool::new(true));
    let task_running = Arc::clone(&running);
    let interval = tracker.config().cooling_interval;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so a fresh tracker is
        // not decayed before anything is recorded.
        ticker.tick().await;

        while task_running.load(Ordering::SeqCst) {
            ticker.tick().await;
            if !task_running.load(Ordering::SeqCst) {
                break;
            }
            tracker.decay_pass();
            trace!(tracked = tracker.len(), "cooling decay tick");
        }
    });

    DecayTaskHandle { running }
}
