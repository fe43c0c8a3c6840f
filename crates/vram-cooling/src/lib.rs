//! # vram-cooling
//!
//! Per-handle access-pattern tracking for the vramgrid placement planner.
//!
//! Every allocation the launcher serves has a temperature (recency-weighted
//! heat), a stability score, and a mobility count. Request threads only
//! bump counters under a briefly-held write lock; the expensive recomputes
//! (stability, exponential temperature decay, pruning) run on an
//! independent background task so the hot path never pays for them.

#![forbid(unsafe_code)]

mod decay;
mod tracker;

pub use decay::{DecayTaskHandle, start_decay_task};
pub use tracker::{CoolingConfig, CoolingTracker};
