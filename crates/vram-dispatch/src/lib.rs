//! # vram-dispatch
//!
//! The dispatcher half of the vramgrid launcher: the registry of remote
//! GPU-hosting nodes, the background health-refresh loop that keeps its
//! metrics current, and the placement planner that turns a request plus a
//! registry snapshot into an [`vram_core::AllocationPlan`].
//!
//! Planning is pure: it reads a snapshot and computes, so concurrent
//! requests never contend on anything but the registry's read lock.

#![forbid(unsafe_code)]

mod health;
mod planner;
mod registry;

pub use health::{HealthProbe, HealthTaskConfig, HealthTaskHandle, start_health_task};
pub use planner::{PlacementPlanner, PlanRequest, PlannerConfig, ScoreWeights};
pub use registry::{NodeRegistry, RegistryConfig};
