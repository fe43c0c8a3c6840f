//! # vram-launcher
//!
//! The coordination service of the vramgrid launcher: the RPC-facing façade
//! that composes the node registry, placement planner, cooling tracker,
//! remote-handle table, and transport arbitrator into the allocate / free /
//! plan-transfer / launch / advise surface clients see.
//!
//! ## Overview
//!
//! ```text
//! client request ──▶ CoordinationService
//!                       │
//!                       ├─▶ PlacementPlanner ──reads── NodeRegistry
//!                       │          │                   CoolingTracker
//!                       │          ▼
//!                       ├─▶ HandleTable (register / resolve / free)
//!                       │
//!                       └─▶ TransportArbitrator ──▶ RDMA / datagram / stream
//!
//! background: health-refresh task ──▶ NodeRegistry
//!             cooling-decay task  ──▶ CoolingTracker
//! ```
//!
//! The service is explicitly constructed and dependency-injected; the node
//! connections behind [`NodeConnector`] and the RDMA/datagram drivers are
//! capabilities the embedder supplies. [`fake::InMemoryNode`] is a complete
//! in-process node for tests.

#![forbid(unsafe_code)]

pub mod fake;
mod nodes;
mod service;

pub use nodes::{ClientPool, NodeConnector};
pub use service::{
    AllocationTicket, CoordinationService, LaunchReceipt, LauncherConfig, Location,
};
