//! # vram-memory
//!
//! The remote-handle mapping table: a concurrent map from client-visible
//! [`vram_core::MemHandle`]s to allocation metadata, plus the monotonic
//! allocator that mints those handles and a JSON snapshot export for crash
//! forensics.
//!
//! Handles are never reused, so a reader holding a stale handle can never
//! observe a newer allocation through it. Removal is atomic with respect to
//! concurrent lookups under the table's readers-writer lock.

#![forbid(unsafe_code)]

mod snapshot;
mod table;

pub use table::{AllocationRecord, HandleAllocator, HandleTable};
