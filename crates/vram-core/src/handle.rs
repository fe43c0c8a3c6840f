//! Opaque memory handles.
//!
//! Clients never see device addresses. They see a [`MemHandle`] minted from
//! a monotonic counter, resolved through the remote-handle table. Handle
//! values are never reused while the process runs, so a stale handle can
//! never alias a newer allocation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Client-visible memory handle.
///
/// Stands in for a device pointer on the client side of the RPC boundary.
/// Minted from a monotonic source; a freed handle's value is never handed
/// out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemHandle(u64);

impl MemHandle {
    /// Wraps a raw handle value (used when decoding RPC requests).
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw handle value.
    #[must_use]
    pub const fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

/// Node-local storage handle returned by the owning node's allocator.
///
/// Only meaningful to the node that issued it; the launcher treats it as an
/// opaque token paired with the owning [`crate::node::NodeId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteHandle(u64);

impl RemoteHandle {
    /// Wraps a raw remote handle value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw remote handle value.
    #[must_use]
    pub const fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}
