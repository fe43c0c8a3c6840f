//! The remote-handle table and its handle allocator.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use vram_core::{
    MemHandle, MemoryTier, NodeId, NumaNode, PoolError, RemoteHandle, RemoteRegion, Result,
};

/// Metadata for one live allocation, keyed by its client-visible handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRecord {
    /// Node the data lives on.
    pub node: NodeId,
    /// Storage handle on that node.
    pub remote_handle: RemoteHandle,
    /// Allocation size in bytes.
    pub size: u64,
    /// NUMA domain of the placement.
    pub numa: Option<NumaNode>,
    /// Memory tier the data currently occupies.
    pub tier: MemoryTier,
    /// Remote region for one-sided access.
    pub region: RemoteRegion,
    /// Number of accesses observed through the façade.
    pub access_count: u64,
    /// When the allocation was last accessed.
    pub last_access: DateTime<Utc>,
}

impl AllocationRecord {
    /// Creates a fresh record for a just-committed remote allocation.
    #[must_use]
    pub fn new(
        node: NodeId,
        remote_handle: RemoteHandle,
        size: u64,
        numa: Option<NumaNode>,
        tier: MemoryTier,
        region: RemoteRegion,
    ) -> Self {
        Self {
            node,
            remote_handle,
            size,
            numa,
            tier,
            region,
            access_count: 0,
            last_access: Utc::now(),
        }
    }
}

/// Mints client-visible handles from a monotonic counter.
///
/// Values start at 1 and are never reissued, which rules out the
/// use-after-free aliasing that pointer-keyed maps suffer from.
#[derive(Debug)]
pub struct HandleAllocator {
    next: AtomicU64,
}

impl HandleAllocator {
    /// Creates an allocator starting at handle value 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Mints the next handle.
    #[must_use]
    pub fn mint(&self) -> MemHandle {
        MemHandle::from_raw(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Concurrent map from handles to allocation metadata.
///
/// `get` calls proceed in parallel under the read lock; `add`/`remove` take
/// the write lock, so a completed `remove` is never observed by a later
/// `get`. The lock is never held across a network round-trip.
#[derive(Debug, Default)]
pub struct HandleTable {
    entries: RwLock<HashMap<MemHandle, AllocationRecord>>,
}

impl HandleTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a record under a freshly minted handle.
    pub fn add(&self, handle: MemHandle, record: AllocationRecord) {
        let mut entries = self.entries.write();
        debug!(%handle, node = %record.node, size = record.size, "registered allocation");
        if entries.insert(handle, record).is_some() {
            // Monotonic minting makes this unreachable in practice.
            warn!(%handle, "replaced an existing allocation record");
        }
    }

    /// Looks up the record for a handle.
    #[must_use]
    pub fn get(&self, handle: MemHandle) -> Option<AllocationRecord> {
        self.entries.read().get(&handle).cloned()
    }

    /// Removes a handle, returning its record if it was live.
    pub fn remove(&self, handle: MemHandle) -> Option<AllocationRecord> {
        let removed = self.entries.write().remove(&handle);
        if removed.is_some() {
            debug!(%handle, "removed allocation");
        }
        removed
    }

    /// Returns true if the handle is currently live.
    #[must_use]
    pub fn contains(&self, handle: MemHandle) -> bool {
        self.entries.read().contains_key(&handle)
    }

    /// Bumps access statistics for a handle.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidHandle`] if the handle is not live.
    pub fn touch(&self, handle: MemHandle) -> Result<()> {
        let mut entries = self.entries.write();
        let record = entries
            .get_mut(&handle)
            .ok_or(PoolError::InvalidHandle { handle })?;
        record.access_count += 1;
        record.last_access = Utc::now();
        Ok(())
    }

    /// Records a tier migration for a handle.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidHandle`] if the handle is not live.
    pub fn update_tier(&self, handle: MemHandle, tier: MemoryTier) -> Result<()> {
        let mut entries = self.entries.write();
        let record = entries
            .get_mut(&handle)
            .ok_or(PoolError::InvalidHandle { handle })?;
        debug!(%handle, from = %record.tier, to = %tier, "tier migration");
        record.tier = tier;
        Ok(())
    }

    /// Returns the number of live handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if no handles are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns all live handles.
    #[must_use]
    pub fn handles(&self) -> Vec<MemHandle> {
        self.entries.read().keys().copied().collect()
    }

    /// Serializes all entries to a versioned JSON file for crash forensics.
    ///
    /// The write goes to a temporary file first and is renamed into place,
    /// so a crash mid-export never truncates an older snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Snapshot`] if serialization or the write fails.
    pub fn snapshot_to_storage(&self, path: &Path) -> Result<()> {
        let entries = self.entries.read().clone();
        crate::snapshot::write_snapshot(path, &entries)
            .map_err(|source| PoolError::Snapshot { source })?;
        debug!(path = %path.display(), count = entries.len(), "exported handle-table snapshot");
        Ok(())
    }
}
