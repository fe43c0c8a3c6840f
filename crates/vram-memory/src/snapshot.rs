//! Versioned JSON export of the handle table.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use vram_core::MemHandle;

use crate::table::AllocationRecord;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
struct SnapshotFile<'a> {
    version: u32,
    taken_at: DateTime<Utc>,
    entries: BTreeMap<String, &'a AllocationRecord>,
}

/// Writes all entries to `path` atomically (temp file + rename).
pub(crate) fn write_snapshot(
    path: &Path,
    entries: &HashMap<MemHandle, AllocationRecord>,
) -> io::Result<()> {
    let file = SnapshotFile {
        version: SNAPSHOT_VERSION,
        taken_at: Utc::now(),
        entries: entries
            .iter()
            .map(|(handle, record)| (handle.to_string(), record))
            .collect(),
    };

    let json = serde_json::to_vec_pretty(&file)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)
}
