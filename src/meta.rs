//! Record-metadata collaborator seam.
//!
//! The store never owns record metadata; it asks an external service
//! whether a record exists, where it was placed, and which records are
//! due for physical purge. [`MemoryMeta`] is an in-memory table for
//! tests and embedded use.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::SystemTime;

use crate::Result;

/// Identity of a logical record at write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKey {
    pub id: u64,
    pub feed: String,
    /// Record type name, e.g. "Raw Events". Becomes a directory level.
    pub stream_type: String,
    pub created: SystemTime,
}

/// A record as known to the metadata service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRef {
    pub key: RecordKey,
    pub volume_id: u32,
}

/// Lookups the core needs from the metadata service.
pub trait MetaLookup: Send + Sync {
    fn record_exists(&self, id: u64) -> Result<bool>;

    /// Volume the record was placed on, if any.
    fn volume_for_record(&self, id: u64) -> Result<Option<u32>>;

    /// Records logically deleted before `threshold`, up to `limit`.
    fn deleted_before(&self, threshold: SystemTime, limit: usize) -> Result<Vec<RecordRef>>;

    /// Confirm physical deletion so the records stop being returned.
    fn forget(&self, ids: &[u64]) -> Result<()>;
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    record: RecordRef,
    deleted_at: Option<SystemTime>,
}

/// In-memory metadata table.
#[derive(Debug, Default)]
pub struct MemoryMeta {
    entries: RwLock<HashMap<u64, MemoryEntry>>,
}

impl MemoryMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: RecordKey, volume_id: u32) {
        self.entries.write().expect("meta lock").insert(
            key.id,
            MemoryEntry {
                record: RecordRef { key, volume_id },
                deleted_at: None,
            },
        );
    }

    /// Mark a record logically deleted.
    pub fn mark_deleted(&self, id: u64, at: SystemTime) {
        if let Some(entry) = self.entries.write().expect("meta lock").get_mut(&id) {
            entry.deleted_at = Some(at);
        }
    }
}

impl MetaLookup for MemoryMeta {
    fn record_exists(&self, id: u64) -> Result<bool> {
        Ok(self.entries.read().expect("meta lock").contains_key(&id))
    }

    fn volume_for_record(&self, id: u64) -> Result<Option<u32>> {
        Ok(self
            .entries
            .read()
            .expect("meta lock")
            .get(&id)
            .map(|e| e.record.volume_id))
    }

    fn deleted_before(&self, threshold: SystemTime, limit: usize) -> Result<Vec<RecordRef>> {
        let entries = self.entries.read().expect("meta lock");
        let mut due: Vec<RecordRef> = entries
            .values()
            .filter(|e| e.deleted_at.is_some_and(|at| at <= threshold))
            .map(|e| e.record.clone())
            .collect();
        due.sort_by_key(|r| r.key.id);
        due.truncate(limit);
        Ok(due)
    }

    fn forget(&self, ids: &[u64]) -> Result<()> {
        let mut entries = self.entries.write().expect("meta lock");
        for id in ids {
            entries.remove(id);
        }
        Ok(())
    }
}
