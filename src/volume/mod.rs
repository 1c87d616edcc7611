//! Volumes and write placement.
//!
//! A volume is a configured storage root with capacity state refreshed
//! out of band. Placement policies are pure functions over a candidate
//! list; capacity snapshots are cached with a short expiry so selection
//! never blocks on disk probing.

mod capacity;
mod selector;

pub use capacity::{CapacityProbe, CapacitySnapshot, CapacityTracker, LocalDiskProbe};
pub use selector::{SelectorPolicy, VolumeSelector};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeKind {
    LocalDisk,
    ObjectStore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeStatus {
    Active,
    Inactive,
    Closed,
}

/// A configured storage root. Capacity fields stay `None` until first
/// measured; a volume without complete capacity state is excluded from
/// capacity-aware policies but still eligible for round-robin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub id: u32,
    pub path: PathBuf,
    pub group: u32,
    pub kind: VolumeKind,
    pub status: VolumeStatus,
    pub bytes_used: Option<u64>,
    pub bytes_free: Option<u64>,
    pub bytes_total: Option<u64>,
}

impl Volume {
    pub fn new(id: u32, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            path: path.into(),
            group: 0,
            kind: VolumeKind::LocalDisk,
            status: VolumeStatus::Active,
            bytes_used: None,
            bytes_free: None,
            bytes_total: None,
        }
    }

    /// All three capacity fields measured.
    pub fn has_valid_state(&self) -> bool {
        self.bytes_used.is_some() && self.bytes_free.is_some() && self.bytes_total.is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.status == VolumeStatus::Active
    }
}
