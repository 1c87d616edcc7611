use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::volume::Volume;
use crate::Result;

/// Point-in-time capacity measurement for one volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacitySnapshot {
    pub bytes_used: u64,
    pub bytes_free: u64,
    pub bytes_total: u64,
}

/// Measures live capacity for a volume root.
pub trait CapacityProbe: Send + Sync {
    fn probe(&self, volume: &Volume) -> Result<CapacitySnapshot>;
}

/// Probes the local filesystem backing the volume path.
#[derive(Debug, Default)]
pub struct LocalDiskProbe;

impl CapacityProbe for LocalDiskProbe {
    fn probe(&self, volume: &Volume) -> Result<CapacitySnapshot> {
        let bytes_free = fs2::available_space(&volume.path)?;
        let bytes_total = fs2::total_space(&volume.path)?;
        Ok(CapacitySnapshot {
            bytes_used: bytes_total.saturating_sub(bytes_free),
            bytes_free,
            bytes_total,
        })
    }
}

struct CachedSnapshot {
    snapshot: CapacitySnapshot,
    refreshed_at: Instant,
}

/// Caches capacity snapshots per volume id.
///
/// Staleness is measured from the last refresh, not the last read:
/// capacity has no external invalidation signal, so a snapshot must
/// not be kept alive just because it keeps being consulted. Refreshing
/// is blocking I/O and belongs off the write/read path; `refresh_all`
/// is the scheduled entry point, `snapshot` loads lazily on miss or
/// expiry.
pub struct CapacityTracker {
    probe: Box<dyn CapacityProbe>,
    ttl: Duration,
    cache: RwLock<HashMap<u32, CachedSnapshot>>,
}

impl CapacityTracker {
    pub fn new(probe: Box<dyn CapacityProbe>, ttl: Duration) -> Self {
        Self {
            probe,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Current snapshot for the volume, re-probing if the cached value
    /// expired.
    pub fn snapshot(&self, volume: &Volume) -> Result<CapacitySnapshot> {
        {
            let cache = self.cache.read().expect("capacity cache lock");
            if let Some(cached) = cache.get(&volume.id) {
                if cached.refreshed_at.elapsed() < self.ttl {
                    return Ok(cached.snapshot);
                }
            }
        }
        self.refresh(volume)
    }

    /// Probe the volume now and cache the result.
    pub fn refresh(&self, volume: &Volume) -> Result<CapacitySnapshot> {
        let snapshot = self.probe.probe(volume)?;
        debug!(
            "volume {} capacity: {} free of {}",
            volume.id, snapshot.bytes_free, snapshot.bytes_total
        );
        self.cache.write().expect("capacity cache lock").insert(
            volume.id,
            CachedSnapshot {
                snapshot,
                refreshed_at: Instant::now(),
            },
        );
        Ok(snapshot)
    }

    /// Scheduled sweep: re-probe every known volume. Probe failures are
    /// logged and skipped so one bad mount cannot stall the rest.
    pub fn refresh_all(&self, volumes: &[Volume]) -> usize {
        let mut refreshed = 0;
        for volume in volumes {
            match self.refresh(volume) {
                Ok(_) => refreshed += 1,
                Err(err) => warn!("capacity refresh failed for volume {}: {err}", volume.id),
            }
        }
        info!("capacity refresh: {refreshed}/{} volumes", volumes.len());
        refreshed
    }

    /// Copy the cached capacity fields onto a volume, leaving them
    /// untouched when nothing has been measured yet.
    pub fn annotate(&self, volume: &mut Volume) {
        let cache = self.cache.read().expect("capacity cache lock");
        if let Some(cached) = cache.get(&volume.id) {
            volume.bytes_used = Some(cached.snapshot.bytes_used);
            volume.bytes_free = Some(cached.snapshot.bytes_free);
            volume.bytes_total = Some(cached.snapshot.bytes_total);
        }
    }
}
