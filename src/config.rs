//! Store configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::block::DEFAULT_BLOCK_SIZE;

/// Configuration for the filesystem store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Uncompressed block size for new containers.
    /// Default: 1,000,000 bytes.
    pub block_size: u64,

    /// Volume selection policy name, resolved at startup.
    /// Default: "RoundRobin".
    pub selector: String,

    /// How long a cached capacity snapshot stays fresh, measured from
    /// the moment it was written.
    /// Default: 5 minutes.
    pub capacity_ttl: Duration,

    /// Minimum age before an orphaned file may be physically deleted.
    /// Protects files mid-write or pending metadata commit.
    /// Default: 1 hour.
    pub min_orphan_age: Duration,

    /// Minimum time since logical deletion before a record is purged.
    /// Default: 7 days.
    pub purge_age: Duration,

    /// Worker threads for per-directory scan tasks.
    /// Default: 4.
    pub scan_workers: usize,

    /// Records fetched per purge batch.
    /// Default: 1000.
    pub purge_batch: usize,

    /// Count and log instead of deleting.
    /// Default: false.
    pub dry_run: bool,

    /// Where the feed/type path-fragment map is persisted. `None`
    /// keeps the map in memory only.
    /// Default: None.
    pub fragment_map_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            selector: "RoundRobin".to_string(),
            capacity_ttl: Duration::from_secs(5 * 60),
            min_orphan_age: Duration::from_secs(60 * 60),
            purge_age: Duration::from_secs(7 * 24 * 60 * 60),
            scan_workers: 4,
            purge_batch: 1000,
            dry_run: false,
            fragment_map_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_json() {
        let config = StoreConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: StoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(back.selector, "RoundRobin");
        assert_eq!(back.scan_workers, 4);
    }
}
