//! Background sweeps: orphan scanning and physical purge.
//!
//! Both sweeps share the same deletion primitive and progress
//! discipline. Progress counters are atomics because per-directory
//! sub-scans run concurrently; sums are commutative, so completion
//! order is irrelevant.

mod progress;
mod purge;
mod scanner;

pub use progress::ScanProgress;
pub use purge::PurgeExecutor;
pub use scanner::OrphanScanner;

use std::path::Path;
use std::sync::atomic::Ordering;

use log::{debug, error};

/// Delete one file (or pretend to, in dry-run mode), updating the
/// shared counters. Failures are counted and logged, never fatal.
pub(crate) fn delete_file(path: &Path, dry_run: bool, progress: &ScanProgress) {
    if dry_run {
        debug!("dry run: would delete {}", path.display());
        progress.deleted.fetch_add(1, Ordering::Relaxed);
        return;
    }
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("deleted {}", path.display());
            progress.deleted.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) => {
            error!("failed to delete {}: {err}", path.display());
            progress.delete_failures.fetch_add(1, Ordering::Relaxed);
        }
    }
}
