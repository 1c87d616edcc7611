use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use log::{debug, info, warn};

use crate::config::StoreConfig;
use crate::lifecycle::{delete_file, ScanProgress};
use crate::meta::MetaLookup;
use crate::store::{PathResolver, STORE_DIR};
use crate::volume::Volume;
use crate::Result;

/// Walks a volume's directory tree and removes files whose owning
/// record no longer exists.
///
/// Files younger than the minimum age are protected: a file mid-write
/// or awaiting its metadata commit looks orphaned to the scanner, so
/// deletion is deferred to a later pass. One task runs per directory
/// on a scoped worker pool; a cancelled scan stops between
/// directories and leaves the counters covering exactly the
/// directories fully processed.
pub struct OrphanScanner {
    meta: Arc<dyn MetaLookup>,
    min_age: Duration,
    workers: usize,
    dry_run: bool,
}

impl OrphanScanner {
    pub fn new(meta: Arc<dyn MetaLookup>, config: &StoreConfig) -> Self {
        Self {
            meta,
            min_age: config.min_orphan_age,
            workers: config.scan_workers.max(1),
            dry_run: config.dry_run,
        }
    }

    pub fn scan(&self, volume: &Volume, cancel: &AtomicBool) -> Result<ScanProgress> {
        let progress = ScanProgress::new();
        let root = volume.path.join(STORE_DIR);
        if !root.is_dir() {
            return Ok(progress);
        }

        let mut dirs = Vec::new();
        collect_dirs(&root, &mut dirs)?;
        progress
            .tasks_pending
            .store(dirs.len() as u64, Ordering::Relaxed);

        let next = AtomicUsize::new(0);
        let threshold = SystemTime::now() - self.min_age;
        let workers = self.workers.min(dirs.len().max(1));
        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    if i >= dirs.len() {
                        break;
                    }
                    self.scan_dir(&dirs[i], threshold, &progress);
                    progress.dirs_scanned.fetch_add(1, Ordering::Relaxed);
                    progress.tasks_pending.fetch_sub(1, Ordering::Relaxed);
                    progress.tasks_complete.fetch_add(1, Ordering::Relaxed);
                });
            }
        });

        info!("orphan scan of volume {}: {}", volume.id, progress.summary());
        Ok(progress)
    }

    /// Classify every file in one directory. Errors are logged and the
    /// sweep moves on; a bad file must not abort the volume scan.
    fn scan_dir(&self, dir: &Path, threshold: SystemTime, progress: &ScanProgress) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("cannot read {}: {err}", dir.display());
                return;
            }
        };
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("cannot read entry in {}: {err}", dir.display());
                    continue;
                }
            };
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            progress.files_scanned.fetch_add(1, Ordering::Relaxed);

            let Some(decoded) = PathResolver::decode(&path) else {
                debug!("not a store file, leaving alone: {}", path.display());
                continue;
            };
            match self.meta.record_exists(decoded.record_id) {
                Ok(true) => continue,
                Ok(false) => {}
                Err(err) => {
                    warn!("record lookup failed for {}: {err}", path.display());
                    continue;
                }
            }

            progress.orphans_found.fetch_add(1, Ordering::Relaxed);
            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(err) => {
                    warn!("cannot stat {}: {err}", path.display());
                    continue;
                }
            };
            if modified > threshold {
                debug!("orphan too new to delete: {}", path.display());
                progress.too_new.fetch_add(1, Ordering::Relaxed);
            } else {
                delete_file(&path, self.dry_run, progress);
            }
        }
    }
}

fn collect_dirs(dir: &Path, dirs: &mut Vec<PathBuf>) -> Result<()> {
    dirs.push(dir.to_path_buf());
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            collect_dirs(&entry.path(), dirs)?;
        }
    }
    Ok(())
}
