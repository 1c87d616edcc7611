use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use log::{info, warn};

use crate::config::StoreConfig;
use crate::lifecycle::{delete_file, ScanProgress};
use crate::meta::MetaLookup;
use crate::store::{PathResolver, StreamType};
use crate::volume::Volume;
use crate::Result;

/// Physically deletes records that were logically deleted long enough
/// ago. Driven by record metadata rather than directory walking: the
/// collaborator serves batches of purge-due records, every file of
/// each record is removed via sibling discovery, and the batch is
/// confirmed back so it stops being returned.
pub struct PurgeExecutor {
    resolver: Arc<PathResolver>,
    meta: Arc<dyn MetaLookup>,
    purge_age: Duration,
    batch: usize,
    dry_run: bool,
}

impl PurgeExecutor {
    pub fn new(
        resolver: Arc<PathResolver>,
        meta: Arc<dyn MetaLookup>,
        config: &StoreConfig,
    ) -> Self {
        Self {
            resolver,
            meta,
            purge_age: config.purge_age,
            batch: config.purge_batch.max(1),
            dry_run: config.dry_run,
        }
    }

    pub fn run_once(&self, volumes: &[Volume], cancel: &AtomicBool) -> Result<ScanProgress> {
        let progress = ScanProgress::new();
        let threshold = SystemTime::now() - self.purge_age;

        'sweep: loop {
            let batch = self.meta.deleted_before(threshold, self.batch)?;
            if batch.is_empty() {
                break;
            }
            let mut purged = Vec::with_capacity(batch.len());
            for record in &batch {
                if cancel.load(Ordering::Relaxed) {
                    break 'sweep;
                }
                let Some(volume) = volumes.iter().find(|v| v.id == record.volume_id) else {
                    warn!(
                        "record {} points at unknown volume {}",
                        record.key.id, record.volume_id
                    );
                    continue;
                };
                self.purge_record(volume, record, &progress)?;
                purged.push(record.key.id);
            }
            if self.dry_run {
                break;
            }
            // A batch where nothing could be purged would repeat forever.
            if purged.is_empty() {
                break;
            }
            self.meta.forget(&purged)?;
            if batch.len() < self.batch {
                break;
            }
        }

        info!("purge sweep: {}", progress.summary());
        Ok(progress)
    }

    fn purge_record(
        &self,
        volume: &Volume,
        record: &crate::meta::RecordRef,
        progress: &ScanProgress,
    ) -> Result<()> {
        let raw_path = self
            .resolver
            .resolve(&volume.path, &record.key, StreamType::Raw)?;
        let files = match PathResolver::sibling_files(&raw_path) {
            Ok(files) => files,
            // The directory may already be gone; the record still
            // counts as purged.
            Err(crate::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err),
        };
        for file in files {
            progress.files_scanned.fetch_add(1, Ordering::Relaxed);
            delete_file(&file, self.dry_run, progress);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{MemoryMeta, RecordKey};
    use tempfile::tempdir;

    fn setup_record(root: &std::path::Path, resolver: &PathResolver, id: u64) -> RecordKey {
        let key = RecordKey {
            id,
            feed: "FEED".to_string(),
            stream_type: "EVENTS".to_string(),
            created: SystemTime::UNIX_EPOCH,
        };
        let raw = resolver.resolve(root, &key, StreamType::Raw).unwrap();
        std::fs::create_dir_all(raw.parent().unwrap()).unwrap();
        std::fs::write(&raw, b"data").unwrap();
        std::fs::write(
            PathResolver::companion_of(&raw, StreamType::SegmentIndex),
            b"idx",
        )
        .unwrap();
        key
    }

    #[test]
    fn purges_due_records_and_confirms() {
        let dir = tempdir().unwrap();
        let volume = Volume::new(1, dir.path());
        let resolver = Arc::new(PathResolver::new(None).unwrap());
        let meta = Arc::new(MemoryMeta::new());
        let now = SystemTime::now();

        let due = setup_record(dir.path(), &resolver, 1);
        let recent = setup_record(dir.path(), &resolver, 2);
        meta.insert(due.clone(), 1);
        meta.insert(recent.clone(), 1);
        meta.mark_deleted(1, now - Duration::from_secs(10 * 24 * 3600));
        meta.mark_deleted(2, now);

        let config = StoreConfig {
            purge_age: Duration::from_secs(7 * 24 * 3600),
            ..StoreConfig::default()
        };
        let executor = PurgeExecutor::new(resolver.clone(), meta.clone(), &config);
        let progress = executor
            .run_once(std::slice::from_ref(&volume), &AtomicBool::new(false))
            .unwrap();

        assert_eq!(progress.deleted.load(Ordering::Relaxed), 2);
        let due_raw = resolver
            .resolve(dir.path(), &due, StreamType::Raw)
            .unwrap();
        let recent_raw = resolver
            .resolve(dir.path(), &recent, StreamType::Raw)
            .unwrap();
        assert!(!due_raw.exists());
        assert!(recent_raw.exists(), "recently deleted record is kept");
        assert!(!meta.record_exists(1).unwrap(), "purged record forgotten");
        assert!(meta.record_exists(2).unwrap());
    }

    #[test]
    fn dry_run_leaves_files_and_metadata() {
        let dir = tempdir().unwrap();
        let volume = Volume::new(1, dir.path());
        let resolver = Arc::new(PathResolver::new(None).unwrap());
        let meta = Arc::new(MemoryMeta::new());

        let due = setup_record(dir.path(), &resolver, 1);
        meta.insert(due.clone(), 1);
        meta.mark_deleted(1, SystemTime::UNIX_EPOCH);

        let config = StoreConfig {
            purge_age: Duration::from_secs(60),
            dry_run: true,
            ..StoreConfig::default()
        };
        let executor = PurgeExecutor::new(resolver.clone(), meta.clone(), &config);
        let progress = executor
            .run_once(std::slice::from_ref(&volume), &AtomicBool::new(false))
            .unwrap();

        assert_eq!(progress.deleted.load(Ordering::Relaxed), 2);
        let raw = resolver.resolve(dir.path(), &due, StreamType::Raw).unwrap();
        assert!(raw.exists());
        assert!(meta.record_exists(1).unwrap());
    }

    #[test]
    fn missing_files_still_purge_metadata() {
        let dir = tempdir().unwrap();
        let volume = Volume::new(1, dir.path());
        let resolver = Arc::new(PathResolver::new(None).unwrap());
        let meta = Arc::new(MemoryMeta::new());

        let key = RecordKey {
            id: 5,
            feed: "FEED".to_string(),
            stream_type: "EVENTS".to_string(),
            created: SystemTime::UNIX_EPOCH,
        };
        meta.insert(key, 1);
        meta.mark_deleted(5, SystemTime::UNIX_EPOCH);

        let config = StoreConfig {
            purge_age: Duration::from_secs(60),
            ..StoreConfig::default()
        };
        let executor = PurgeExecutor::new(resolver, meta.clone(), &config);
        executor
            .run_once(std::slice::from_ref(&volume), &AtomicBool::new(false))
            .unwrap();
        assert!(!meta.record_exists(5).unwrap());
    }
}
