use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use strata::lifecycle::{OrphanScanner, PurgeExecutor};
use strata::meta::{MemoryMeta, MetaLookup, RecordKey};
use strata::volume::LocalDiskProbe;
use strata::{Store, StoreConfig, Volume};
use tempfile::tempdir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn key(id: u64) -> RecordKey {
    RecordKey {
        id,
        feed: "Sweep-Feed".to_string(),
        stream_type: "Raw Events".to_string(),
        created: SystemTime::now(),
    }
}

fn write_record(store: &Store, meta: &MemoryMeta, id: u64) -> RecordKey {
    let key = key(id);
    let mut target = store.open_target(&key).expect("open target");
    meta.insert(key.clone(), target.volume_id());
    target.raw().write_all(b"payload").expect("write");
    target.close().expect("close");
    key
}

#[test]
fn orphan_scan_removes_unreferenced_records() {
    init_logging();
    let dir = tempdir().expect("tempdir");
    let volume = Volume::new(1, dir.path());
    let meta = Arc::new(MemoryMeta::new());
    let config = StoreConfig {
        block_size: 1000,
        // Age protection off so freshly written orphans qualify.
        min_orphan_age: Duration::ZERO,
        ..StoreConfig::default()
    };
    let store = Store::new(config.clone(), meta.clone(), Box::new(LocalDiskProbe)).expect("store");
    store.set_volumes(vec![volume.clone()]);

    let live = write_record(&store, &meta, 1);
    let orphan = write_record(&store, &meta, 2);
    // Record 2 vanishes from metadata: its files become orphans.
    meta.forget(&[2]).expect("forget");

    let scanner = OrphanScanner::new(meta.clone(), &config);
    let progress = scanner.scan(&volume, &AtomicBool::new(false)).expect("scan");

    // Both records wrote a data container and its segment index.
    assert_eq!(progress.orphans_found.load(Ordering::Relaxed), 2);
    assert_eq!(progress.deleted.load(Ordering::Relaxed), 2);
    assert_eq!(progress.too_new.load(Ordering::Relaxed), 0);

    let live_source = store.open_source(&live).expect("open source");
    assert!(live_source.open_raw().expect("open raw").is_some());

    // A second pass finds nothing left to do.
    let progress = scanner.scan(&volume, &AtomicBool::new(false)).expect("scan");
    assert_eq!(progress.orphans_found.load(Ordering::Relaxed), 0);
    let _ = orphan;
}

#[test]
fn young_orphans_survive_until_old_enough() {
    init_logging();
    let dir = tempdir().expect("tempdir");
    let volume = Volume::new(1, dir.path());
    let meta = Arc::new(MemoryMeta::new());
    let config = StoreConfig {
        block_size: 1000,
        min_orphan_age: Duration::from_secs(3600),
        ..StoreConfig::default()
    };
    let store = Store::new(config.clone(), meta.clone(), Box::new(LocalDiskProbe)).expect("store");
    store.set_volumes(vec![volume.clone()]);

    write_record(&store, &meta, 7);
    meta.forget(&[7]).expect("forget");

    let scanner = OrphanScanner::new(meta.clone(), &config);
    let progress = scanner.scan(&volume, &AtomicBool::new(false)).expect("scan");
    assert_eq!(progress.orphans_found.load(Ordering::Relaxed), 2);
    assert_eq!(progress.too_new.load(Ordering::Relaxed), 2);
    assert_eq!(progress.deleted.load(Ordering::Relaxed), 0);
}

#[test]
fn purge_runs_off_metadata_not_directories() {
    init_logging();
    let dir = tempdir().expect("tempdir");
    let volume = Volume::new(1, dir.path());
    let meta = Arc::new(MemoryMeta::new());
    let config = StoreConfig {
        block_size: 1000,
        purge_age: Duration::from_secs(60),
        ..StoreConfig::default()
    };
    let store = Store::new(config.clone(), meta.clone(), Box::new(LocalDiskProbe)).expect("store");
    store.set_volumes(vec![volume.clone()]);

    let doomed = write_record(&store, &meta, 10);
    let kept = write_record(&store, &meta, 11);
    meta.mark_deleted(10, SystemTime::now() - Duration::from_secs(600));

    let executor = PurgeExecutor::new(store.resolver().clone(), meta.clone(), &config);
    let progress = executor
        .run_once(&[volume], &AtomicBool::new(false))
        .expect("purge");

    assert_eq!(progress.deleted.load(Ordering::Relaxed), 2);
    assert!(!meta.record_exists(10).expect("lookup"));
    assert!(meta.record_exists(11).expect("lookup"));

    assert!(store.open_source(&kept).expect("source").open_raw().expect("raw").is_some());
    assert!(store.open_source(&doomed).is_err());
}
