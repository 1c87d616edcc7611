use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters for a sweep. Shared across concurrent
/// per-directory tasks; every update is an atomic increment.
#[derive(Debug, Default)]
pub struct ScanProgress {
    pub dirs_scanned: AtomicU64,
    pub files_scanned: AtomicU64,
    pub orphans_found: AtomicU64,
    /// Orphans younger than the minimum age, skipped this pass.
    pub too_new: AtomicU64,
    pub deleted: AtomicU64,
    pub delete_failures: AtomicU64,
    pub tasks_pending: AtomicU64,
    pub tasks_complete: AtomicU64,
}

impl ScanProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> String {
        format!(
            "dirs: {}, files: {}, orphans: {}, too new: {}, deleted: {}, failures: {}",
            self.dirs_scanned.load(Ordering::Relaxed),
            self.files_scanned.load(Ordering::Relaxed),
            self.orphans_found.load(Ordering::Relaxed),
            self.too_new.load(Ordering::Relaxed),
            self.deleted.load(Ordering::Relaxed),
            self.delete_failures.load(Ordering::Relaxed),
        )
    }
}
