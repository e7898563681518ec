//! Processing ledger.
//!
//! Maps each watched path to the fingerprint of its last successfully indexed
//! content. Entries are only written after the store accepted the document,
//! so a crash mid-file leaves the path looking unprocessed and the next pass
//! retries it. The ledger is memory-only: after a restart every file is
//! reconsidered, and re-indexing is idempotent because the store upserts by
//! filename.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::ContentFingerprint;

#[derive(Default)]
pub struct Ledger {
    entries: Mutex<HashMap<PathBuf, ContentFingerprint>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// `false` iff `path` was last indexed with exactly `fp`.
    pub fn should_process(&self, path: &Path, fp: &ContentFingerprint) -> bool {
        self.entries.lock().get(path) != Some(fp)
    }

    /// Records `fp` as the indexed version of `path`, replacing any earlier entry.
    pub fn mark_done(&self, path: &Path, fp: ContentFingerprint) {
        self.entries.lock().insert(path.to_path_buf(), fp);
    }

    pub fn get(&self, path: &Path) -> Option<ContentFingerprint> {
        self.entries.lock().get(path).copied()
    }

    /// Snapshot of every tracked path.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Drops the entries for `paths`. Returns the number removed.
    pub fn remove_all(&self, paths: &[PathBuf]) -> usize {
        let mut entries = self.entries.lock();
        paths.iter().filter(|p| entries.remove(*p).is_some()).count()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// One async mutex per path, so two evaluations of the same file never overlap.
///
/// Different paths never contend. Entries nobody holds are idle and may be
/// released; the next `lock_for` on that path starts a fresh mutex.
#[derive(Default)]
pub struct PathLocks {
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(path.to_path_buf())
            .or_default()
            .clone()
    }

    /// Paths whose lock is neither held nor awaited.
    pub fn idle_paths(&self) -> Vec<PathBuf> {
        self.locks
            .lock()
            .iter()
            .filter(|(_, lock)| Arc::strong_count(lock) == 1)
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Drops the locks for `paths` that are still idle. Returns the number removed.
    ///
    /// Clones are only handed out under the table mutex, so a count of one
    /// checked here cannot race with `lock_for`.
    pub fn release_idle(&self, paths: &[PathBuf]) -> usize {
        let mut locks = self.locks.lock();
        let mut released = 0;
        for path in paths {
            if locks
                .get(path)
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
            {
                locks.remove(path);
                released += 1;
            }
        }
        released
    }
}
