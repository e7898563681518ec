//! Filesystem-event producer.
//!
//! Wraps a recursive `notify` watcher behind `notify-debouncer-full`, which
//! stitches renames together and folds the modify events that follow a
//! create. Debounced create, modify and move-destination events for candidate
//! paths go onto a tokio channel. Delivery is best effort: platforms and
//! network mounts may drop or coalesce events, which the periodic rescan
//! makes up for.
//!
//! The debouncer still emits once per write when a copy trickles in slower
//! than its window, so [`PendingChanges`] holds each path back until it has
//! been quiet for the settle delay.

use globset::GlobSet;
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{
    new_debouncer, DebounceEventResult, DebouncedEvent, Debouncer, RecommendedCache,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error};

use crate::connector_fs;
use crate::models::FileKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Moved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

/// Keeps the debouncer and its watcher alive; dropping it stops event delivery.
pub struct FsWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl FsWatcher {
    /// Starts watching `root` recursively. Changes reach `tx` once the
    /// debouncer has held them for `window`.
    pub fn start(
        root: &Path,
        window: Duration,
        excludes: GlobSet,
        tx: UnboundedSender<FileChange>,
    ) -> Result<Self, notify::Error> {
        let root = root.canonicalize()?;
        let base = root.clone();
        let mut debouncer = new_debouncer(window, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    for change in coalesce(&events) {
                        if connector_fs::is_excluded(&excludes, &base, &change.path) {
                            continue;
                        }
                        debug!("{:?} {}", change.kind, change.path.display());
                        // Receiver gone means the daemon is shutting down.
                        if tx.send(change).is_err() {
                            break;
                        }
                    }
                }
                Err(errors) => {
                    for e in errors {
                        error!("Watch error: {}", e);
                    }
                }
            }
        })?;

        debouncer.watch(&root, RecursiveMode::Recursive)?;
        debug!("Watching {} (debounce {:?})", root.display(), window);
        Ok(Self {
            _debouncer: debouncer,
        })
    }
}

/// Maps a debounced event to a change worth evaluating.
///
/// Removals, accesses, metadata-only changes, directory creation and the
/// source half of a rename are dropped, as are paths without a supported
/// extension.
pub fn convert_event(event: &DebouncedEvent) -> Option<FileChange> {
    let (kind, path) = match &event.kind {
        EventKind::Create(CreateKind::Folder) => return None,
        EventKind::Create(_) => (ChangeKind::Created, event.paths.first()?),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => return None,
        // Both carries [from, to]; To carries only the destination.
        EventKind::Modify(ModifyKind::Name(_)) => (ChangeKind::Moved, event.paths.last()?),
        EventKind::Modify(ModifyKind::Metadata(_)) => return None,
        EventKind::Modify(_) => (ChangeKind::Modified, event.paths.first()?),
        _ => return None,
    };

    FileKind::from_path(path)?;

    Some(FileChange {
        kind,
        path: path.clone(),
    })
}

/// Converts one debounced batch, keeping the first change per path.
pub fn coalesce(events: &[DebouncedEvent]) -> Vec<FileChange> {
    let mut changes: Vec<FileChange> = Vec::new();
    for change in events.iter().filter_map(convert_event) {
        if !changes.iter().any(|c| c.path == change.path) {
            changes.push(change);
        }
    }
    changes
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    kind: ChangeKind,
    last_seen: Instant,
}

/// Changes waiting for their path to go quiet.
///
/// Every new change for a path restarts its quiet period, so a file written
/// in many chunks is released once, after the last chunk.
#[derive(Debug)]
pub struct PendingChanges {
    quiet: Duration,
    pending: HashMap<PathBuf, Pending>,
}

impl PendingChanges {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: HashMap::new(),
        }
    }

    /// Queues `change`, keeping the kind first seen for its path.
    pub fn enqueue(&mut self, change: FileChange, now: Instant) {
        self.pending
            .entry(change.path)
            .and_modify(|p| p.last_seen = now)
            .or_insert(Pending {
                kind: change.kind,
                last_seen: now,
            });
    }

    /// Removes and returns every change quiet for at least the quiet period,
    /// oldest first.
    pub fn flush_ready(&mut self, now: Instant) -> Vec<FileChange> {
        let quiet = self.quiet;
        let mut ready: Vec<(PathBuf, Pending)> = self
            .pending
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.last_seen) >= quiet)
            .map(|(path, p)| (path.clone(), *p))
            .collect();
        ready.sort_by(|(left_path, left), (right_path, right)| {
            left.last_seen
                .cmp(&right.last_seen)
                .then_with(|| left_path.cmp(right_path))
        });

        ready
            .into_iter()
            .map(|(path, p)| {
                self.pending.remove(&path);
                FileChange { kind: p.kind, path }
            })
            .collect()
    }

    /// When the next path becomes ready, if any is pending.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .map(|p| p.last_seen + self.quiet)
            .min()
    }
}
