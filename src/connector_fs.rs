//! Recursive listing of the watched directory.
//!
//! Used by every rescan. Returns the paths of supported documents only,
//! sorted, with `.git` trees, hidden files and configured globs excluded.
//! Entries that cannot be read (permission errors, files removed during the
//! walk) are skipped; the next rescan sees them again.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::WatchConfig;
use crate::models::FileKind;

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/.*"];

/// Lists supported documents under `watch.root`.
///
/// Paths are rooted at the canonical form of the watch root, which is also
/// what the watcher reports, so both producers hit the same ledger entry.
pub fn scan_directory(watch: &WatchConfig) -> Result<Vec<PathBuf>> {
    if !watch.root.is_dir() {
        bail!("Watch root is not a directory: {}", watch.root.display());
    }
    let root = watch
        .root
        .canonicalize()
        .with_context(|| format!("Cannot resolve watch root: {}", watch.root.display()))?;

    let excludes = build_excludes(&watch.exclude_globs)?;

    let mut paths = Vec::new();
    let walker = WalkDir::new(&root).follow_links(watch.follow_symlinks);
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if is_excluded(&excludes, &root, path) {
            continue;
        }
        if FileKind::from_path(path).is_none() {
            continue;
        }

        paths.push(path.to_path_buf());
    }

    // Sort for deterministic ordering
    paths.sort();

    Ok(paths)
}

/// Built-in excludes plus the configured `exclude_globs`.
pub fn build_excludes(extra: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in DEFAULT_EXCLUDES {
        builder.add(Glob::new(pattern)?);
    }
    for pattern in extra {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Matches `path` relative to `root` against `excludes`.
pub fn is_excluded(excludes: &GlobSet, root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    excludes.is_match(relative)
}
