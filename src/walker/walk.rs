//! Single-threaded directory traversal
//!
//! Emits one [`FileEntry`] per regular file under the root. Directories are
//! not emitted; their records are created by the saver and the hierarchy
//! resolver. Symlinks are not followed and not indexed.

use crate::error::EntryError;
use crate::types::{unix_mtime, FileEntry, PathCanon};
use regex::Regex;
use std::cell::Cell;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};
use walkdir::{DirEntry, WalkDir};

/// Counters for one traversal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkSummary {
    /// Regular files emitted
    pub files: u64,

    /// Sum of emitted file sizes
    pub bytes: u64,

    /// Entries that failed to list or stat
    pub errors: u64,

    /// Symlinks, sockets and other non-regular entries
    pub skipped: u64,

    /// Subtrees pruned by exclude patterns
    pub excluded: u64,

    /// False if the consumer stopped the walk early
    pub completed: bool,
}

/// Recursive walker over a single root
#[derive(Debug, Clone)]
pub struct Walker {
    root: PathBuf,
    canon: PathCanon,
    exclude_patterns: Vec<Regex>,
}

impl Walker {
    pub fn new(root: impl Into<PathBuf>, canon: PathCanon) -> Self {
        Self {
            root: root.into(),
            canon,
            exclude_patterns: Vec::new(),
        }
    }

    /// Prune any path matching one of `patterns`
    pub fn with_excludes(mut self, patterns: Vec<Regex>) -> Self {
        self.exclude_patterns = patterns;
        self
    }

    /// Walk the tree, handing every file to `emit`
    ///
    /// `emit` returns `Break` when downstream has gone away, which ends the
    /// walk with `completed = false`. An `Err` from `emit` is fatal and
    /// returned as-is. Per-entry filesystem errors are logged and skipped.
    pub fn walk<F, E>(&self, mut emit: F) -> Result<WalkSummary, E>
    where
        F: FnMut(FileEntry) -> Result<ControlFlow<()>, E>,
    {
        let mut summary = WalkSummary::default();
        let excluded = Cell::new(0u64);

        let iter = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                let skip = e.depth() > 0 && self.is_excluded(e.path());
                if skip {
                    debug!(path = %e.path().display(), "Excluded");
                    excluded.set(excluded.get() + 1);
                }
                !skip
            });

        for item in iter {
            let dent = match item {
                Ok(dent) => dent,
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone());
                    report(&EntryError::Traversal { path, source: err });
                    summary.errors += 1;
                    continue;
                }
            };

            let file_type = dent.file_type();
            if file_type.is_dir() {
                trace!(path = %dent.path().display(), "Entering directory");
                continue;
            }
            if !file_type.is_file() {
                debug!(path = %dent.path().display(), "Skipping non-regular entry");
                summary.skipped += 1;
                continue;
            }

            let entry = match self.file_entry(&dent) {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(err) => {
                    report(&err);
                    summary.errors += 1;
                    continue;
                }
            };

            summary.files += 1;
            summary.bytes += entry.size;

            if emit(entry)?.is_break() {
                debug!("Consumer closed, stopping walk");
                summary.excluded = excluded.get();
                return Ok(summary);
            }
        }

        summary.excluded = excluded.get();
        summary.completed = true;
        Ok(summary)
    }

    fn file_entry(&self, dent: &DirEntry) -> Result<Option<FileEntry>, EntryError> {
        let path = dent.path();
        let Some(parent) = path.parent() else {
            return Ok(None);
        };

        let meta = path.symlink_metadata().map_err(|source| EntryError::Metadata {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Some(FileEntry {
            path: path.to_path_buf(),
            dir: self.canon.dir_path(parent),
            name: self.canon.file_name(dent.file_name()),
            size: meta.len(),
            mtime: unix_mtime(&meta),
        }))
    }

    fn is_excluded(&self, path: &Path) -> bool {
        if self.exclude_patterns.is_empty() {
            return false;
        }
        let path = path.to_string_lossy();
        self.exclude_patterns.iter().any(|re| re.is_match(&path))
    }
}

fn report(err: &EntryError) {
    // Vanishing entries are routine on live filesystems
    if err.is_vanished() {
        debug!("{}", err);
    } else {
        warn!("{}", err);
    }
}
