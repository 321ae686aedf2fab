//! Live-check and garbage collection
//!
//! Re-tests every stored path against the filesystem and removes records
//! whose paths no longer exist. Runs after the crawl and hierarchy
//! resolution, on the same store handle, never alongside a crawl.
//!
//! 1. every directory record is stat'ed and its live flag set in bulk
//! 2. every file under a live directory is stat'ed the same way
//! 3. dead records, then orphans, are deleted in one transaction

use crate::db::{keys, MetadataStore, SqliteStore};
use crate::error::Result;
use crate::progress::ProgressReporter;
use crate::types::join_stored;
use chrono::Utc;
use std::fs::{self, Metadata};
use std::io::{self, ErrorKind};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Records checked between status refreshes
const STATUS_INTERVAL: usize = 1000;

/// Outcome of one live-check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveCheckReport {
    pub dirs_checked: u64,
    pub dirs_dead: u64,
    pub files_checked: u64,
    pub files_dead: u64,
    pub dirs_deleted: u64,
    pub files_deleted: u64,
    pub duration: Duration,
}

/// Test whether a stored directory path is an existing directory
pub fn directory_exists(path: &Path) -> bool {
    stat_matches(path, fs::metadata(path), true)
}

/// Test whether a stored file path exists and is not a directory
pub fn file_exists(path: &Path) -> bool {
    stat_matches(path, fs::symlink_metadata(path), false)
}

fn stat_matches(path: &Path, meta: io::Result<Metadata>, want_dir: bool) -> bool {
    match meta {
        Ok(meta) => meta.is_dir() == want_dir,
        // Unreadable is not gone; keep the record
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            warn!(path = %path.display(), "Permission denied during live-check, keeping record");
            true
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Not found");
            false
        }
    }
}

/// Run all three phases and commit
pub fn run(store: &mut SqliteStore, progress: Option<&ProgressReporter>) -> Result<LiveCheckReport> {
    let start = Instant::now();
    let mut report = LiveCheckReport::default();

    // Phase 1: directories
    let dirs = store.directories()?;
    let total = dirs.len();
    let (mut live, mut dead) = (Vec::new(), Vec::new());
    for (i, dir) in dirs.iter().enumerate() {
        status(progress, "Checking directories", i, total);
        if directory_exists(Path::new(&dir.path)) {
            live.push(dir.id);
        } else {
            dead.push(dir.id);
        }
    }
    store.set_directories_live(&live, true)?;
    store.set_directories_live(&dead, false)?;
    store.commit_batch()?;
    report.dirs_checked = total as u64;
    report.dirs_dead = dead.len() as u64;
    info!(checked = total, dead = dead.len(), "Directories checked");

    // Phase 2: files under live directories
    let files = store.files_in_live_directories()?;
    let total = files.len();
    let (mut live, mut dead) = (Vec::new(), Vec::new());
    for (i, file) in files.iter().enumerate() {
        status(progress, "Checking files", i, total);
        if file_exists(&join_stored(&file.dir_path, &file.name)) {
            live.push(file.id);
        } else {
            dead.push(file.id);
        }
    }
    store.set_files_live(&live, true)?;
    store.set_files_live(&dead, false)?;
    store.commit_batch()?;
    report.files_checked = total as u64;
    report.files_dead = dead.len() as u64;
    info!(checked = total, dead = dead.len(), "Files checked");

    // Phase 3: sweep
    if let Some(p) = progress {
        p.set_status("Removing dead records");
    }
    let swept = store.sweep()?;
    report.files_deleted = swept.files_deleted;
    report.dirs_deleted = swept.dirs_deleted;

    store.set_info(keys::LIVECHECK_TIME, &Utc::now().to_rfc3339())?;
    store.commit_batch()?;

    report.duration = start.elapsed();
    info!(
        files_deleted = report.files_deleted,
        dirs_deleted = report.dirs_deleted,
        duration_secs = report.duration.as_secs(),
        "Live-check completed"
    );
    Ok(report)
}

fn status(progress: Option<&ProgressReporter>, phase: &str, done: usize, total: usize) {
    if let Some(p) = progress {
        if done % STATUS_INTERVAL == 0 {
            p.set_status(&format!("{} ({}/{})", phase, done, total));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentDigest, FileMeta, PathCanon};
    use tempfile::tempdir;

    fn meta() -> FileMeta {
        FileMeta { size: 1, mtime: 1 }
    }

    #[test]
    fn test_existence_checks() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, b"x").unwrap();

        assert!(directory_exists(dir.path()));
        assert!(!directory_exists(&file));
        assert!(file_exists(&file));
        assert!(!file_exists(dir.path()));
        assert!(!file_exists(&dir.path().join("missing")));
    }

    #[test]
    fn test_livecheck_removes_vanished_records() {
        let tree = tempdir().unwrap();
        fs::create_dir_all(tree.path().join("keep")).unwrap();
        fs::create_dir_all(tree.path().join("gone")).unwrap();
        fs::write(tree.path().join("keep/a"), b"x").unwrap();
        fs::write(tree.path().join("keep/b"), b"x").unwrap();

        let canon = PathCanon::new(false);
        let keep_path = canon.dir_path(&tree.path().join("keep"));
        let gone_path = canon.dir_path(&tree.path().join("gone"));

        let mut store = SqliteStore::open_in_memory().unwrap();
        let keep = store.get_or_create_directory(&keep_path).unwrap();
        let gone = store.get_or_create_directory(&gone_path).unwrap();
        for name in ["a", "b"] {
            store
                .upsert_file(keep, name, meta(), &ContentDigest::Empty)
                .unwrap();
        }
        store
            .upsert_file(gone, "c", meta(), &ContentDigest::Empty)
            .unwrap();
        store.commit_batch().unwrap();

        fs::remove_file(tree.path().join("keep/b")).unwrap();
        fs::remove_dir(tree.path().join("gone")).unwrap();

        let report = run(&mut store, None).unwrap();
        assert_eq!(report.dirs_checked, 2);
        assert_eq!(report.dirs_dead, 1);
        // the file under the dead directory is not stat'ed
        assert_eq!(report.files_checked, 2);
        assert_eq!(report.files_dead, 1);
        assert_eq!(report.files_deleted, 2);
        assert_eq!(report.dirs_deleted, 1);

        assert!(store.file(&keep_path, "a").unwrap().is_some());
        assert!(store.file(&keep_path, "b").unwrap().is_none());
        assert!(store.directory(&gone_path).unwrap().is_none());
        assert!(store.info(keys::LIVECHECK_TIME).unwrap().is_some());
    }

    #[test]
    fn test_file_replaced_by_directory_is_dead() {
        let tree = tempdir().unwrap();
        fs::create_dir(tree.path().join("x")).unwrap();

        let dir_path = PathCanon::new(false).dir_path(tree.path());
        let mut store = SqliteStore::open_in_memory().unwrap();
        let dir = store.get_or_create_directory(&dir_path).unwrap();
        store
            .upsert_file(dir, "x", meta(), &ContentDigest::Empty)
            .unwrap();

        let report = run(&mut store, None).unwrap();
        assert_eq!(report.files_dead, 1);
        assert!(store.files().unwrap().is_empty());
        assert_eq!(store.directories().unwrap().len(), 1);
    }
}
