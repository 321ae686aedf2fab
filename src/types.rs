//! Core data types shared by the pipeline stages
//!
//! Entries flow Walker → Change Detector → Hasher → Saver as [`FileEntry`]
//! and then [`HashedEntry`]. Paths are converted to their stored form by
//! [`PathCanon`] exactly once, on the walker thread.

use std::ffi::OsStr;
use std::fs::Metadata;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::time::UNIX_EPOCH;

/// A regular file discovered by the walker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// On-disk path, used for reading content
    pub path: PathBuf,

    /// Canonical parent directory path (trailing separator)
    pub dir: String,

    /// Canonical file name
    pub name: String,

    /// Size in bytes
    pub size: u64,

    /// Last modification, unix seconds
    pub mtime: i64,
}

impl FileEntry {
    /// Size and mtime as stored in the index
    pub fn meta(&self) -> FileMeta {
        FileMeta {
            size: self.size,
            mtime: self.mtime,
        }
    }
}

/// The change-detection key of a file record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    pub size: u64,
    pub mtime: i64,
}

/// Content fingerprint of a file record
///
/// Stored as two columns: a nullable hex `digest` and an `unreadable` flag,
/// so a failed read is never mistaken for a real digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentDigest {
    /// Hex-encoded digest of the file's bytes
    Computed(String),

    /// Zero-byte file; nothing was read
    Empty,

    /// The file could not be opened or read
    Unreadable,
}

impl ContentDigest {
    /// Column values `(digest, unreadable)`
    pub fn to_columns(&self) -> (Option<&str>, bool) {
        match self {
            ContentDigest::Computed(hex) => (Some(hex.as_str()), false),
            ContentDigest::Empty => (None, false),
            ContentDigest::Unreadable => (None, true),
        }
    }

    /// Rebuild from column values
    pub fn from_columns(digest: Option<String>, unreadable: bool) -> Self {
        match (digest, unreadable) {
            (_, true) => ContentDigest::Unreadable,
            (Some(hex), false) => ContentDigest::Computed(hex),
            (None, false) => ContentDigest::Empty,
        }
    }

    /// Hex digest, if one was computed
    pub fn hex(&self) -> Option<&str> {
        match self {
            ContentDigest::Computed(hex) => Some(hex),
            _ => None,
        }
    }
}

/// An entry ready for the saver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedEntry {
    pub entry: FileEntry,
    pub digest: ContentDigest,
}

/// Converts on-disk paths to their stored, exact-match form
///
/// Directory paths always carry a trailing separator. With case folding
/// enabled, directory paths and file names are upper-cased.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathCanon {
    fold_case: bool,
}

impl PathCanon {
    pub fn new(fold_case: bool) -> Self {
        Self { fold_case }
    }

    /// Fold on platforms whose filesystems are case-insensitive by default
    pub fn platform_default() -> Self {
        Self::new(cfg!(any(windows, target_os = "macos")))
    }

    pub fn fold_case(&self) -> bool {
        self.fold_case
    }

    /// Stored form of a directory path
    pub fn dir_path(&self, path: &Path) -> String {
        let mut s = self.fold(path.to_string_lossy().into_owned());
        if !s.ends_with(std::path::is_separator) {
            s.push(MAIN_SEPARATOR);
        }
        s
    }

    /// Stored form of a file name
    pub fn file_name(&self, name: &OsStr) -> String {
        self.fold(name.to_string_lossy().into_owned())
    }

    fn fold(&self, s: String) -> String {
        if self.fold_case {
            s.to_uppercase()
        } else {
            s
        }
    }
}

impl Default for PathCanon {
    fn default() -> Self {
        Self::platform_default()
    }
}

/// Join a stored directory path and a file name back into a filesystem path
pub fn join_stored(dir: &str, name: &str) -> PathBuf {
    Path::new(dir).join(name)
}

/// Modification time in unix seconds; negative before the epoch
pub fn unix_mtime(meta: &Metadata) -> i64 {
    match meta.modified() {
        Ok(time) => match time.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => -(e.duration().as_secs() as i64),
        },
        Err(_) => 0,
    }
}
