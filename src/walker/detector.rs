//! Change detection
//!
//! Decides, per walked file, whether its stored digest is still trusted.
//! A file whose stored size and mtime both match is dropped here and never
//! reaches the hasher or the saver. This is the only place that skips work,
//! which keeps the pipeline free of feedback edges.
//!
//! The digest is trusted on (size, mtime) alone: content rewritten in place
//! with the same size and a restored mtime goes unnoticed.

use crate::db::MetadataRead;
use crate::error::{DbResult, IndexError, Result};
use crate::types::{ContentDigest, FileEntry, HashedEntry};
use crossbeam_channel::Sender;
use std::collections::HashMap;
use std::ops::ControlFlow;
use tracing::debug;

/// Where an entry goes next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Stored size and mtime match; drop
    Unchanged,

    /// Zero-byte file, straight to the saver
    Empty,

    /// Needs a digest
    Hash,
}

/// Per-route counts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectorStats {
    pub unchanged: u64,
    pub empty: u64,
    pub to_hash: u64,
}

/// Routes walked files to the hasher pool or the saver
pub struct ChangeDetector<R: MetadataRead> {
    reader: R,
    hash_tx: Sender<FileEntry>,
    save_tx: Sender<HashedEntry>,
    /// Directory ids as of the reader's snapshot; `None` means not indexed
    dir_ids: HashMap<String, Option<i64>>,
    stats: DetectorStats,
}

impl<R: MetadataRead> ChangeDetector<R> {
    pub fn new(reader: R, hash_tx: Sender<FileEntry>, save_tx: Sender<HashedEntry>) -> Self {
        Self {
            reader,
            hash_tx,
            save_tx,
            dir_ids: HashMap::new(),
            stats: DetectorStats::default(),
        }
    }

    /// Decide what to do with an entry without sending it anywhere
    pub fn classify(&mut self, entry: &FileEntry) -> DbResult<Route> {
        if let Some(dir_id) = self.dir_id(&entry.dir)? {
            if self.reader.get_file_meta(dir_id, &entry.name)? == Some(entry.meta()) {
                return Ok(Route::Unchanged);
            }
        }

        if entry.size == 0 {
            Ok(Route::Empty)
        } else {
            Ok(Route::Hash)
        }
    }

    /// Classify and forward an entry
    ///
    /// Returns `Break` once the downstream stage has shut down.
    pub fn route(&mut self, entry: FileEntry) -> Result<ControlFlow<()>> {
        let route = self.classify(&entry).map_err(IndexError::Database)?;
        debug!(path = %entry.path.display(), ?route, "Routed");

        let sent = match route {
            Route::Unchanged => {
                self.stats.unchanged += 1;
                return Ok(ControlFlow::Continue(()));
            }
            Route::Empty => {
                self.stats.empty += 1;
                self.save_tx
                    .send(HashedEntry {
                        entry,
                        digest: ContentDigest::Empty,
                    })
                    .is_ok()
            }
            Route::Hash => {
                self.stats.to_hash += 1;
                self.hash_tx.send(entry).is_ok()
            }
        };

        Ok(if sent {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(())
        })
    }

    pub fn stats(&self) -> &DetectorStats {
        &self.stats
    }

    /// Drop both senders and return the final counts
    pub fn finish(self) -> DetectorStats {
        self.stats
    }

    fn dir_id(&mut self, dir: &str) -> DbResult<Option<i64>> {
        if let Some(id) = self.dir_ids.get(dir) {
            return Ok(*id);
        }
        let id = self.reader.lookup_directory(dir)?;
        self.dir_ids.insert(dir.to_string(), id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MetadataStore, SqliteStore};
    use crate::types::FileMeta;
    use crossbeam_channel::unbounded;
    use std::path::PathBuf;

    fn entry(dir: &str, name: &str, size: u64, mtime: i64) -> FileEntry {
        FileEntry {
            path: PathBuf::from(format!("{}{}", dir, name)),
            dir: dir.to_string(),
            name: name.to_string(),
            size,
            mtime,
        }
    }

    fn seeded_store() -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let dir = store.get_or_create_directory("/a/").unwrap();
        store
            .upsert_file(
                dir,
                "f1.txt",
                FileMeta { size: 10, mtime: 100 },
                &ContentDigest::Computed("aa".into()),
            )
            .unwrap();
        store
            .upsert_file(dir, "empty", FileMeta { size: 0, mtime: 5 }, &ContentDigest::Empty)
            .unwrap();
        store.commit_batch().unwrap();
        store
    }

    #[test]
    fn test_classify() {
        let (hash_tx, _hash_rx) = unbounded();
        let (save_tx, _save_rx) = unbounded();
        let mut detector = ChangeDetector::new(seeded_store(), hash_tx, save_tx);

        assert_eq!(
            detector.classify(&entry("/a/", "f1.txt", 10, 100)).unwrap(),
            Route::Unchanged
        );
        // mtime changed, same size
        assert_eq!(
            detector.classify(&entry("/a/", "f1.txt", 10, 200)).unwrap(),
            Route::Hash
        );
        // size changed, same mtime
        assert_eq!(
            detector.classify(&entry("/a/", "f1.txt", 11, 100)).unwrap(),
            Route::Hash
        );
        assert_eq!(
            detector.classify(&entry("/a/", "new.txt", 3, 1)).unwrap(),
            Route::Hash
        );
        assert_eq!(
            detector.classify(&entry("/unknown/", "x", 3, 1)).unwrap(),
            Route::Hash
        );
        // zero-byte: unchanged still wins, otherwise bypasses hashing
        assert_eq!(
            detector.classify(&entry("/a/", "empty", 0, 5)).unwrap(),
            Route::Unchanged
        );
        assert_eq!(
            detector.classify(&entry("/a/", "empty", 0, 6)).unwrap(),
            Route::Empty
        );
    }

    #[test]
    fn test_route_forwards_to_the_right_stage() {
        let (hash_tx, hash_rx) = unbounded();
        let (save_tx, save_rx) = unbounded();
        let mut detector = ChangeDetector::new(seeded_store(), hash_tx, save_tx);

        detector.route(entry("/a/", "f1.txt", 10, 100)).unwrap();
        detector.route(entry("/a/", "f1.txt", 10, 101)).unwrap();
        detector.route(entry("/b/", "zero", 0, 1)).unwrap();
        let stats = detector.finish();

        assert_eq!(
            stats,
            DetectorStats {
                unchanged: 1,
                empty: 1,
                to_hash: 1
            }
        );

        let hashed: Vec<_> = hash_rx.iter().collect();
        assert_eq!(hashed.len(), 1);
        assert_eq!(hashed[0].mtime, 101);

        let saved: Vec<_> = save_rx.iter().collect();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].digest, ContentDigest::Empty);
    }

    #[test]
    fn test_route_breaks_when_downstream_is_gone() {
        let (hash_tx, hash_rx) = unbounded();
        let (save_tx, _save_rx) = unbounded();
        drop(hash_rx);

        let mut detector = ChangeDetector::new(seeded_store(), hash_tx, save_tx);
        let flow = detector.route(entry("/a/", "new", 1, 1)).unwrap();
        assert!(flow.is_break());
    }
}
