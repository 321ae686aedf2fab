//! Hasher pool
//!
//! N worker threads share one bounded inbound channel of entries that need
//! a digest and one bounded outbound channel to the saver. A worker exits
//! when the inbound channel is closed and drained, or when the saver has
//! gone away. A file that cannot be read is forwarded as
//! [`ContentDigest::Unreadable`]; it never stops the worker.

use crate::content::{hash_file, ContentHasher};
use crate::error::WorkerError;
use crate::types::{ContentDigest, FileEntry, HashedEntry};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Statistics collected by the hasher workers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HasherStats {
    /// Files digested successfully
    pub hashed: u64,

    /// Bytes streamed through the digest
    pub bytes: u64,

    /// Files recorded as unreadable
    pub unreadable: u64,
}

impl HasherStats {
    fn merge(&mut self, other: &HasherStats) {
        self.hashed += other.hashed;
        self.bytes += other.bytes;
        self.unreadable += other.unreadable;
    }
}

/// Running hasher workers
pub struct HasherPool {
    handles: Vec<JoinHandle<HasherStats>>,
}

impl HasherPool {
    /// Spawn `workers` threads reading from `input` and writing to `output`
    ///
    /// The pool takes ownership of both channel ends; the outbound channel
    /// closes once every worker has exited.
    pub fn spawn(
        workers: usize,
        hasher: Arc<dyn ContentHasher>,
        input: Receiver<FileEntry>,
        output: Sender<HashedEntry>,
    ) -> Result<Self, WorkerError> {
        let mut handles = Vec::with_capacity(workers);

        for id in 0..workers.max(1) {
            let hasher = Arc::clone(&hasher);
            let input = input.clone();
            let output = output.clone();

            let handle = thread::Builder::new()
                .name(format!("hasher-{}", id))
                .spawn(move || hasher_loop(id, hasher.as_ref(), input, output))
                .map_err(|e| WorkerError::SpawnFailed {
                    stage: format!("hasher-{}", id),
                    reason: e.to_string(),
                })?;
            handles.push(handle);
        }

        Ok(Self { handles })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to finish and combine their statistics
    pub fn join(self) -> Result<HasherStats, WorkerError> {
        let mut total = HasherStats::default();
        let mut panicked = None;

        for (id, handle) in self.handles.into_iter().enumerate() {
            match handle.join() {
                Ok(stats) => total.merge(&stats),
                Err(_) => {
                    panicked.get_or_insert(id);
                }
            }
        }

        match panicked {
            Some(id) => Err(WorkerError::Panicked {
                stage: format!("hasher-{}", id),
            }),
            None => Ok(total),
        }
    }
}

/// Digest one entry; unreadable files are marked, not failed
pub fn digest_entry(hasher: &dyn ContentHasher, entry: &FileEntry) -> ContentDigest {
    match hash_file(hasher, &entry.path) {
        Ok(hex) => ContentDigest::Computed(hex),
        Err(err) => {
            if err.is_vanished() {
                debug!("{}", err);
            } else {
                warn!("{}", err);
            }
            ContentDigest::Unreadable
        }
    }
}

fn hasher_loop(
    id: usize,
    hasher: &dyn ContentHasher,
    input: Receiver<FileEntry>,
    output: Sender<HashedEntry>,
) -> HasherStats {
    debug!("Hasher {} started", id);
    let mut stats = HasherStats::default();

    for entry in input.iter() {
        let digest = digest_entry(hasher, &entry);
        match digest {
            ContentDigest::Unreadable => stats.unreadable += 1,
            _ => {
                stats.hashed += 1;
                stats.bytes += entry.size;
            }
        }

        if output.send(HashedEntry { entry, digest }).is_err() {
            debug!("Hasher {} output closed", id);
            break;
        }
    }

    debug!(
        "Hasher {} finished: {} hashed, {} unreadable",
        id, stats.hashed, stats.unreadable
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{compute_blake3, Blake3Hasher};
    use crossbeam_channel::bounded;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn entry_for(path: &Path, size: u64) -> FileEntry {
        FileEntry {
            path: path.to_path_buf(),
            dir: "/".into(),
            name: path.file_name().unwrap().to_string_lossy().into_owned(),
            size,
            mtime: 0,
        }
    }

    #[test]
    fn test_pool_hashes_every_entry_once() {
        let dir = tempdir().unwrap();
        let (in_tx, in_rx) = bounded(4);
        let (out_tx, out_rx) = bounded(4);

        let pool = HasherPool::spawn(3, Arc::new(Blake3Hasher), in_rx, out_tx).unwrap();
        assert_eq!(pool.len(), 3);

        let producer = {
            let base = dir.path().to_path_buf();
            thread::spawn(move || {
                for i in 0..20 {
                    let path = base.join(format!("f{}", i));
                    fs::write(&path, format!("content {}", i)).unwrap();
                    in_tx.send(entry_for(&path, 9)).unwrap();
                }
            })
        };

        // Output closes on its own once input is exhausted
        let mut results: Vec<HashedEntry> = out_rx.iter().collect();
        producer.join().unwrap();
        let stats = pool.join().unwrap();

        assert_eq!(results.len(), 20);
        assert_eq!(stats.hashed, 20);
        assert_eq!(stats.unreadable, 0);

        results.sort_by(|a, b| a.entry.name.cmp(&b.entry.name));
        let f0 = results.iter().find(|r| r.entry.name == "f0").unwrap();
        assert_eq!(f0.digest, ContentDigest::Computed(compute_blake3(b"content 0")));
    }

    #[test]
    fn test_unreadable_file_is_marked() {
        let dir = tempdir().unwrap();
        let (in_tx, in_rx) = bounded(2);
        let (out_tx, out_rx) = bounded(2);

        let pool = HasherPool::spawn(1, Arc::new(Blake3Hasher), in_rx, out_tx).unwrap();
        in_tx.send(entry_for(&dir.path().join("vanished"), 10)).unwrap();
        drop(in_tx);

        let result = out_rx.recv().unwrap();
        assert_eq!(result.digest, ContentDigest::Unreadable);
        assert!(out_rx.recv().is_err());

        let stats = pool.join().unwrap();
        assert_eq!(stats.unreadable, 1);
    }

    #[test]
    fn test_workers_exit_when_output_closes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"data").unwrap();

        let (in_tx, in_rx) = bounded(8);
        let (out_tx, out_rx) = bounded(1);
        drop(out_rx);

        let pool = HasherPool::spawn(2, Arc::new(Blake3Hasher), in_rx, out_tx).unwrap();
        for _ in 0..4 {
            let _ = in_tx.send(entry_for(&path, 4));
        }
        // Workers stop at their first failed send; join must not hang
        let stats = pool.join().unwrap();
        assert!(stats.hashed <= 4);
    }
}
