//! Integration tests for hash-walker
//!
//! Each test builds a small tree under a temporary directory and drives
//! `run_index` against a temporary SQLite file.

use hash_walker::config::{canonical_root, IndexConfig};
use hash_walker::content::{compute_blake3, Blake3Hasher, ContentHasher};
use hash_walker::db::{keys, FileRecord, MetadataRead, SqliteStore};
use hash_walker::error::{DbError, IndexError};
use hash_walker::hierarchy::{parent_path, ParentPath};
use hash_walker::run::{run_index, RunReport};
use hash_walker::types::{ContentDigest, PathCanon};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::{tempdir, TempDir};

/// BLAKE3 that counts how many files it was asked to read
#[derive(Default)]
struct CountingHasher {
    calls: AtomicU64,
}

impl CountingHasher {
    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ContentHasher for CountingHasher {
    fn digest_reader(&self, reader: &mut dyn Read) -> io::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Blake3Hasher.digest_reader(reader)
    }
}

/// Fails on any content starting with `FAIL`
struct FailingHasher;

impl ContentHasher for FailingHasher {
    fn digest_reader(&self, reader: &mut dyn Read) -> io::Result<String> {
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        if content.starts_with(b"FAIL") {
            return Err(io::Error::new(io::ErrorKind::Other, "simulated read failure"));
        }
        Ok(compute_blake3(&content))
    }
}

struct Fixture {
    tree: TempDir,
    _db_dir: TempDir,
    config: IndexConfig,
}

impl Fixture {
    fn new(workers: usize) -> Self {
        let tree = tempdir().unwrap();
        let db_dir = tempdir().unwrap();

        let mut config = IndexConfig::new(db_dir.path().join("index.sqlite"));
        config.root = Some(canonical_root(tree.path()).unwrap());
        config.worker_count = workers;
        config.queue_size = 16;
        config.batch_size = 8;
        config.canon = PathCanon::new(false);

        Self {
            tree,
            _db_dir: db_dir,
            config,
        }
    }

    fn root(&self) -> &Path {
        self.config.root.as_deref().unwrap()
    }

    fn write(&self, rel: &str, content: &[u8]) {
        let path = self.tree.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Stored form of a directory under the root
    fn dir(&self, rel: &str) -> String {
        let path = if rel.is_empty() {
            self.root().to_path_buf()
        } else {
            self.root().join(rel)
        };
        self.config.canon.dir_path(&path)
    }

    fn run(&self, hasher: Arc<dyn ContentHasher>) -> RunReport {
        run_index(&self.config, hasher, None).unwrap()
    }

    fn store(&self) -> SqliteStore {
        SqliteStore::open(&self.config.store_path).unwrap()
    }

    fn file(&self, dir: &str, name: &str) -> Option<FileRecord> {
        self.store().file(&self.dir(dir), name).unwrap()
    }
}

fn set_mtime(path: &Path, secs: u64) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(UNIX_EPOCH + Duration::from_secs(secs)).unwrap();
}

fn mtime_of(path: &Path) -> SystemTime {
    fs::metadata(path).unwrap().modified().unwrap()
}

#[test]
fn test_scenario_crawl_rerun_touch_and_livecheck() {
    let fx = Fixture::new(2);
    fx.write("a/f1.txt", b"0123456789");
    fx.write("a/b/f2.txt", b"");
    let hasher = Arc::new(CountingHasher::default());

    // First crawl: one file hashed, the empty one written directly
    let report = fx.run(hasher.clone());
    let crawl = report.crawl.unwrap();
    assert_eq!(crawl.saver.inserted, 2);
    assert_eq!(hasher.calls(), 1);

    let f1 = fx.file("a", "f1.txt").unwrap();
    assert_eq!(f1.size, 10);
    assert_eq!(f1.digest, ContentDigest::Computed(compute_blake3(b"0123456789")));
    let f2 = fx.file("a/b", "f2.txt").unwrap();
    assert_eq!(f2.size, 0);
    assert_eq!(f2.digest, ContentDigest::Empty);

    // Every directory chain reaches a root record
    let store = fx.store();
    let b = store.directory(&fx.dir("a/b")).unwrap().unwrap();
    let a = store.directory(&fx.dir("a")).unwrap().unwrap();
    assert_eq!(b.parent_id, Some(a.id));
    let mut current = a;
    while let Some(parent) = current.parent_id {
        current = store.directory_by_id(parent).unwrap().unwrap();
    }
    assert_eq!(parent_path(&current.path), ParentPath::Root);
    drop(store);

    // Second crawl: nothing read, nothing written
    let before = fx.store().files().unwrap();
    let report = fx.run(hasher.clone());
    let crawl = report.crawl.unwrap();
    assert_eq!(crawl.detector.unchanged, 2);
    assert_eq!(crawl.saver.written(), 0);
    assert_eq!(hasher.calls(), 1);
    assert_eq!(fx.store().files().unwrap(), before);

    // Touch f1: rehashed and updated
    let f1_path = fx.tree.path().join("a/f1.txt");
    set_mtime(&f1_path, 1_000_000);
    let report = fx.run(hasher.clone());
    let crawl = report.crawl.unwrap();
    assert_eq!(crawl.saver.updated, 1);
    assert_eq!(hasher.calls(), 2);
    assert_eq!(fx.file("a", "f1.txt").unwrap().mtime, 1_000_000);

    // Remove a/b and live-check
    fs::remove_dir_all(fx.tree.path().join("a/b")).unwrap();
    let mut config = fx.config.clone();
    config.livecheck = true;
    let report = run_index(&config, hasher.clone(), None).unwrap();
    let live = report.livecheck.unwrap();
    assert_eq!(live.dirs_deleted, 1);
    assert_eq!(live.files_deleted, 1);

    let store = fx.store();
    assert!(store.directory(&fx.dir("a/b")).unwrap().is_none());
    assert!(store.file(&fx.dir("a/b"), "f2.txt").unwrap().is_none());
    assert!(store.file(&fx.dir("a"), "f1.txt").unwrap().is_some());
}

#[test]
fn test_same_size_and_mtime_is_not_rehashed() {
    let fx = Fixture::new(1);
    fx.write("doc.txt", b"0123456789");
    let path = fx.tree.path().join("doc.txt");
    let hasher = Arc::new(CountingHasher::default());

    fx.run(hasher.clone());
    let original = mtime_of(&path);

    // Same length, same mtime, different bytes
    fs::write(&path, b"abcdefghij").unwrap();
    File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(original)
        .unwrap();

    fx.run(hasher.clone());
    assert_eq!(hasher.calls(), 1);
    assert_eq!(
        fx.file("", "doc.txt").unwrap().digest,
        ContentDigest::Computed(compute_blake3(b"0123456789"))
    );

    // A size change is always picked up
    fs::write(&path, b"abcdefghijk").unwrap();
    fx.run(hasher.clone());
    assert_eq!(hasher.calls(), 2);
    assert_eq!(fx.file("", "doc.txt").unwrap().size, 11);
}

#[test]
fn test_every_file_upserted_once_for_any_worker_count() {
    for workers in [1, 2, 8] {
        let fx = Fixture::new(workers);
        let mut expected_hashes = 0;
        for d in 0..5 {
            for f in 0..20 {
                let content = if f % 7 == 0 {
                    Vec::new()
                } else {
                    expected_hashes += 1;
                    format!("dir {} file {}", d, f).into_bytes()
                };
                fx.write(&format!("d{}/sub/f{}", d, f), &content);
            }
        }

        let hasher = Arc::new(CountingHasher::default());
        let crawl = fx.run(hasher.clone()).crawl.unwrap();

        assert_eq!(crawl.walk.files, 100, "workers={}", workers);
        assert_eq!(crawl.saver.inserted, 100, "workers={}", workers);
        assert_eq!(crawl.saver.updated, 0, "workers={}", workers);
        assert_eq!(hasher.calls(), expected_hashes, "workers={}", workers);
        assert_eq!(fx.store().files().unwrap().len(), 100);

        let rec = fx.file("d3/sub", "f5").unwrap();
        assert_eq!(
            rec.digest,
            ContentDigest::Computed(compute_blake3(b"dir 3 file 5"))
        );
    }
}

#[test]
fn test_livecheck_leaves_unrelated_records_untouched() {
    let fx = Fixture::new(2);
    fx.write("x/one", b"1");
    fx.write("x/deep/two", b"22");
    fx.write("y/three", b"333");
    fx.write("y/nested/four", b"");
    fx.run(Arc::new(Blake3Hasher));

    let store = fx.store();
    let y_before: Vec<FileRecord> = store
        .files()
        .unwrap()
        .into_iter()
        .filter(|f| f.name == "three" || f.name == "four")
        .collect();
    let y_dir = store.directory(&fx.dir("y")).unwrap().unwrap();
    drop(store);
    assert_eq!(y_before.len(), 2);

    fs::remove_dir_all(fx.tree.path().join("x")).unwrap();

    // Live-check only, no crawl
    let mut config = fx.config.clone();
    config.root = None;
    config.livecheck = true;
    let report = run_index(&config, Arc::new(Blake3Hasher), None).unwrap();
    assert!(report.crawl.is_none());
    let live = report.livecheck.unwrap();
    assert_eq!(live.files_deleted, 2);
    assert_eq!(live.dirs_deleted, 2);

    let store = fx.store();
    let files = store.files().unwrap();
    assert_eq!(files, y_before);
    assert_eq!(store.directory(&fx.dir("y")).unwrap(), Some(y_dir));
    assert!(store.directory(&fx.dir("x")).unwrap().is_none());
    assert!(store.directory(&fx.dir("x/deep")).unwrap().is_none());
    assert!(store.lookup_directory(&fx.dir("")).unwrap().is_some());
}

#[test]
fn test_unreadable_file_does_not_stop_the_run() {
    let fx = Fixture::new(2);
    fx.write("ok.txt", b"fine");
    fx.write("bad.txt", b"FAIL here");

    let crawl = fx.run(Arc::new(FailingHasher)).crawl.unwrap();
    assert_eq!(crawl.saver.inserted, 2);
    assert_eq!(crawl.hasher.unreadable, 1);
    assert_eq!(crawl.errors(), 1);

    assert_eq!(fx.file("", "bad.txt").unwrap().digest, ContentDigest::Unreadable);
    assert_eq!(
        fx.file("", "ok.txt").unwrap().digest,
        ContentDigest::Computed(compute_blake3(b"fine"))
    );

    // Unreadable records are kept in the schema's flag column
    let unreadable: i64 = fx
        .store()
        .connection()
        .query_row(
            "SELECT COUNT(*) FROM files WHERE unreadable = 1 AND digest IS NULL",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(unreadable, 1);
}

#[test]
fn test_store_failure_mid_crawl_is_fatal() {
    let mut fx = Fixture::new(4);
    fx.config.batch_size = 10_000;
    for i in 0..500 {
        fx.write(&format!("d{}/f{}", i % 5, i), format!("content {}", i).as_bytes());
    }

    // The saver's insert for f250 fails partway through the crawl
    fx.store()
        .connection()
        .execute_batch(
            "CREATE TRIGGER reject_f250 BEFORE INSERT ON files WHEN NEW.name = 'f250'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .unwrap();

    let err = run_index(&fx.config, Arc::new(Blake3Hasher), None).unwrap_err();
    assert!(matches!(err, IndexError::Database(DbError::Sqlite(_))), "{}", err);

    // Nothing from the failed batch was committed
    let store = fx.store();
    assert!(store.files().unwrap().is_empty());
    assert_eq!(store.info(keys::STATUS).unwrap().as_deref(), Some("running"));
}

#[test]
fn test_hierarchy_only_run_on_existing_store() {
    let fx = Fixture::new(1);
    fx.write("a/b/c/f", b"x");
    fx.run(Arc::new(Blake3Hasher));

    let mut config = fx.config.clone();
    config.root = None;
    let report = run_index(&config, Arc::new(Blake3Hasher), None).unwrap();

    assert!(report.crawl.is_none());
    assert!(report.livecheck.is_none());
    // Already resolved by the first run
    assert_eq!(report.hierarchy.linked, 0);
    assert_eq!(report.hierarchy.passes, 1);
}
