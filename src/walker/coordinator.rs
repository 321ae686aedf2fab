//! Crawl coordinator - wires the pipeline stages together
//!
//! The coordinator is responsible for:
//! - Creating the bounded channels between stages
//! - Spawning the saver, the hasher pool and the walker thread
//! - Joining the stages in pipeline order
//! - Recording crawl metadata in `index_info`
//!
//! Completion is carried by channel closure alone. The walker thread drops
//! its senders when the tree is exhausted, each hasher exits once its input
//! is drained and drops its sender, and the saver's input then closes.
//!
//! A fatal error on the walker thread raises a shared abort flag, so the
//! saver rolls back its open batch instead of committing it.

use crate::config::IndexConfig;
use crate::content::{Blake3Hasher, ContentHasher};
use crate::db::{keys, MetadataStore, SqliteReader, SqliteStore};
use crate::error::{IndexError, Result, WorkerError};
use crate::progress::ProgressReporter;
use crate::types::{FileEntry, HashedEntry};
use crate::walker::detector::{ChangeDetector, DetectorStats};
use crate::walker::hasher::{HasherPool, HasherStats};
use crate::walker::saver::{Saver, SaverStats};
use crate::walker::walk::{WalkSummary, Walker};
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Sender};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Walked files between progress refreshes
const PROGRESS_INTERVAL: u64 = 128;

/// Result of a completed crawl
#[derive(Debug, Clone)]
pub struct CrawlResult {
    /// Traversal counters
    pub walk: WalkSummary,

    /// How walked files were routed
    pub detector: DetectorStats,

    /// Hashing counters across all workers
    pub hasher: HasherStats,

    /// What reached the store
    pub saver: SaverStats,

    /// Wall time of the crawl phase
    pub duration: Duration,
}

impl CrawlResult {
    /// Traversal errors plus unreadable files
    pub fn errors(&self) -> u64 {
        self.walk.errors + self.hasher.unreadable
    }
}

/// Snapshot shown by the progress spinner during a crawl
#[derive(Debug, Clone, Default)]
pub struct CrawlProgress {
    /// Files walked so far
    pub files: u64,

    /// Bytes walked so far
    pub bytes: u64,

    /// Files skipped as unchanged
    pub unchanged: u64,

    /// Files sent for hashing
    pub queued: u64,

    /// Time since the crawl started
    pub elapsed: Duration,
}

impl CrawlProgress {
    /// Calculate files per second rate
    pub fn files_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.files as f64 / secs
        } else {
            0.0
        }
    }
}

/// Runs one crawl of a root into a store
pub struct CrawlCoordinator {
    /// Configuration
    config: Arc<IndexConfig>,

    /// Digest used by the hasher pool
    hasher: Arc<dyn ContentHasher>,

    /// Spinner updated from the walker thread
    progress: Option<ProgressReporter>,
}

impl CrawlCoordinator {
    /// Create a coordinator using BLAKE3 and no progress display
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config: Arc::new(config),
            hasher: Arc::new(Blake3Hasher),
            progress: None,
        }
    }

    /// Replace the content digest
    pub fn with_hasher(mut self, hasher: Arc<dyn ContentHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Report progress through `progress`
    pub fn with_progress(mut self, progress: Option<ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Crawl `root` into `store`
    ///
    /// The store is handed to the saver thread for the duration of the crawl
    /// and returned with every write committed.
    pub fn run(self, mut store: SqliteStore, root: &Path) -> Result<(SqliteStore, CrawlResult)> {
        let start_time = Instant::now();
        let start_datetime: DateTime<Utc> = Utc::now();

        info!(
            root = %root.display(),
            workers = self.config.worker_count,
            "Starting crawl"
        );
        self.record_crawl_start(&mut store, root, &start_datetime)?;

        // The detector sees only what the saver has committed
        let reader = store.reader()?;

        let (hash_tx, hash_rx) = bounded::<FileEntry>(self.config.queue_size);
        let (save_tx, save_rx) = bounded::<HashedEntry>(self.config.queue_size);

        let abort = Arc::new(AtomicBool::new(false));
        let saver = Saver::new(store, self.config.batch_size).with_abort(Arc::clone(&abort));
        let saver_handle = spawn_stage("db-saver", move || saver.run(save_rx))?;

        let hashers = HasherPool::spawn(
            self.config.worker_count,
            Arc::clone(&self.hasher),
            hash_rx,
            save_tx.clone(),
        )?;
        info!(count = hashers.len(), "Hashers spawned");

        let walker_handle =
            self.spawn_walker(root, reader, hash_tx, save_tx, abort, start_time)?;

        // Join in pipeline order so every stage has drained before the next
        let walked = walker_handle.join();
        let hashed = hashers.join();
        let saved = saver_handle.join();

        // A store failure outranks the upstream breakage it causes
        let (mut store, saver_stats) = saved.map_err(|_| panicked("db-saver"))??;
        let (walk, detector) = walked.map_err(|_| panicked("walker"))??;
        let hasher_stats = hashed?;

        let duration = start_time.elapsed();
        let result = CrawlResult {
            walk,
            detector,
            hasher: hasher_stats,
            saver: saver_stats,
            duration,
        };
        self.record_crawl_end(&mut store, &result)?;

        info!(
            files = result.walk.files,
            hashed = result.hasher.hashed,
            written = result.saver.written(),
            errors = result.errors(),
            duration_secs = duration.as_secs(),
            "Crawl completed"
        );

        Ok((store, result))
    }

    fn spawn_walker(
        &self,
        root: &Path,
        reader: SqliteReader,
        hash_tx: Sender<FileEntry>,
        save_tx: Sender<HashedEntry>,
        abort: Arc<AtomicBool>,
        start_time: Instant,
    ) -> Result<JoinHandle<Result<(WalkSummary, DetectorStats)>>> {
        let walker = Walker::new(root, self.config.canon)
            .with_excludes(self.config.exclude_patterns.clone());
        let progress = self.progress.clone();

        let handle = spawn_stage("walker", move || -> Result<(WalkSummary, DetectorStats)> {
            let mut detector = ChangeDetector::new(reader, hash_tx, save_tx);
            let mut snapshot = CrawlProgress::default();

            let walked = walker.walk::<_, IndexError>(|entry| {
                snapshot.files += 1;
                snapshot.bytes += entry.size;
                let flow = detector.route(entry)?;

                if let Some(ref p) = progress {
                    if snapshot.files % PROGRESS_INTERVAL == 0 {
                        snapshot.unchanged = detector.stats().unchanged;
                        snapshot.queued = detector.stats().to_hash;
                        snapshot.elapsed = start_time.elapsed();
                        p.update(&snapshot);
                    }
                }
                Ok(flow)
            });

            // Raised before the senders drop, so the saver sees it on close
            let summary = match walked {
                Ok(summary) => summary,
                Err(e) => {
                    abort.store(true, Ordering::SeqCst);
                    return Err(e);
                }
            };

            let stats = detector.finish();
            debug!(
                "Walker finished: {} unchanged, {} to hash, {} empty",
                stats.unchanged, stats.to_hash, stats.empty
            );
            Ok((summary, stats))
        })?;

        Ok(handle)
    }

    /// Record crawl metadata before any file is written
    fn record_crawl_start(
        &self,
        store: &mut SqliteStore,
        root: &Path,
        start_time: &DateTime<Utc>,
    ) -> Result<()> {
        store.set_info(keys::ROOT_PATH, &root.display().to_string())?;
        store.set_info(keys::START_TIME, &start_time.to_rfc3339())?;
        store.set_info(keys::WORKER_COUNT, &self.config.worker_count.to_string())?;
        store.set_info(keys::STATUS, "running")?;
        store.commit_batch()?;
        Ok(())
    }

    fn record_crawl_end(&self, store: &mut SqliteStore, result: &CrawlResult) -> Result<()> {
        store.set_info(keys::END_TIME, &Utc::now().to_rfc3339())?;
        store.set_info(keys::DURATION_SECS, &result.duration.as_secs().to_string())?;
        store.set_info(keys::FILES_SCANNED, &result.walk.files.to_string())?;
        store.set_info(keys::FILES_HASHED, &result.hasher.hashed.to_string())?;
        store.set_info(keys::FILES_WRITTEN, &result.saver.written().to_string())?;
        store.set_info(keys::ERROR_COUNT, &result.errors().to_string())?;
        store.set_info(keys::STATUS, "completed")?;
        store.commit_batch()?;
        Ok(())
    }
}

fn spawn_stage<T, F>(name: &str, f: F) -> std::result::Result<JoinHandle<T>, WorkerError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|e| WorkerError::SpawnFailed {
            stage: name.to_string(),
            reason: e.to_string(),
        })
}

fn panicked(stage: &str) -> WorkerError {
    WorkerError::Panicked {
        stage: stage.to_string(),
    }
}
