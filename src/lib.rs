//! hash-walker - Incremental Content-Hash Indexer
//!
//! Walks a directory tree and keeps a SQLite index of every file's size,
//! modification time and content digest. Re-running against the same tree
//! only re-reads files whose size or mtime changed.
//!
//! # Features
//!
//! - **Incremental**: Unchanged files are detected from the index and never
//!   reach the hashers.
//!
//! - **Parallel Hashing**: A pool of hasher threads digests file content
//!   with BLAKE3 while a single saver thread owns all writes.
//!
//! - **Memory Efficient**: Bounded queues between stages give backpressure
//!   on deep or wide trees.
//!
//! - **Live-Check**: Records for paths that no longer exist are detected and
//!   removed, along with anything orphaned under them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Directory Tree                            │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ walkdir
//!                               ▼
//!            ┌──────────────────────────────────────┐
//!            │  Walker + Change Detector             │───┐
//!            └──────────────────┬───────────────────┘   │
//!                               │ changed files         │ zero-byte
//!                               ▼                       │ files
//! ┌─────────────────────────────────────────────────┐   │
//! │  ┌─────────┐  ┌─────────┐           ┌─────────┐ │   │
//! │  │Hasher 1 │  │Hasher 2 │   ...     │Hasher N │ │   │
//! │  └────┬────┘  └────┬────┘           └────┬────┘ │   │
//! └───────┼────────────┼─────────────────────┼──────┘   │
//!         └────────────┼─────────────────────┘          │
//!                      ▼                                │
//!            ┌──────────────────────────┐◄──────────────┘
//!            │  Saver (batched upserts) │
//!            └─────────────┬────────────┘
//!                          ▼
//!                 ┌──────────────────┐
//!                 │  SQLite (WAL)    │
//!                 └──────────────────┘
//! ```
//!
//! After the crawl, the hierarchy resolver links every directory record to
//! its parent, and live-check (if requested) prunes dead records.
//!
//! # Example
//!
//! ```bash
//! # Index a tree
//! hash-walker --root /data --db data.sqlite
//!
//! # Re-index and drop records for deleted files
//! hash-walker --root /data --db data.sqlite --livecheck
//!
//! # Find duplicate content
//! sqlite3 data.sqlite "SELECT digest, COUNT(*) FROM files WHERE digest IS NOT NULL GROUP BY digest HAVING COUNT(*) > 1"
//! ```

pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod hierarchy;
pub mod livecheck;
pub mod progress;
pub mod run;
pub mod types;
pub mod walker;

pub use config::{CliArgs, IndexConfig};
pub use error::{IndexError, Result};
pub use run::{run_index, RunReport};
pub use walker::{CrawlCoordinator, CrawlResult};
