//! Configuration types for hash-walker
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation

use crate::error::ConfigError;
use crate::types::PathCanon;
use clap::Parser;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Minimum queue size
const MIN_QUEUE_SIZE: usize = 16;

/// Batch size limits
const MIN_BATCH_SIZE: usize = 1;
const MAX_BATCH_SIZE: usize = 100_000;

/// Defaults shared by the CLI and [`IndexConfig::new`]
pub const DEFAULT_QUEUE_SIZE: usize = 10_000;
pub const DEFAULT_BATCH_SIZE: usize = 1_000;

/// Incremental content-hash indexer with SQLite output
#[derive(Parser, Debug, Clone)]
#[command(
    name = "hash-walker",
    version,
    about = "Incremental content-hash indexer with SQLite output",
    long_about = "Walks a directory tree and records every file's size, mtime and content \
                  digest in a SQLite index.\n\n\
                  Files whose size and mtime match the index are not re-read. \
                  Live-check mode removes records for paths that no longer exist.",
    after_help = "EXAMPLES:\n    \
        hash-walker --root /data --db data.sqlite\n    \
        hash-walker --root /data -w 16 --exclude '\\.snapshot'\n    \
        hash-walker --root /data --livecheck\n    \
        hash-walker --db data.sqlite --livecheck  # live-check only"
)]
pub struct CliArgs {
    /// Index database file
    #[arg(long, default_value = "hash.sqlite", value_name = "FILE")]
    pub db: PathBuf,

    /// Directory tree to crawl (crawl is skipped if not given)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Number of hasher threads
    #[arg(
        short = 'w',
        long,
        default_value_t = default_workers(),
        value_name = "NUM"
    )]
    pub workers: usize,

    /// Capacity of each pipeline queue (controls memory usage)
    #[arg(long, default_value_t = DEFAULT_QUEUE_SIZE, value_name = "NUM")]
    pub queue_size: usize,

    /// Writes per SQLite transaction
    #[arg(short = 'b', long, default_value_t = DEFAULT_BATCH_SIZE, value_name = "NUM")]
    pub batch_size: usize,

    /// Remove records for paths that no longer exist
    #[arg(long)]
    pub livecheck: bool,

    /// Store paths upper-cased (default on Windows and macOS)
    #[arg(long)]
    pub fold_case: bool,

    /// Exclude paths matching pattern (can be repeated)
    #[arg(long = "exclude", value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

fn default_workers() -> usize {
    // Hashing is CPU bound
    num_cpus::get()
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Index database path
    pub store_path: PathBuf,

    /// Canonicalized crawl root
    pub root: Option<PathBuf>,

    /// Number of hasher threads
    pub worker_count: usize,

    /// Capacity of each pipeline queue
    pub queue_size: usize,

    /// Writes per transaction
    pub batch_size: usize,

    /// Run live-check after the crawl
    pub livecheck: bool,

    /// Stored path form
    pub canon: PathCanon,

    /// Compiled exclude patterns
    pub exclude_patterns: Vec<Regex>,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl IndexConfig {
    /// Defaults for `store_path`: no crawl, no live-check
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            root: None,
            worker_count: default_workers(),
            queue_size: DEFAULT_QUEUE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            livecheck: false,
            canon: PathCanon::platform_default(),
            exclude_patterns: Vec::new(),
            show_progress: false,
            verbose: false,
        }
    }

    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        // Validate worker count
        if args.workers == 0 || args.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers,
                max: MAX_WORKERS,
            });
        }

        // Validate queue size
        if args.queue_size < MIN_QUEUE_SIZE {
            return Err(ConfigError::InvalidQueueSize {
                size: args.queue_size,
                min: MIN_QUEUE_SIZE,
            });
        }

        // Validate batch size
        if args.batch_size < MIN_BATCH_SIZE || args.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::InvalidBatchSize {
                size: args.batch_size,
                min: MIN_BATCH_SIZE,
                max: MAX_BATCH_SIZE,
            });
        }

        // Compile exclude patterns
        let exclude_patterns = args
            .exclude_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ConfigError::InvalidExcludePattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Validate store path
        if let Some(parent) = args.db.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ConfigError::InvalidStorePath {
                    path: args.db.clone(),
                    reason: format!("Parent directory '{}' does not exist", parent.display()),
                });
            }
        }
        if args.db.is_dir() {
            return Err(ConfigError::InvalidStorePath {
                path: args.db.clone(),
                reason: "Path is a directory".to_string(),
            });
        }

        let root = args.root.as_deref().map(canonical_root).transpose()?;

        let canon = if args.fold_case {
            PathCanon::new(true)
        } else {
            PathCanon::platform_default()
        };

        Ok(Self {
            store_path: args.db,
            root,
            worker_count: args.workers,
            queue_size: args.queue_size,
            batch_size: args.batch_size,
            livecheck: args.livecheck,
            canon,
            exclude_patterns,
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }
}

/// Absolute, symlink-free form of the crawl root
///
/// `dunce` keeps Windows paths in their familiar form instead of `\\?\C:\`.
pub fn canonical_root(path: &Path) -> Result<PathBuf, ConfigError> {
    let root = dunce::canonicalize(path).map_err(|e| ConfigError::InvalidRoot {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    if !root.is_dir() {
        return Err(ConfigError::InvalidRoot {
            path: path.to_path_buf(),
            reason: "Not a directory".to_string(),
        });
    }
    Ok(root)
}
