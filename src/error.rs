//! Error types for hash-walker
//!
//! This module defines the error hierarchy that covers:
//! - SQLite store errors (always fatal to a run)
//! - Configuration and CLI errors
//! - Pipeline thread errors
//! - Per-entry filesystem errors (recoverable, never abort a run)
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Errors should be actionable - include context about what to do
//! - Preserve error chains for debugging

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the hash-walker application
#[derive(Error, Debug)]
pub enum IndexError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline thread errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

/// Database errors
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to create database file
    #[error("Failed to create database at '{path}': {reason}")]
    CreateFailed { path: PathBuf, reason: String },

    /// Schema error
    #[error("Database schema error: {0}")]
    Schema(String),

    /// Transaction failed
    #[error("Transaction failed: {0}")]
    Transaction(String),
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid queue size
    #[error("Invalid queue size {size}: must be at least {min}")]
    InvalidQueueSize { size: usize, min: usize },

    /// Invalid batch size
    #[error("Invalid batch size {size}: must be between {min} and {max}")]
    InvalidBatchSize { size: usize, min: usize, max: usize },

    /// Invalid exclude pattern
    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidExcludePattern { pattern: String, reason: String },

    /// Store path error
    #[error("Invalid store path '{path}': {reason}")]
    InvalidStorePath { path: PathBuf, reason: String },

    /// Crawl root missing or not a directory
    #[error("Invalid root '{path}': {reason}")]
    InvalidRoot { path: PathBuf, reason: String },
}

/// Pipeline thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// A stage thread panicked
    #[error("{stage} thread panicked")]
    Panicked { stage: String },

    /// A stage thread could not be started
    #[error("Failed to spawn {stage} thread: {reason}")]
    SpawnFailed { stage: String, reason: String },
}

/// Per-entry filesystem errors
///
/// These never abort a run. The walker logs and skips, the hasher records
/// the file as unreadable.
#[derive(Error, Debug)]
pub enum EntryError {
    /// Directory traversal failed (permission denied, loop, vanished dir)
    #[error("Failed to traverse '{path}': {source}")]
    Traversal {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// Stat failed after the entry was listed
    #[error("Failed to stat '{path}': {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Open or read failed while hashing
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EntryError {
    /// Check if the entry disappeared between listing and access
    ///
    /// Common on active filesystems; callers log these at debug level.
    pub fn is_vanished(&self) -> bool {
        match self {
            EntryError::Traversal { source, .. } => source
                .io_error()
                .is_some_and(|e| e.kind() == std::io::ErrorKind::NotFound),
            EntryError::Metadata { source, .. } | EntryError::Read { source, .. } => {
                source.kind() == std::io::ErrorKind::NotFound
            }
        }
    }
}

/// Result type alias for IndexError
pub type Result<T> = std::result::Result<T, IndexError>;

/// Result type alias for DbError
pub type DbResult<T> = std::result::Result<T, DbError>;
