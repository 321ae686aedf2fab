//! Database schema definitions and creation
//!
//! This module defines the SQLite schema for the directory and file index
//! and provides functions to create and configure the database.

use crate::error::DbResult;
use rusqlite::{Connection, OptionalExtension};

/// Current schema version for migrations
pub const SCHEMA_VERSION: u32 = 1;

/// Directory records. `parent_id` stays NULL until hierarchy resolution,
/// and forever for the filesystem root.
const CREATE_DIRS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS dirs (
    id INTEGER PRIMARY KEY,
    parent_id INTEGER,
    path TEXT NOT NULL UNIQUE,    -- canonical, trailing separator
    live INTEGER NOT NULL DEFAULT 1
)
"#;

/// File records, unique per (parent_id, name)
const CREATE_FILES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY,
    parent_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    size INTEGER NOT NULL,
    mtime INTEGER NOT NULL,       -- Unix timestamp
    digest TEXT,                  -- hex, NULL for empty or unreadable files
    unreadable INTEGER NOT NULL DEFAULT 0,
    live INTEGER NOT NULL DEFAULT 1,
    UNIQUE (parent_id, name)
)
"#;

/// SQL to create index metadata table
const CREATE_INDEX_INFO_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS index_info (
    key TEXT PRIMARY KEY,
    value TEXT
)
"#;

/// Secondary indexes; the UNIQUE constraints already cover path lookups
const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_dirs_parent ON dirs(parent_id)",
    "CREATE INDEX IF NOT EXISTS idx_files_live ON files(live)",
];

/// SQLite pragmas for the crawl. WAL lets the change detector read
/// committed state while the saver holds the write transaction.
const WRITE_PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -64000;      -- 64MB cache
PRAGMA temp_store = MEMORY;
PRAGMA busy_timeout = 5000;
"#;

/// Pragmas for the read-only detector connection
const READ_PRAGMAS: &str = r#"
PRAGMA query_only = ON;
PRAGMA busy_timeout = 5000;
PRAGMA cache_size = -16000;
"#;

/// Create and configure a database for writing
pub fn create_database(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(WRITE_PRAGMAS)?;

    conn.execute(CREATE_DIRS_TABLE, [])?;
    conn.execute(CREATE_FILES_TABLE, [])?;
    conn.execute(CREATE_INDEX_INFO_TABLE, [])?;
    create_indexes(conn)?;

    Ok(())
}

/// Create secondary indexes
pub fn create_indexes(conn: &Connection) -> DbResult<()> {
    for sql in CREATE_INDEXES {
        conn.execute(sql, [])?;
    }
    Ok(())
}

/// Configure a connection used only for lookups
pub fn configure_reader(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(READ_PRAGMAS)?;
    Ok(())
}

/// Refresh query planner statistics (called once a run completes)
pub fn optimize_for_reads(conn: &Connection) -> DbResult<()> {
    conn.execute("ANALYZE", [])?;
    Ok(())
}

/// Store index metadata
pub fn set_index_info(conn: &Connection, key: &str, value: &str) -> DbResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO index_info (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

/// Get index metadata
pub fn get_index_info(conn: &Connection, key: &str) -> DbResult<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM index_info WHERE key = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

/// Metadata keys written to `index_info`
pub mod keys {
    /// Root that was last crawled
    pub const ROOT_PATH: &str = "root_path";

    /// Timestamp when the last crawl started (ISO 8601)
    pub const START_TIME: &str = "start_time";

    /// Timestamp when the last crawl completed (ISO 8601)
    pub const END_TIME: &str = "end_time";

    /// Duration of the last crawl in seconds
    pub const DURATION_SECS: &str = "duration_secs";

    /// Number of hasher threads used
    pub const WORKER_COUNT: &str = "worker_count";

    /// Files seen by the walker in the last crawl
    pub const FILES_SCANNED: &str = "files_scanned";

    /// Files hashed in the last crawl
    pub const FILES_HASHED: &str = "files_hashed";

    /// File records written in the last crawl
    pub const FILES_WRITTEN: &str = "files_written";

    /// Per-entry errors in the last crawl
    pub const ERROR_COUNT: &str = "error_count";

    /// Timestamp of the last live-check (ISO 8601)
    pub const LIVECHECK_TIME: &str = "livecheck_time";

    /// Schema version
    pub const SCHEMA_VERSION: &str = "schema_version";

    /// Tool version
    pub const WALKER_VERSION: &str = "walker_version";

    /// Crawl status: "running", "completed"
    pub const STATUS: &str = "status";
}
