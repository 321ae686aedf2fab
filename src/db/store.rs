//! SQLite-backed metadata store
//!
//! [`SqliteStore`] is the single writer. Writes open a transaction lazily
//! and stay in it until the owner calls [`MetadataStore::commit_batch`] or
//! [`MetadataStore::flush`], so the saver can amortize commit cost over
//! many upserts. [`SqliteReader`] is a separate read-only connection for the
//! change detector; in WAL mode it sees the last committed state and never
//! blocks the writer.
//!
//! A store error is fatal to the run. Dropping a store with an open batch
//! rolls that batch back.

use crate::db::schema::{self, keys};
use crate::error::{DbError, DbResult};
use crate::types::{ContentDigest, FileMeta};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};

/// Maximum ids bound into a single `IN (...)` list
const BULK_CHUNK_SIZE: usize = 500;

/// Point lookups against the index
pub trait MetadataRead {
    /// Id of the directory record with this exact path
    fn lookup_directory(&self, path: &str) -> DbResult<Option<i64>>;

    /// Stored `(size, mtime)` of a file record
    fn get_file_meta(&self, parent_id: i64, name: &str) -> DbResult<Option<FileMeta>>;
}

/// What an upsert did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Size and mtime matched; nothing was written
    Unchanged,
}

/// Writes against the index; implemented by the single writer
pub trait MetadataStore: MetadataRead {
    /// Return the id for `path`, inserting a record if none exists
    fn get_or_create_directory(&mut self, path: &str) -> DbResult<i64>;

    /// Insert a file record, or update it if size or mtime differ
    fn upsert_file(
        &mut self,
        parent_id: i64,
        name: &str,
        meta: FileMeta,
        digest: &ContentDigest,
    ) -> DbResult<UpsertOutcome>;

    /// Directory records without a parent link
    fn unresolved_directories(&self) -> DbResult<Vec<(i64, String)>>;

    /// Link a directory record to its parent
    fn set_directory_parent(&mut self, id: i64, parent_id: i64) -> DbResult<()>;

    /// Open a write transaction if none is open
    fn begin_batch(&mut self) -> DbResult<()>;

    /// Commit the open write transaction, if any
    fn commit_batch(&mut self) -> DbResult<()>;

    /// Discard the open write transaction, if any
    fn rollback_batch(&mut self) -> DbResult<()>;

    /// Writes since the last commit
    fn pending_writes(&self) -> usize;

    /// Commit now and open a fresh transaction
    fn flush(&mut self) -> DbResult<()> {
        self.commit_batch()?;
        self.begin_batch()
    }
}

/// A stored directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub path: String,
    pub live: bool,
}

/// A stored file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: i64,
    pub parent_id: i64,
    pub name: String,
    pub size: u64,
    pub mtime: i64,
    pub digest: ContentDigest,
    pub live: bool,
}

/// A file whose parent directory is flagged live, with its stored location
#[derive(Debug, Clone)]
pub struct LiveFileRef {
    pub id: i64,
    pub dir_path: String,
    pub name: String,
}

/// Rows removed by a garbage-collection sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepCounts {
    pub files_deleted: u64,
    pub dirs_deleted: u64,
}

/// The writable SQLite index
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
    pending: usize,
}

impl SqliteStore {
    /// Open (creating if needed) the index at `path`
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path).map_err(|e| DbError::CreateFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Open a private in-memory index (no reader connections possible)
    pub fn open_in_memory() -> DbResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> DbResult<Self> {
        schema::create_database(&conn)?;

        if let Some(version) = schema::get_index_info(&conn, keys::SCHEMA_VERSION)? {
            if version != schema::SCHEMA_VERSION.to_string() {
                return Err(DbError::Schema(format!(
                    "index has schema version {}, expected {}",
                    version,
                    schema::SCHEMA_VERSION
                )));
            }
        }
        schema::set_index_info(&conn, keys::SCHEMA_VERSION, &schema::SCHEMA_VERSION.to_string())?;
        schema::set_index_info(&conn, keys::WALKER_VERSION, env!("CARGO_PKG_VERSION"))?;

        Ok(Self {
            conn,
            path,
            pending: 0,
        })
    }

    /// Open a read-only connection to the same database
    pub fn reader(&self) -> DbResult<SqliteReader> {
        match &self.path {
            Some(path) => SqliteReader::open(path),
            None => Err(DbError::Transaction(
                "in-memory store cannot share a reader connection".into(),
            )),
        }
    }

    /// Underlying connection, for ad-hoc queries
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Write a key to `index_info` inside the current batch
    pub fn set_info(&mut self, key: &str, value: &str) -> DbResult<()> {
        self.begin_batch()?;
        schema::set_index_info(&self.conn, key, value)?;
        self.pending += 1;
        Ok(())
    }

    /// Read a key from `index_info`
    pub fn info(&self, key: &str) -> DbResult<Option<String>> {
        schema::get_index_info(&self.conn, key)
    }

    /// Commit outstanding writes and refresh planner statistics
    pub fn finish(mut self) -> DbResult<()> {
        self.commit_batch()?;
        schema::optimize_for_reads(&self.conn)?;
        Ok(())
    }

    /// Directory record by exact path
    pub fn directory(&self, path: &str) -> DbResult<Option<DirectoryRecord>> {
        let record = self
            .conn
            .prepare_cached("SELECT id, parent_id, path, live FROM dirs WHERE path = ?1")?
            .query_row([path], directory_from_row)
            .optional()?;
        Ok(record)
    }

    /// Directory record by id
    pub fn directory_by_id(&self, id: i64) -> DbResult<Option<DirectoryRecord>> {
        let record = self
            .conn
            .prepare_cached("SELECT id, parent_id, path, live FROM dirs WHERE id = ?1")?
            .query_row([id], directory_from_row)
            .optional()?;
        Ok(record)
    }

    /// All directory records, ordered by id
    pub fn directories(&self) -> DbResult<Vec<DirectoryRecord>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id, parent_id, path, live FROM dirs ORDER BY id")?;
        let rows = stmt
            .query_map([], directory_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// File record by directory path and name
    pub fn file(&self, dir_path: &str, name: &str) -> DbResult<Option<FileRecord>> {
        let record = self
            .conn
            .prepare_cached(
                "SELECT f.id, f.parent_id, f.name, f.size, f.mtime, f.digest, f.unreadable, f.live
                 FROM files f JOIN dirs d ON d.id = f.parent_id
                 WHERE d.path = ?1 AND f.name = ?2",
            )?
            .query_row(params![dir_path, name], file_from_row)
            .optional()?;
        Ok(record)
    }

    /// All file records, ordered by id
    pub fn files(&self) -> DbResult<Vec<FileRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, parent_id, name, size, mtime, digest, unreadable, live
             FROM files ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], file_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Files whose parent directory is currently flagged live
    pub fn files_in_live_directories(&self) -> DbResult<Vec<LiveFileRef>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT f.id, d.path, f.name
             FROM files f JOIN dirs d ON d.id = f.parent_id
             WHERE d.live = 1",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LiveFileRef {
                    id: row.get(0)?,
                    dir_path: row.get(1)?,
                    name: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Set the live flag on many directories at once
    pub fn set_directories_live(&mut self, ids: &[i64], live: bool) -> DbResult<usize> {
        self.bulk_set_live("dirs", ids, live)
    }

    /// Set the live flag on many files at once
    pub fn set_files_live(&mut self, ids: &[i64], live: bool) -> DbResult<usize> {
        self.bulk_set_live("files", ids, live)
    }

    fn bulk_set_live(&mut self, table: &str, ids: &[i64], live: bool) -> DbResult<usize> {
        self.begin_batch()?;
        let mut updated = 0;

        for chunk in ids.chunks(BULK_CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "UPDATE {} SET live = {} WHERE id IN ({})",
                table,
                i64::from(live),
                placeholders
            );
            updated += self
                .conn
                .prepare_cached(&sql)?
                .execute(params_from_iter(chunk.iter()))?;
            self.pending += 1;
        }

        Ok(updated)
    }

    /// Delete dead and orphaned records
    ///
    /// Files go first so no file is ever left pointing at a deleted
    /// directory. Orphaned directories (parent id no longer present) are
    /// removed until none remain.
    pub fn sweep(&mut self) -> DbResult<SweepCounts> {
        self.begin_batch()?;
        let mut counts = SweepCounts::default();

        counts.files_deleted += self.conn.execute(
            "DELETE FROM files
             WHERE live = 0 OR parent_id NOT IN (SELECT id FROM dirs WHERE live = 1)",
            [],
        )? as u64;
        counts.dirs_deleted += self.conn.execute("DELETE FROM dirs WHERE live = 0", [])? as u64;

        loop {
            let orphans = self.conn.execute(
                "DELETE FROM dirs
                 WHERE parent_id IS NOT NULL AND parent_id NOT IN (SELECT id FROM dirs)",
                [],
            )? as u64;
            if orphans == 0 {
                break;
            }
            counts.dirs_deleted += orphans;
            counts.files_deleted += self.conn.execute(
                "DELETE FROM files WHERE parent_id NOT IN (SELECT id FROM dirs)",
                [],
            )? as u64;
        }

        self.pending += 1;
        Ok(counts)
    }
}

impl MetadataRead for SqliteStore {
    fn lookup_directory(&self, path: &str) -> DbResult<Option<i64>> {
        lookup_directory_in(&self.conn, path)
    }

    fn get_file_meta(&self, parent_id: i64, name: &str) -> DbResult<Option<FileMeta>> {
        file_meta_in(&self.conn, parent_id, name)
    }
}

impl MetadataStore for SqliteStore {
    fn get_or_create_directory(&mut self, path: &str) -> DbResult<i64> {
        if let Some(id) = self.lookup_directory(path)? {
            return Ok(id);
        }

        self.begin_batch()?;
        let id = self
            .conn
            .prepare_cached("INSERT INTO dirs (path) VALUES (?1) RETURNING id")?
            .query_row([path], |row| row.get(0))?;
        self.pending += 1;
        Ok(id)
    }

    fn upsert_file(
        &mut self,
        parent_id: i64,
        name: &str,
        meta: FileMeta,
        digest: &ContentDigest,
    ) -> DbResult<UpsertOutcome> {
        let current = self.get_file_meta(parent_id, name)?;
        if current == Some(meta) {
            return Ok(UpsertOutcome::Unchanged);
        }

        self.begin_batch()?;
        let (digest, unreadable) = digest.to_columns();

        let outcome = if current.is_some() {
            self.conn
                .prepare_cached(
                    "UPDATE files SET size = ?1, mtime = ?2, digest = ?3, unreadable = ?4, live = 1
                     WHERE parent_id = ?5 AND name = ?6",
                )?
                .execute(params![
                    meta.size as i64,
                    meta.mtime,
                    digest,
                    unreadable,
                    parent_id,
                    name
                ])?;
            UpsertOutcome::Updated
        } else {
            self.conn
                .prepare_cached(
                    "INSERT INTO files (parent_id, name, size, mtime, digest, unreadable)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?
                .execute(params![
                    parent_id,
                    name,
                    meta.size as i64,
                    meta.mtime,
                    digest,
                    unreadable
                ])?;
            UpsertOutcome::Inserted
        };

        self.pending += 1;
        Ok(outcome)
    }

    fn unresolved_directories(&self) -> DbResult<Vec<(i64, String)>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id, path FROM dirs WHERE parent_id IS NULL ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn set_directory_parent(&mut self, id: i64, parent_id: i64) -> DbResult<()> {
        self.begin_batch()?;
        self.conn
            .prepare_cached("UPDATE dirs SET parent_id = ?1 WHERE id = ?2")?
            .execute([parent_id, id])?;
        self.pending += 1;
        Ok(())
    }

    fn begin_batch(&mut self) -> DbResult<()> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN IMMEDIATE")?;
        }
        Ok(())
    }

    fn commit_batch(&mut self) -> DbResult<()> {
        if !self.conn.is_autocommit() {
            self.conn
                .execute_batch("COMMIT")
                .map_err(|e| DbError::Transaction(format!("commit failed: {}", e)))?;
        }
        self.pending = 0;
        Ok(())
    }

    fn rollback_batch(&mut self) -> DbResult<()> {
        if !self.conn.is_autocommit() {
            self.conn
                .execute_batch("ROLLBACK")
                .map_err(|e| DbError::Transaction(format!("rollback failed: {}", e)))?;
        }
        self.pending = 0;
        Ok(())
    }

    fn pending_writes(&self) -> usize {
        self.pending
    }
}

/// Read-only connection used by the change detector
pub struct SqliteReader {
    conn: Connection,
}

impl SqliteReader {
    /// Open an existing index for lookups only
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        schema::configure_reader(&conn)?;
        Ok(Self { conn })
    }
}

impl MetadataRead for SqliteReader {
    fn lookup_directory(&self, path: &str) -> DbResult<Option<i64>> {
        lookup_directory_in(&self.conn, path)
    }

    fn get_file_meta(&self, parent_id: i64, name: &str) -> DbResult<Option<FileMeta>> {
        file_meta_in(&self.conn, parent_id, name)
    }
}

fn lookup_directory_in(conn: &Connection, path: &str) -> DbResult<Option<i64>> {
    let id = conn
        .prepare_cached("SELECT id FROM dirs WHERE path = ?1")?
        .query_row([path], |row| row.get(0))
        .optional()?;
    Ok(id)
}

fn file_meta_in(conn: &Connection, parent_id: i64, name: &str) -> DbResult<Option<FileMeta>> {
    let meta = conn
        .prepare_cached("SELECT size, mtime FROM files WHERE parent_id = ?1 AND name = ?2")?
        .query_row(params![parent_id, name], |row| {
            Ok(FileMeta {
                size: row.get::<_, i64>(0)? as u64,
                mtime: row.get(1)?,
            })
        })
        .optional()?;
    Ok(meta)
}

fn directory_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DirectoryRecord> {
    Ok(DirectoryRecord {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        path: row.get(2)?,
        live: row.get(3)?,
    })
}

fn file_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        name: row.get(2)?,
        size: row.get::<_, i64>(3)? as u64,
        mtime: row.get(4)?,
        digest: ContentDigest::from_columns(row.get(5)?, row.get(6)?),
        live: row.get(7)?,
    })
}
