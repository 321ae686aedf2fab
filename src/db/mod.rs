//! Database module for the SQLite index
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐        ┌──────────────────────────┐
//! │ Walker + Change Detector │        │   Saver (single writer)  │
//! │  SqliteReader (read-only)│        │  SqliteStore             │
//! └────────────┬─────────────┘        └────────────┬─────────────┘
//!              │ committed snapshot                │ batched transactions
//!              ▼                                   ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 SQLite file (WAL mode)                       │
//! │   dirs (id, parent_id, path, live)                           │
//! │   files (parent_id, name, size, mtime, digest, ...)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The hierarchy resolver and the live-checker run after the crawl, on the
//! same `SqliteStore` handle.

pub mod schema;
pub mod store;

pub use schema::{create_database, create_indexes, keys, optimize_for_reads};
pub use store::{
    DirectoryRecord, FileRecord, LiveFileRef, MetadataRead, MetadataStore, SqliteReader,
    SqliteStore, SweepCounts, UpsertOutcome,
};
