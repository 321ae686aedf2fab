//! Crawl pipeline
//!
//! A single walker thread traverses the root and runs the change detector
//! inline. Files that need a digest go to a pool of hasher threads; the
//! saver is the only stage that writes to the store.
//!
//! # Architecture
//!
//! ```text
//!              ┌──────────────────────────────┐
//!              │ Walker + Change Detector     │
//!              │  walkdir, read-only lookups  │
//!              └───────┬──────────────┬───────┘
//!        changed files │              │ zero-byte files
//!                      ▼              │
//!       ┌──────────────────────────┐  │
//!       │     hash queue (bounded) │  │
//!       └──┬─────────┬─────────┬───┘  │
//!    ┌─────▼───┐ ┌───▼─────┐ ┌─▼─────┐│
//!    │hasher-0 │ │hasher-1 │ │hasher-N││
//!    └─────┬───┘ └───┬─────┘ └─┬─────┘│
//!          └─────────┼─────────┘      │
//!                    ▼                ▼
//!       ┌──────────────────────────────────┐
//!       │      save queue (bounded)         │
//!       └────────────────┬─────────────────┘
//!                        ▼
//!              ┌──────────────────┐
//!              │ db-saver         │
//!              │ batched upserts  │
//!              └──────────────────┘
//! ```
//!
//! There is no edge back from a later stage to an earlier one.

pub mod coordinator;
pub mod detector;
pub mod hasher;
pub mod saver;
pub mod walk;

pub use coordinator::{CrawlCoordinator, CrawlProgress, CrawlResult};
pub use detector::{ChangeDetector, DetectorStats, Route};
pub use hasher::{digest_entry, HasherPool, HasherStats};
pub use saver::{Saver, SaverStats};
pub use walk::{WalkSummary, Walker};
