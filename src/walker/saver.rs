//! Saver: the only stage that writes to the index
//!
//! Receives hashed (or empty) entries, resolves each entry's directory to a
//! record id, and upserts the file record. Writes are batched in one
//! transaction that is committed every `batch_size` writes and once more
//! when the inbound channel closes. If the abort flag is raised the open
//! batch is rolled back instead.

use crate::db::{MetadataStore, UpsertOutcome};
use crate::error::DbResult;
use crate::types::HashedEntry;
use crossbeam_channel::Receiver;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Counts of what the saver wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaverStats {
    pub inserted: u64,
    pub updated: u64,
    /// Entries that matched the stored record when they arrived
    pub unchanged: u64,
    pub dirs_created: u64,
    pub commits: u64,
}

impl SaverStats {
    /// File records inserted or updated
    pub fn written(&self) -> u64 {
        self.inserted + self.updated
    }
}

/// Batching writer around a [`MetadataStore`]
pub struct Saver<S: MetadataStore> {
    store: S,
    batch_size: usize,
    dir_ids: HashMap<String, i64>,
    stats: SaverStats,
    abort: Arc<AtomicBool>,
}

impl<S: MetadataStore> Saver<S> {
    pub fn new(store: S, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            dir_ids: HashMap::new(),
            stats: SaverStats::default(),
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop writing once `abort` is set by another stage
    pub fn with_abort(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = abort;
        self
    }

    /// Write one entry, committing if the batch is full
    pub fn save(&mut self, item: &HashedEntry) -> DbResult<UpsertOutcome> {
        let dir_id = self.dir_id(&item.entry.dir)?;
        let outcome =
            self.store
                .upsert_file(dir_id, &item.entry.name, item.entry.meta(), &item.digest)?;

        match outcome {
            UpsertOutcome::Inserted => self.stats.inserted += 1,
            UpsertOutcome::Updated => self.stats.updated += 1,
            UpsertOutcome::Unchanged => self.stats.unchanged += 1,
        }
        trace!(path = %item.entry.path.display(), ?outcome, "Saved");

        if self.store.pending_writes() >= self.batch_size && !self.aborted() {
            self.commit()?;
        }
        Ok(outcome)
    }

    /// Drain `rx` until every sender is gone, then commit the remainder
    ///
    /// On error the receiver is dropped, which unblocks the upstream stages.
    /// On abort the open batch is rolled back and the store returned.
    pub fn run(mut self, rx: Receiver<HashedEntry>) -> DbResult<(S, SaverStats)> {
        for item in rx.iter() {
            if self.aborted() {
                break;
            }
            self.save(&item)?;
        }
        drop(rx);

        if self.aborted() {
            warn!(
                discarded = self.store.pending_writes(),
                "Crawl aborted, rolling back open batch"
            );
            self.store.rollback_batch()?;
            return Ok((self.store, self.stats));
        }

        self.commit()?;
        debug!(
            "Saver finished: {} inserted, {} updated, {} directories created, {} commits",
            self.stats.inserted, self.stats.updated, self.stats.dirs_created, self.stats.commits
        );
        Ok((self.store, self.stats))
    }

    pub fn stats(&self) -> &SaverStats {
        &self.stats
    }

    fn aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    fn commit(&mut self) -> DbResult<()> {
        if self.store.pending_writes() == 0 {
            return Ok(());
        }
        self.store.commit_batch()?;
        self.stats.commits += 1;
        Ok(())
    }

    fn dir_id(&mut self, dir: &str) -> DbResult<i64> {
        if let Some(id) = self.dir_ids.get(dir) {
            return Ok(*id);
        }

        let existed = self.store.lookup_directory(dir)?;
        let id = match existed {
            Some(id) => id,
            None => {
                self.stats.dirs_created += 1;
                self.store.get_or_create_directory(dir)?
            }
        };
        self.dir_ids.insert(dir.to_string(), id);
        Ok(id)
    }
}
