//! Directory hierarchy resolution
//!
//! The saver creates directory records without parent links. Once the crawl
//! has drained, every unlinked record is connected to its parent, creating
//! missing ancestors on the way, until every chain ends at a root record.

use crate::db::MetadataStore;
use crate::error::DbResult;
use std::path::is_separator;
use tracing::{debug, info};

/// Where a stored directory path sits relative to its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentPath<'a> {
    /// Stored form of the parent directory
    Parent(&'a str),

    /// The path is a filesystem root and has no parent
    Root,

    /// Not a stored directory path (no trailing separator)
    Malformed,
}

/// Derive the parent of a stored directory path by dropping its last segment
///
/// ```
/// use hash_walker::hierarchy::{parent_path, ParentPath};
///
/// assert_eq!(parent_path("/data/photos/"), ParentPath::Parent("/data/"));
/// assert_eq!(parent_path("/"), ParentPath::Root);
/// assert_eq!(parent_path("/data"), ParentPath::Malformed);
/// ```
pub fn parent_path(path: &str) -> ParentPath<'_> {
    let Some(last) = path.chars().last() else {
        return ParentPath::Malformed;
    };
    if !is_separator(last) {
        return ParentPath::Malformed;
    }

    let trimmed = &path[..path.len() - last.len_utf8()];
    match trimmed.rfind(is_separator) {
        Some(idx) => ParentPath::Parent(&path[..=idx]),
        None => ParentPath::Root,
    }
}

/// Counts from one resolution run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HierarchyStats {
    /// Scans of the unlinked set, including the final confirming one
    pub passes: u32,

    /// Parent links written
    pub linked: u64,

    /// Ancestor records created
    pub created: u64,
}

/// Link every directory record to its parent
///
/// Each pass works through the unlinked records as a worklist; a newly
/// created ancestor is pushed onto the same worklist. Passes repeat until
/// one makes no change. Writes are committed every `batch_size` and at the
/// end.
pub fn resolve<S: MetadataStore>(store: &mut S, batch_size: usize) -> DbResult<HierarchyStats> {
    let batch_size = batch_size.max(1);
    let mut stats = HierarchyStats::default();

    loop {
        stats.passes += 1;
        let mut worklist = store.unresolved_directories()?;
        let mut changed = false;

        while let Some((id, path)) = worklist.pop() {
            let parent = match parent_path(&path) {
                ParentPath::Parent(parent) => parent.to_string(),
                ParentPath::Root => continue,
                ParentPath::Malformed => {
                    debug!(path = %path, "Skipping malformed directory path");
                    continue;
                }
            };

            let parent_id = match store.lookup_directory(&parent)? {
                Some(parent_id) => parent_id,
                None => {
                    let parent_id = store.get_or_create_directory(&parent)?;
                    stats.created += 1;
                    worklist.push((parent_id, parent));
                    parent_id
                }
            };

            store.set_directory_parent(id, parent_id)?;
            stats.linked += 1;
            changed = true;

            if store.pending_writes() >= batch_size {
                store.flush()?;
            }
        }

        if !changed {
            break;
        }
    }

    store.commit_batch()?;
    info!(
        passes = stats.passes,
        linked = stats.linked,
        created = stats.created,
        "Hierarchy resolved"
    );
    Ok(stats)
}
