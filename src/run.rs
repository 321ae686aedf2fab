//! One invocation of the indexer
//!
//! Crawl (if a root is configured), hierarchy resolution, then live-check
//! (if requested), all on one store handle and strictly in that order.

use crate::config::IndexConfig;
use crate::content::ContentHasher;
use crate::db::{MetadataStore, SqliteStore};
use crate::error::Result;
use crate::hierarchy::{self, HierarchyStats};
use crate::livecheck::{self, LiveCheckReport};
use crate::progress::ProgressReporter;
use crate::walker::{CrawlCoordinator, CrawlResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Everything one run did
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Present when a root was crawled
    pub crawl: Option<CrawlResult>,

    pub hierarchy: HierarchyStats,

    /// Present when live-check ran
    pub livecheck: Option<LiveCheckReport>,

    pub duration: Duration,
}

/// Open the store and run every configured phase
pub fn run_index(
    config: &IndexConfig,
    hasher: Arc<dyn ContentHasher>,
    progress: Option<&ProgressReporter>,
) -> Result<RunReport> {
    let start = Instant::now();
    let mut store = SqliteStore::open(&config.store_path)?;

    let crawl = match &config.root {
        Some(root) => {
            if let Some(p) = progress {
                p.set_status("Crawling...");
            }
            let (crawled, result) = CrawlCoordinator::new(config.clone())
                .with_hasher(hasher)
                .with_progress(progress.cloned())
                .run(store, root)?;
            store = crawled;
            Some(result)
        }
        None => None,
    };

    if let Some(p) = progress {
        p.set_status("Resolving directory hierarchy...");
    }
    store.flush()?;
    let hierarchy = hierarchy::resolve(&mut store, config.batch_size)?;

    let livecheck = if config.livecheck {
        info!("Starting live-check");
        Some(livecheck::run(&mut store, progress)?)
    } else {
        None
    };

    store.finish()?;

    Ok(RunReport {
        crawl,
        hierarchy,
        livecheck,
        duration: start.elapsed(),
    })
}
