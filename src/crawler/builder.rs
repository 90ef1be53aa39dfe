//! Catalog tree builder - orchestrates the parallel crawl
//!
//! The builder is responsible for:
//! - Resolving and fetching the root catalog (the only fatal step)
//! - Reusing a previous tree verbatim when the root is unchanged
//! - Seeding the work queue and running the worker threads
//! - Finalising the tree (sorted children, recalculated depth and cost)

use crate::config::CrawlConfig;
use crate::crawler::queue::{WorkQueue, WorkUnit};
use crate::crawler::reuse::{self, PreviousIndex};
use crate::crawler::state::{CrawlState, SharedState};
use crate::crawler::stats::{CrawlProgress, CrawlStats, ProgressFn};
use crate::crawler::worker::{worker_loop, CrawlContext};
use crate::error::{CrawlError, Result, WorkerError};
use crate::repo::{Catalog, CatalogReference, CatalogSource};
use crate::tree::path::ROOT_PATH;
use crate::tree::{recalculate, CatalogNode, TreeArena};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Builds a [`CatalogNode`] tree from a [`CatalogSource`]
pub struct CatalogTreeBuilder<S: CatalogSource> {
    source: S,
    config: CrawlConfig,
    previous: Option<CatalogNode>,
    progress: Option<ProgressFn>,
    stats: CrawlStats,
    duration: Duration,
}

impl<S: CatalogSource> CatalogTreeBuilder<S> {
    pub fn new(source: S, config: CrawlConfig) -> Self {
        Self {
            source,
            config,
            previous: None,
            progress: None,
            stats: CrawlStats::default(),
            duration: Duration::ZERO,
        }
    }

    /// Tree from an earlier run; unchanged subtrees are grafted instead of fetched
    pub fn with_previous_tree(mut self, previous: Option<CatalogNode>) -> Self {
        self.previous = previous;
        self
    }

    /// Called after every state change with a snapshot of the counters
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&CrawlProgress) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Counters of the last [`build`](Self::build)
    pub fn stats(&self) -> &CrawlStats {
        &self.stats
    }

    /// Wall time of the last [`build`](Self::build)
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Crawl the repository and return the finished tree
    pub fn build(&mut self) -> Result<CatalogNode> {
        self.config.validate()?;
        let start = Instant::now();
        self.stats = CrawlStats::default();

        let root_hash = self
            .source
            .root_hash()
            .map_err(CrawlError::RootUnavailable)?;

        info!(
            root = %root_hash,
            workers = self.config.worker_count,
            stop_threshold = self.config.stop_threshold,
            max_depth = ?self.config.max_depth,
            max_catalogs = ?self.config.max_catalogs,
            "Starting catalog crawl"
        );

        match self.previous.take() {
            Some(previous) if reuse::root_unchanged(&previous, &root_hash) => {
                return Ok(self.reuse_previous(previous, start));
            }
            other => self.previous = other,
        }

        let (state, references) = self.fetch_root(&root_hash, start)?;
        let state = if references.is_empty() {
            state
        } else {
            self.crawl(state, references, start)?
        };

        let CrawlState { arena, stats, .. } = state;
        let mut tree = arena.into_tree();
        recalculate(&mut tree);

        self.stats = stats;
        self.duration = start.elapsed();

        info!(
            catalogs = self.stats.catalogs_found,
            downloaded = self.stats.catalogs_downloaded,
            bytes = self.stats.bytes_downloaded,
            reused = self.stats.reused_nodes,
            errors = self.stats.errors,
            duration_secs = self.duration.as_secs_f64(),
            "Catalog crawl completed"
        );

        Ok(tree)
    }

    /// Root unchanged since the previous run: nothing needs fetching
    fn reuse_previous(&mut self, mut previous: CatalogNode, start: Instant) -> CatalogNode {
        let reused = reuse::reuse_whole(&mut previous);
        self.stats.record_reused(reused);
        self.duration = start.elapsed();

        if let Some(callback) = &self.progress {
            callback(&CrawlProgress {
                path: previous.path.clone(),
                stats: self.stats.clone(),
                in_flight: 0,
                elapsed: self.duration,
            });
        }

        info!(reused, "Root catalog unchanged, reusing previous tree");
        previous
    }

    /// Fetch the root, create its node and list its nested references
    fn fetch_root(
        &self,
        root_hash: &str,
        start: Instant,
    ) -> Result<(CrawlState, Vec<CatalogReference>)> {
        let from_cache = self.source.is_in_local_cache(root_hash);
        let catalog = self
            .source
            .retrieve_catalog(root_hash)
            .map_err(CrawlError::RootUnavailable)?;

        let size = catalog.db_size();
        let is_large = self.config.is_large(size);

        let mut stats = CrawlStats::default();
        stats.record_download(size, from_cache);
        stats.record_found(1);
        if is_large {
            stats.record_large();
        }

        let state = CrawlState::new(TreeArena::with_root(root_hash, size, is_large), stats);
        if let Some(callback) = &self.progress {
            callback(&state.progress(ROOT_PATH, start));
        }

        if is_large || !self.config.may_descend_from(0) {
            debug!(size, is_large, "Not descending below the root catalog");
            catalog.close();
            return Ok((state, Vec::new()));
        }

        let listed = catalog.list_nested();
        catalog.close();
        let references = listed.map_err(CrawlError::RootUnavailable)?;

        debug!(nested = references.len(), "Root catalog listed");
        Ok((state, references))
    }

    /// Run the workers until every queued unit is finished
    fn crawl(
        &self,
        state: CrawlState,
        references: Vec<CatalogReference>,
        start: Instant,
    ) -> Result<CrawlState> {
        let index = PreviousIndex::new(self.previous.as_ref());
        if !index.is_empty() {
            debug!(entries = index.len(), "Previous tree indexed");
        }

        let root = state.arena.root();
        let shared = SharedState::new(state);
        let queue = WorkQueue::new();

        let ctx = CrawlContext {
            source: &self.source,
            config: &self.config,
            previous: &index,
            shared: &shared,
            progress: self.progress.as_deref(),
            start,
        };

        ctx.enqueue(&queue.sender(), WorkUnit::new(root, references))?;

        thread::scope(|scope| -> Result<()> {
            let mut handles = Vec::with_capacity(self.config.worker_count);

            for id in 0..self.config.worker_count {
                let ctx = &ctx;
                let queue_rx = queue.receiver();
                let queue_tx = queue.sender();

                let spawned = thread::Builder::new()
                    .name(format!("crawler-{}", id))
                    .spawn_scoped(scope, move || worker_loop(id, ctx, queue_rx, queue_tx));

                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        // Release the workers already running before bailing out
                        shared.finish();
                        return Err(WorkerError::InitFailed {
                            id,
                            reason: e.to_string(),
                        }
                        .into());
                    }
                }
            }

            info!(count = handles.len(), "Workers spawned");

            for (id, handle) in handles.into_iter().enumerate() {
                if handle.join().is_err() {
                    warn!(worker = id, "Worker failed to join cleanly");
                }
            }
            Ok(())
        })?;

        debug!(units = queue.stats().throughput(), "Work queue drained");
        Ok(shared.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::memory::CatalogEntry;
    use crate::repo::MemoryRepository;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn config() -> CrawlConfig {
        CrawlConfig::default()
            .with_workers(4)
            .with_poll_interval(Duration::from_millis(5))
    }

    #[test]
    fn test_single_root() {
        let repo = MemoryRepository::new("r").with_catalog("r", CatalogEntry::new(100));
        let mut builder = CatalogTreeBuilder::new(repo, config());

        let tree = builder.build().unwrap();
        assert!(tree.is_root);
        assert_eq!(tree.cumulative_cost, 100);
        assert!(tree.children.is_empty());
        assert_eq!(builder.stats().catalogs_downloaded, 1);
        assert_eq!(builder.stats().catalogs_found, 1);
    }

    #[test]
    fn test_large_root_not_listed() {
        let repo = MemoryRepository::new("r").with_catalog(
            "r",
            CatalogEntry::new(500).nested(vec![CatalogReference::new("/a", "a", 1)]),
        );
        let mut builder = CatalogTreeBuilder::new(repo, config().with_stop_threshold(100));

        let tree = builder.build().unwrap();
        assert!(tree.is_large);
        assert!(tree.children.is_empty());
        assert_eq!(builder.stats().large_catalogs_found, 1);
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let repo = MemoryRepository::new("r");
        let mut builder = CatalogTreeBuilder::new(repo, config());
        assert!(matches!(builder.build(), Err(CrawlError::RootUnavailable(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let repo = MemoryRepository::new("r").with_catalog("r", CatalogEntry::new(1));
        let mut builder = CatalogTreeBuilder::new(repo, config().with_workers(0));
        assert!(matches!(builder.build(), Err(CrawlError::Config(_))));
    }

    #[test]
    fn test_progress_callback_invoked() {
        let repo = MemoryRepository::new("r")
            .with_catalog(
                "r",
                CatalogEntry::new(10).nested(vec![CatalogReference::new("/a", "a", 5)]),
            )
            .with_catalog("a", CatalogEntry::new(5));

        let calls = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&calls);
        let mut builder = CatalogTreeBuilder::new(repo, config())
            .with_progress(move |_| {
                seen.fetch_add(1, Ordering::Relaxed);
            });

        builder.build().unwrap();
        assert!(calls.load(Ordering::Relaxed) >= 2);
    }
}
