//! Worker thread logic for the parallel catalog crawl
//!
//! Each worker:
//! - Pulls work units (a parent node plus listed references) from the queue
//! - Decides per reference: ignore, graft, depth stop, large stop, budget stop or fetch
//! - Fetches, lists and closes catalogs without holding the crawl lock
//! - Pushes the references of each fetched catalog back as a new unit

use crate::config::CrawlConfig;
use crate::crawler::queue::{WorkQueueReceiver, WorkQueueSender, WorkUnit};
use crate::crawler::reuse::PreviousIndex;
use crate::crawler::state::{CrawlState, SharedState, UnitGuard};
use crate::crawler::stats::CrawlProgress;
use crate::error::{RefOutcome, RepoError, RepoResult, WorkerError};
use crate::repo::{Catalog, CatalogReference, CatalogSource, ObjectKind};
use crate::tree::path::normalize;
use crate::tree::{count_nodes, NewNode, NodeId};
use std::any::Any;
use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, error, trace, warn};

/// Everything a worker needs, borrowed for the duration of the crawl
pub struct CrawlContext<'a, S: CatalogSource> {
    pub source: &'a S,
    pub config: &'a CrawlConfig,
    pub previous: &'a PreviousIndex<'a>,
    pub shared: &'a SharedState,
    pub progress: Option<&'a (dyn Fn(&CrawlProgress) + Send + Sync)>,
    pub start: Instant,
}

impl<'a, S: CatalogSource> CrawlContext<'a, S> {
    /// Mutate the crawl state under the lock, then report progress outside it
    fn update<R>(&self, path: &str, f: impl FnOnce(&mut CrawlState) -> R) -> R {
        let (result, snapshot) = {
            let mut state = self.shared.lock();
            let result = f(&mut state);
            let snapshot = self.progress.map(|_| state.progress(path, self.start));
            (result, snapshot)
        };

        if let (Some(callback), Some(snapshot)) = (self.progress, snapshot) {
            callback(&snapshot);
        }
        result
    }

    /// Queue a unit, counting it in flight before it becomes visible
    pub fn enqueue(&self, queue_tx: &WorkQueueSender, unit: WorkUnit) -> Result<(), WorkerError> {
        self.shared.begin_unit();
        if queue_tx.send(unit).is_err() {
            self.shared.complete_unit();
            return Err(WorkerError::QueueSendFailed);
        }
        Ok(())
    }

    /// Process every reference of one unit; failures stay local to their reference
    fn process_unit(&self, worker_id: usize, unit: WorkUnit, queue_tx: &WorkQueueSender) {
        for reference in &unit.references {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                self.process_reference(unit.parent, reference)
            }));

            match result {
                Ok(Ok((outcome, next))) => {
                    match &outcome {
                        RefOutcome::Fetched { size, nested, .. } => {
                            trace!(worker = worker_id, path = %outcome.path(), size, nested, "Catalog fetched");
                        }
                        other => {
                            debug!(worker = worker_id, path = %other.path(), outcome = ?other, "Catalog not fetched");
                        }
                    }

                    if let Some(next) = next {
                        if let Err(e) = self.enqueue(queue_tx, next) {
                            error!(worker = worker_id, path = %reference.path, error = %e, "Failed to queue nested catalogs");
                            self.update(&reference.path, |state| state.stats.record_error());
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!(worker = worker_id, path = %reference.path, error = %e, "Catalog reference failed");
                    self.update(&reference.path, |state| state.stats.record_error());
                }
                Err(payload) => {
                    error!(
                        worker = worker_id,
                        path = %reference.path,
                        panic = %panic_message(payload.as_ref()),
                        "Catalog reference panicked"
                    );
                    self.update(&reference.path, |state| state.stats.record_error());
                }
            }
        }
    }

    /// Reference with a canonical path; one naming its own parent is rejected
    fn normalized<'r>(
        &self,
        parent: NodeId,
        reference: &'r CatalogReference,
    ) -> RepoResult<Cow<'r, CatalogReference>> {
        let path = normalize(&reference.path);
        if self.shared.lock().arena.path(parent) == path {
            return Err(RepoError::InvalidReference {
                path: reference.path.clone(),
                reason: "points at the catalog that lists it".into(),
            });
        }

        if path == reference.path {
            Ok(Cow::Borrowed(reference))
        } else {
            Ok(Cow::Owned(CatalogReference::new(
                path,
                reference.hash.clone(),
                reference.size_hint,
            )))
        }
    }

    /// Apply the crawl policy to a single reference
    ///
    /// Returns the outcome and, for fetched catalogs with nested references,
    /// the unit to enqueue.
    fn process_reference(
        &self,
        parent: NodeId,
        reference: &CatalogReference,
    ) -> RepoResult<(RefOutcome, Option<WorkUnit>)> {
        let normalized = self.normalized(parent, reference)?;
        let reference: &CatalogReference = &normalized;
        let path = reference.path.as_str();

        if self.config.is_ignored(path) {
            self.update(path, |state| state.stats.record_ignored());
            return Ok((RefOutcome::Ignored { path: path.to_string() }, None));
        }

        if let Some(previous) = self.previous.graft_candidate(reference) {
            let reused = count_nodes(previous);
            self.update(path, |state| {
                state.arena.graft(parent, previous);
                state.stats.record_reused(reused);
            });
            return Ok((RefOutcome::Grafted { path: path.to_string(), reused }, None));
        }

        let depth = self.update(path, |state| {
            state.stats.record_found(1);
            state.arena.planned_depth(parent, path)
        });
        if self.config.exceeds_depth(depth) {
            return Ok((RefOutcome::DepthLimited { path: path.to_string(), depth }, None));
        }

        let size = self.resolve_size(reference);
        let is_large = self.config.is_large(size);

        let (node, reserved) = self.update(path, |state| {
            if is_large {
                state.stats.record_large();
                state.stats.record_skipped(size);
            }
            let node = state.arena.insert(
                parent,
                NewNode {
                    path: reference.path.clone(),
                    content_hash: reference.hash.clone(),
                    size_bytes: size,
                    is_large,
                },
            );
            let reserved = !is_large && state.reserve_download(self.config.max_catalogs);
            (node, reserved)
        });

        if is_large {
            return Ok((RefOutcome::Large { path: path.to_string(), size }, None));
        }
        if !reserved {
            return Ok((RefOutcome::BudgetExhausted { path: path.to_string() }, None));
        }

        let from_cache = self.source.is_in_local_cache(&reference.hash);
        let catalog = match self.source.retrieve_catalog(&reference.hash) {
            Ok(catalog) => catalog,
            Err(e) => {
                self.shared.lock().release_download();
                return Err(e);
            }
        };

        let actual = catalog.db_size();
        let size_unknown = reference.size_hint == 0;
        let threshold = self.config.stop_threshold;
        let (became_large, node_depth) = self.update(path, |state| {
            state.stats.record_download(actual, from_cache);
            let became_large = size_unknown && state.arena.correct_size(node, actual, threshold);
            if became_large {
                state.stats.record_large();
            }
            (became_large, state.arena.depth(node))
        });

        if became_large || !self.config.may_descend_from(node_depth) {
            catalog.close();
            return Ok((RefOutcome::Fetched { path: path.to_string(), size: actual, nested: 0 }, None));
        }

        let listed = catalog.list_nested();
        catalog.close();
        let references = listed?;

        let nested = references.len();
        let next = (nested > 0).then(|| WorkUnit::new(node, references));
        Ok((RefOutcome::Fetched { path: path.to_string(), size: actual, nested }, next))
    }

    /// Size hint, or a probe of the stored object when the hint is missing
    fn resolve_size(&self, reference: &CatalogReference) -> u64 {
        if reference.size_hint > 0 {
            return reference.size_hint;
        }

        self.update(&reference.path, |state| state.stats.record_probe());
        match self.source.probe_object_size(&reference.hash, ObjectKind::Catalog) {
            Ok(size) => size.unwrap_or(0),
            Err(e) => {
                debug!(path = %reference.path, error = %e, "Size probe failed, treating size as unknown");
                0
            }
        }
    }
}

/// Main worker loop
pub fn worker_loop<S: CatalogSource>(
    id: usize,
    ctx: &CrawlContext<'_, S>,
    queue_rx: WorkQueueReceiver,
    queue_tx: WorkQueueSender,
) {
    debug!(worker = id, "Worker starting");
    let mut units = 0u64;

    while !ctx.shared.is_done() {
        // Timeout - re-check completion and retry
        let unit = match queue_rx.recv_timeout(ctx.config.poll_interval) {
            Some(unit) => unit,
            None => continue,
        };

        let _guard = UnitGuard::new(ctx.shared);
        units += 1;

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            ctx.process_unit(id, unit, &queue_tx)
        }));

        if let Err(payload) = result {
            let e = WorkerError::Panicked {
                id,
                message: panic_message(payload.as_ref()),
            };
            error!(worker = id, error = %e, "Work unit aborted");
            ctx.shared.lock().stats.record_error();
        }
    }

    debug!(worker = id, units, "Worker shutting down");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::queue::WorkQueue;
    use crate::crawler::stats::CrawlStats;
    use crate::repo::memory::CatalogEntry;
    use crate::repo::{MemoryCatalog, MemoryRepository};
    use crate::tree::TreeArena;

    /// Source that panics when asked for one particular catalog
    struct PanickingSource {
        inner: MemoryRepository,
        poisoned: &'static str,
    }

    impl CatalogSource for PanickingSource {
        type Catalog = MemoryCatalog;

        fn root_hash(&self) -> RepoResult<String> {
            self.inner.root_hash()
        }

        fn retrieve_catalog(&self, hash: &str) -> RepoResult<MemoryCatalog> {
            if hash == self.poisoned {
                panic!("corrupt catalog {}", hash);
            }
            self.inner.retrieve_catalog(hash)
        }

        fn probe_object_size(&self, hash: &str, kind: ObjectKind) -> RepoResult<Option<u64>> {
            self.inner.probe_object_size(hash, kind)
        }
    }

    struct Fixture {
        repo: MemoryRepository,
        config: CrawlConfig,
        shared: SharedState,
    }

    impl Fixture {
        fn new(repo: MemoryRepository, config: CrawlConfig) -> Self {
            let mut stats = CrawlStats::default();
            stats.record_download(10, false);
            let state = CrawlState::new(TreeArena::with_root("root", 10, false), stats);
            Self {
                repo,
                config,
                shared: SharedState::new(state),
            }
        }

        fn run(&self, reference: CatalogReference) -> (RefOutcome, Option<WorkUnit>) {
            let index = PreviousIndex::new(None);
            let ctx = CrawlContext {
                source: &self.repo,
                config: &self.config,
                previous: &index,
                shared: &self.shared,
                progress: None,
                start: Instant::now(),
            };
            let root = self.shared.lock().arena.root();
            ctx.process_reference(root, &reference).unwrap()
        }
    }

    #[test]
    fn test_fetch_returns_nested_unit() {
        let repo = MemoryRepository::new("root").with_catalog(
            "a",
            CatalogEntry::new(5).nested(vec![CatalogReference::new("/a/b", "b", 3)]),
        );
        let fixture = Fixture::new(repo, CrawlConfig::default());

        let (outcome, next) = fixture.run(CatalogReference::new("/a", "a", 5));
        assert!(outcome.is_fetched());
        assert_eq!(next.unwrap().references.len(), 1);
        assert_eq!(fixture.repo.open_handles(), 0);

        let state = fixture.shared.lock();
        assert_eq!(state.stats.catalogs_downloaded, 2);
        assert_eq!(state.stats.catalogs_found, 1);
    }

    #[test]
    fn test_large_reference_not_fetched() {
        let repo = MemoryRepository::new("root").with_catalog("a", CatalogEntry::new(500));
        let fixture = Fixture::new(repo, CrawlConfig::default().with_stop_threshold(100));

        let (outcome, next) = fixture.run(CatalogReference::new("/a", "a", 500));
        assert!(matches!(outcome, RefOutcome::Large { size: 500, .. }));
        assert!(next.is_none());
        assert_eq!(fixture.repo.fetch_count(), 0);

        let state = fixture.shared.lock();
        assert_eq!(state.stats.bytes_skipped, 500);
        assert_eq!(state.arena.len(), 2);
    }

    #[test]
    fn test_budget_exhausted_creates_node() {
        let repo = MemoryRepository::new("root").with_catalog("a", CatalogEntry::new(5));
        let fixture = Fixture::new(repo, CrawlConfig::default().with_max_catalogs(Some(1)));

        let (outcome, _) = fixture.run(CatalogReference::new("/a", "a", 5));
        assert!(matches!(outcome, RefOutcome::BudgetExhausted { .. }));
        assert_eq!(fixture.repo.fetch_count(), 0);
        assert_eq!(fixture.shared.lock().arena.len(), 2);
    }

    #[test]
    fn test_failed_fetch_releases_budget_slot() {
        let repo = MemoryRepository::new("root").with_catalog("a", CatalogEntry::new(5).unreachable());
        let fixture = Fixture::new(repo, CrawlConfig::default().with_max_catalogs(Some(2)));

        let index = PreviousIndex::new(None);
        let ctx = CrawlContext {
            source: &fixture.repo,
            config: &fixture.config,
            previous: &index,
            shared: &fixture.shared,
            progress: None,
            start: Instant::now(),
        };
        let root = fixture.shared.lock().arena.root();
        assert!(ctx
            .process_reference(root, &CatalogReference::new("/a", "a", 5))
            .is_err());

        assert_eq!(fixture.shared.lock().downloads_reserved, 1);
    }

    #[test]
    fn test_probe_and_size_correction() {
        let repo = MemoryRepository::new("root").with_catalog("a", CatalogEntry::new(800));
        let fixture = Fixture::new(repo, CrawlConfig::default().with_stop_threshold(100));

        // No hint and no compressed size to probe: fetched, then corrected
        let (outcome, next) = fixture.run(CatalogReference::new("/a", "a", 0));
        assert!(outcome.is_fetched());
        assert!(next.is_none());

        let state = fixture.shared.lock();
        assert_eq!(state.stats.size_probes, 1);
        assert_eq!(state.stats.large_catalogs_found, 1);
        let tree = state.arena.clone().into_tree();
        let node = tree.find("/a").unwrap();
        assert!(node.is_large);
        assert_eq!(node.size_bytes, 800);
    }

    #[test]
    fn test_worker_loop_drains_queue() {
        let repo = MemoryRepository::new("root")
            .with_catalog(
                "a",
                CatalogEntry::new(5).nested(vec![CatalogReference::new("/a/b", "b", 3)]),
            )
            .with_catalog("b", CatalogEntry::new(3));
        let fixture = Fixture::new(repo, CrawlConfig::default());
        let index = PreviousIndex::new(None);
        let ctx = CrawlContext {
            source: &fixture.repo,
            config: &fixture.config,
            previous: &index,
            shared: &fixture.shared,
            progress: None,
            start: Instant::now(),
        };

        let queue = WorkQueue::new();
        let root = fixture.shared.lock().arena.root();
        ctx.enqueue(
            &queue.sender(),
            WorkUnit::new(root, vec![CatalogReference::new("/a", "a", 5)]),
        )
        .unwrap();

        worker_loop(0, &ctx, queue.receiver(), queue.sender());

        assert!(fixture.shared.is_done());
        let state = fixture.shared.lock();
        assert_eq!(state.stats.catalogs_downloaded, 3);
        assert_eq!(state.in_flight, 0);
    }

    #[test]
    fn test_trailing_slash_path_is_normalized() {
        let repo = MemoryRepository::new("root").with_catalog("a", CatalogEntry::new(5));
        let fixture = Fixture::new(repo, CrawlConfig::default());

        let (outcome, _) = fixture.run(CatalogReference::new("/a/", "a", 5));
        assert_eq!(outcome.path(), "/a");

        let tree = fixture.shared.lock().arena.clone().into_tree();
        assert!(tree.find("/a").is_some());
        assert!(tree.find("/a/").is_none());
    }

    #[test]
    fn test_reference_to_own_parent_rejected() {
        let repo = MemoryRepository::new("root").with_catalog("a", CatalogEntry::new(5));
        let fixture = Fixture::new(repo, CrawlConfig::default());
        let index = PreviousIndex::new(None);
        let ctx = CrawlContext {
            source: &fixture.repo,
            config: &fixture.config,
            previous: &index,
            shared: &fixture.shared,
            progress: None,
            start: Instant::now(),
        };
        let root = fixture.shared.lock().arena.root();
        ctx.process_reference(root, &CatalogReference::new("/a", "a", 5))
            .unwrap();
        let a = fixture.shared.lock().arena.children(root)[0];

        let result = ctx.process_reference(a, &CatalogReference::new("/a/", "a", 5));
        assert!(matches!(result, Err(RepoError::InvalidReference { .. })));
        assert_eq!(fixture.repo.fetch_count(), 1);
    }

    #[test]
    fn test_depth_limited_reference_is_not_sized() {
        let repo = MemoryRepository::new("root")
            .with_catalog("deep", CatalogEntry::new(500).compressed_size(500));
        let config = CrawlConfig::default()
            .with_stop_threshold(100)
            .with_max_depth(Some(1));
        let fixture = Fixture::new(repo, config);

        // Two levels below the root once the virtual /x is counted
        let (outcome, _) = fixture.run(CatalogReference::new("/x/deep", "deep", 0));
        assert!(matches!(outcome, RefOutcome::DepthLimited { depth: 2, .. }));
        assert_eq!(fixture.repo.probe_count(), 0);

        let state = fixture.shared.lock();
        assert_eq!(state.stats.catalogs_found, 1);
        assert_eq!(state.stats.large_catalogs_found, 0);
        assert_eq!(state.arena.len(), 1);
    }

    #[test]
    fn test_panicking_reference_spares_siblings() {
        let repo = MemoryRepository::new("root")
            .with_catalog("bad", CatalogEntry::new(5))
            .with_catalog(
                "ok",
                CatalogEntry::new(5).nested(vec![CatalogReference::new("/ok/x", "x", 1)]),
            )
            .with_catalog("x", CatalogEntry::new(1))
            .with_catalog("z", CatalogEntry::new(2));
        let fixture = Fixture::new(repo, CrawlConfig::default());
        let source = PanickingSource {
            inner: fixture.repo.clone(),
            poisoned: "bad",
        };
        let index = PreviousIndex::new(None);
        let ctx = CrawlContext {
            source: &source,
            config: &fixture.config,
            previous: &index,
            shared: &fixture.shared,
            progress: None,
            start: Instant::now(),
        };

        let queue = WorkQueue::new();
        let root = fixture.shared.lock().arena.root();
        ctx.enqueue(
            &queue.sender(),
            WorkUnit::new(
                root,
                vec![
                    CatalogReference::new("/bad", "bad", 5),
                    CatalogReference::new("/ok", "ok", 5),
                ],
            ),
        )
        .unwrap();
        ctx.enqueue(
            &queue.sender(),
            WorkUnit::new(root, vec![CatalogReference::new("/z", "z", 2)]),
        )
        .unwrap();

        worker_loop(0, &ctx, queue.receiver(), queue.sender());

        assert!(fixture.shared.is_done());
        let state = fixture.shared.lock();
        assert_eq!(state.in_flight, 0);
        assert_eq!(state.stats.errors, 1);

        let tree = state.arena.clone().into_tree();
        assert!(tree.find("/ok/x").is_some());
        assert!(tree.find("/z").is_some());
        assert!(tree.find("/bad").unwrap().children.is_empty());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
