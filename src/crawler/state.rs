//! State shared by all crawl workers
//!
//! One coarse lock guards the tree, the counters, the in-flight counter and
//! the download budget. Repository calls are always made without it.

use crate::crawler::stats::{CrawlProgress, CrawlStats};
use crate::tree::TreeArena;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Everything guarded by the crawl lock
#[derive(Debug)]
pub struct CrawlState {
    pub arena: TreeArena,
    pub stats: CrawlStats,

    /// Work units enqueued but not yet finished
    pub in_flight: u64,

    /// Downloads performed or about to be performed, root included
    pub downloads_reserved: u64,
}

impl CrawlState {
    pub fn new(arena: TreeArena, stats: CrawlStats) -> Self {
        Self {
            arena,
            downloads_reserved: stats.catalogs_downloaded,
            stats,
            in_flight: 0,
        }
    }

    /// Claim a download slot if the budget allows it
    pub fn reserve_download(&mut self, budget: Option<u64>) -> bool {
        if budget.is_some_and(|max| self.downloads_reserved >= max) {
            return false;
        }
        self.downloads_reserved += 1;
        true
    }

    /// Give back a slot whose download failed
    pub fn release_download(&mut self) {
        self.downloads_reserved = self.downloads_reserved.saturating_sub(1);
    }

    pub fn progress(&self, path: &str, start: Instant) -> CrawlProgress {
        CrawlProgress {
            path: path.to_string(),
            stats: self.stats.clone(),
            in_flight: self.in_flight,
            elapsed: start.elapsed(),
        }
    }
}

/// Lock-guarded crawl state plus the completion signal
pub struct SharedState {
    state: Mutex<CrawlState>,
    done: AtomicBool,
}

impl SharedState {
    pub fn new(state: CrawlState) -> Self {
        Self {
            state: Mutex::new(state),
            done: AtomicBool::new(false),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, CrawlState> {
        self.state.lock()
    }

    /// True once no work unit is outstanding
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Release every worker loop
    pub fn finish(&self) {
        self.done.store(true, Ordering::Release);
    }

    /// Account for a unit about to be enqueued
    pub fn begin_unit(&self) {
        self.state.lock().in_flight += 1;
    }

    /// Account for a finished unit, signalling completion at zero
    pub fn complete_unit(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 {
            self.finish();
        }
    }

    pub fn into_inner(self) -> CrawlState {
        self.state.into_inner()
    }
}

/// RAII guard marking one dequeued unit as finished when dropped
///
/// Dropping also happens while unwinding, so a failing unit can never leave
/// the in-flight counter stuck above zero.
pub struct UnitGuard<'a> {
    shared: &'a SharedState,
}

impl<'a> UnitGuard<'a> {
    pub fn new(shared: &'a SharedState) -> Self {
        Self { shared }
    }
}

impl Drop for UnitGuard<'_> {
    fn drop(&mut self) {
        self.shared.complete_unit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> CrawlState {
        let mut stats = CrawlStats::default();
        stats.record_download(10, false);
        CrawlState::new(TreeArena::with_root("r", 10, false), stats)
    }

    #[test]
    fn test_download_budget_counts_root() {
        let mut state = state();
        assert!(state.reserve_download(Some(2)));
        assert!(!state.reserve_download(Some(2)));
        state.release_download();
        assert!(state.reserve_download(Some(2)));
        assert!(state.reserve_download(None));
    }

    #[test]
    fn test_completion_signal() {
        let shared = SharedState::new(state());
        shared.begin_unit();
        shared.begin_unit();
        assert!(!shared.is_done());

        drop(UnitGuard::new(&shared));
        assert!(!shared.is_done());
        drop(UnitGuard::new(&shared));
        assert!(shared.is_done());
        assert_eq!(shared.into_inner().in_flight, 0);
    }

    #[test]
    fn test_guard_runs_on_panic() {
        let shared = SharedState::new(state());
        shared.begin_unit();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = UnitGuard::new(&shared);
            panic!("unit failed");
        }));

        assert!(result.is_err());
        assert!(shared.is_done());
    }
}
