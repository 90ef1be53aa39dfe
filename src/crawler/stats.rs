//! Crawl statistics and progress snapshots
//!
//! Counters are plain integers: they are only mutated under the crawl lock,
//! in the same critical section as the tree change they describe, so any
//! snapshot taken under that lock is internally consistent.

use std::time::Duration;

/// Counters accumulated during a crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    /// Catalogs retrieved (from network or local cache)
    pub catalogs_downloaded: u64,

    /// Bytes of retrieved catalogs
    pub bytes_downloaded: u64,

    /// Catalogs discovered, grafted subtrees counted per node
    pub catalogs_found: u64,

    /// Catalogs above the stop threshold
    pub large_catalogs_found: u64,

    /// Size probes issued for references without a size hint
    pub size_probes: u64,

    /// Bytes of large catalogs that were not downloaded
    pub bytes_skipped: u64,

    /// References dropped by an ignore prefix
    pub ignored: u64,

    /// Retrievals served by the local disk cache
    pub cache_hits: u64,

    /// Bytes of retrievals served by the local disk cache
    pub bytes_from_cache: u64,

    /// Nodes taken over from the previous tree
    pub reused_nodes: u64,

    /// References whose processing failed
    pub errors: u64,
}

impl CrawlStats {
    pub fn record_found(&mut self, count: u64) {
        self.catalogs_found += count;
    }

    pub fn record_large(&mut self) {
        self.large_catalogs_found += 1;
    }

    pub fn record_skipped(&mut self, bytes: u64) {
        self.bytes_skipped += bytes;
    }

    pub fn record_probe(&mut self) {
        self.size_probes += 1;
    }

    pub fn record_ignored(&mut self) {
        self.ignored += 1;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    /// A catalog was retrieved; `from_cache` if it was on disk beforehand
    pub fn record_download(&mut self, bytes: u64, from_cache: bool) {
        self.catalogs_downloaded += 1;
        self.bytes_downloaded += bytes;
        if from_cache {
            self.cache_hits += 1;
            self.bytes_from_cache += bytes;
        }
    }

    /// A subtree of `nodes` catalogs was reused; they also count as found
    pub fn record_reused(&mut self, nodes: u64) {
        self.reused_nodes += nodes;
        self.catalogs_found += nodes;
    }

    /// Catalogs that actually went over the network
    pub fn network_catalogs(&self) -> u64 {
        self.catalogs_downloaded.saturating_sub(self.cache_hits)
    }

    /// Bytes that actually went over the network
    pub fn network_bytes(&self) -> u64 {
        self.bytes_downloaded.saturating_sub(self.bytes_from_cache)
    }
}

/// Snapshot handed to the progress callback
///
/// The callback receives its own copy; nothing in it refers back to the
/// crawl state.
#[derive(Debug, Clone)]
pub struct CrawlProgress {
    /// Path of the catalog whose processing produced this snapshot
    pub path: String,

    /// Counters at the time of the snapshot
    pub stats: CrawlStats,

    /// Work units queued or being processed
    pub in_flight: u64,

    /// Time since the crawl started
    pub elapsed: Duration,
}

impl CrawlProgress {
    /// Downloaded catalogs per second
    pub fn catalogs_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.stats.catalogs_downloaded as f64 / secs
        } else {
            0.0
        }
    }
}

/// Progress callback; invoked outside the crawl lock and must return quickly
pub type ProgressFn = Box<dyn Fn(&CrawlProgress) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crawl_stats() {
        let mut stats = CrawlStats::default();

        stats.record_download(100, false);
        stats.record_download(40, true);
        stats.record_found(2);
        stats.record_reused(5);
        stats.record_large();
        stats.record_skipped(1000);
        stats.record_probe();
        stats.record_ignored();
        stats.record_error();

        assert_eq!(stats.catalogs_downloaded, 2);
        assert_eq!(stats.bytes_downloaded, 140);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.network_catalogs(), 1);
        assert_eq!(stats.network_bytes(), 100);
        assert_eq!(stats.catalogs_found, 7);
        assert_eq!(stats.reused_nodes, 5);
        assert_eq!(stats.bytes_skipped, 1000);
        assert_eq!(stats.size_probes, 1);
        assert_eq!(stats.ignored, 1);
        assert_eq!(stats.errors, 1);
    }

    #[test]
    fn test_progress_rate() {
        let progress = CrawlProgress {
            path: "/".into(),
            stats: CrawlStats {
                catalogs_downloaded: 50,
                ..CrawlStats::default()
            },
            in_flight: 3,
            elapsed: Duration::from_secs(10),
        };
        assert!((progress.catalogs_per_second() - 5.0).abs() < 0.01);
    }
}
