//! Configuration types for catalog-walker
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime crawl configuration with validation
//! - Human-readable size parsing (`2MB`, `500K`, `1.5G`)

use crate::error::ConfigError;
use crate::tree::path::{is_within, normalize};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Default stop threshold (2 MiB)
pub const DEFAULT_STOP_THRESHOLD: u64 = 2 * 1024 * 1024;

/// Default worker count for library users
pub const DEFAULT_WORKERS: usize = 50;

/// Default bounded-wait interval for dequeueing work
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Map nested catalogs and their cumulative download cost
#[derive(Parser, Debug, Clone)]
#[command(
    name = "catalog-walker",
    version,
    about = "Map nested catalogs and their cumulative download cost",
    long_about = "Crawls a tree of content-addressed catalogs and reports, for every path, \
                  how many bytes must be downloaded to reach it.\n\n\
                  Catalogs above the stop threshold are recorded but not explored. \
                  A tree saved with --save-tree can be passed back with --previous-tree \
                  so unchanged branches are reused instead of downloaded.",
    after_help = "EXAMPLES:\n    \
        catalog-walker repo.json\n    \
        catalog-walker repo.json -s 5MB -d 4\n    \
        catalog-walker repo.json --ignore /lib/var --ignore /lib/tmp\n    \
        catalog-walker repo.json --save-tree tree.json.zst\n    \
        catalog-walker repo.json --previous-tree tree.json.zst --save-tree tree.json.zst"
)]
pub struct CliArgs {
    /// Repository description (JSON catalog graph)
    #[arg(value_name = "REPO")]
    pub repository: PathBuf,

    /// Stop descending when a catalog exceeds this size (B, KB, MB, GB suffixes)
    #[arg(short = 's', long, default_value = "2MB", value_name = "SIZE", value_parser = parse_size)]
    pub stop_threshold: u64,

    /// Maximum depth to traverse (unlimited if not set)
    #[arg(short = 'd', long, value_name = "N")]
    pub max_depth: Option<u32>,

    /// Maximum number of catalogs to download (unlimited if not set)
    #[arg(long, value_name = "N")]
    pub max_catalogs: Option<u64>,

    /// Ignore paths under this prefix (can be repeated)
    #[arg(long = "ignore", value_name = "PATH", action = clap::ArgAction::Append)]
    pub ignore_paths: Vec<String>,

    /// Tree saved by a previous run, reused for unchanged branches
    #[arg(long, value_name = "FILE")]
    pub previous_tree: Option<PathBuf>,

    /// Save the resulting tree for future incremental runs (.zst compresses)
    #[arg(long, value_name = "FILE")]
    pub save_tree: Option<PathBuf>,

    /// Number of parallel workers
    #[arg(short = 'j', long, default_value = "10", value_name = "N")]
    pub workers: usize,

    /// Print the tree as JSON
    #[arg(long)]
    pub json: bool,

    /// Write JSON output to this file instead of stdout
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (show per-catalog decisions and failures)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Parse a size such as `2MB`, `500KB`, `1.5G` or `4096` into bytes
pub fn parse_size(value: &str) -> Result<u64, ConfigError> {
    const UNITS: [(&str, u64); 7] = [
        ("GB", 1024 * 1024 * 1024),
        ("MB", 1024 * 1024),
        ("KB", 1024),
        ("G", 1024 * 1024 * 1024),
        ("M", 1024 * 1024),
        ("K", 1024),
        ("B", 1),
    ];

    let normalized = value.trim().to_ascii_uppercase();
    let invalid = |reason: &str| ConfigError::InvalidSize {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let (number, multiplier) = UNITS
        .iter()
        .find_map(|(suffix, mult)| normalized.strip_suffix(suffix).map(|n| (n.trim(), *mult)))
        .unwrap_or((normalized.as_str(), 1));

    if number.is_empty() {
        return Err(invalid("missing number"));
    }

    if let Ok(whole) = number.parse::<u64>() {
        return whole
            .checked_mul(multiplier)
            .ok_or_else(|| invalid("value too large"));
    }

    let fractional: f64 = number.parse().map_err(|_| invalid("not a number"))?;
    if !fractional.is_finite() || fractional < 0.0 {
        return Err(invalid("must be a non-negative number"));
    }
    Ok((fractional * multiplier as f64) as u64)
}

/// Validated crawl configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlConfig {
    /// Catalogs larger than this are recorded but not explored
    pub stop_threshold: u64,

    /// Maximum traversal depth
    pub max_depth: Option<u32>,

    /// Maximum number of catalogs to download, root included
    pub max_catalogs: Option<u64>,

    /// Normalised ignore prefixes
    pub ignore_paths: Vec<String>,

    /// Number of worker threads
    pub worker_count: usize,

    /// How long an idle worker waits on the queue before re-checking completion
    pub poll_interval: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            stop_threshold: DEFAULT_STOP_THRESHOLD,
            max_depth: None,
            max_catalogs: None,
            ignore_paths: Vec::new(),
            worker_count: DEFAULT_WORKERS,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl CrawlConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let config = Self {
            stop_threshold: args.stop_threshold,
            max_depth: args.max_depth,
            max_catalogs: args.max_catalogs,
            ignore_paths: Vec::new(),
            worker_count: args.workers,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
        .with_ignore_paths(args.ignore_paths.iter().map(String::as_str))?;

        config.validate()?;
        Ok(config)
    }

    /// Check invariants that setters cannot enforce on their own
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 || self.worker_count > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: self.worker_count,
                max: MAX_WORKERS,
            });
        }
        if self.max_catalogs == Some(0) {
            return Err(ConfigError::InvalidMaxCatalogs(0));
        }
        Ok(())
    }

    pub fn with_stop_threshold(mut self, bytes: u64) -> Self {
        self.stop_threshold = bytes;
        self
    }

    pub fn with_max_depth(mut self, depth: Option<u32>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_max_catalogs(mut self, count: Option<u64>) -> Self {
        self.max_catalogs = count;
        self
    }

    pub fn with_workers(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Add ignore prefixes, normalising each to `/a/b` form
    pub fn with_ignore_paths<'a>(
        mut self,
        paths: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, ConfigError> {
        for raw in paths {
            let path = normalize(raw);
            if path == "/" {
                return Err(ConfigError::InvalidIgnorePath {
                    path: raw.to_string(),
                    reason: "ignoring the root would skip everything".into(),
                });
            }
            if !self.ignore_paths.contains(&path) {
                self.ignore_paths.push(path);
            }
        }
        Ok(self)
    }

    /// Check if a catalog path falls under an ignore prefix
    pub fn is_ignored(&self, path: &str) -> bool {
        self.ignore_paths.iter().any(|prefix| is_within(path, prefix))
    }

    /// Check if a catalog of this size stops exploration
    pub fn is_large(&self, size: u64) -> bool {
        size > self.stop_threshold
    }

    /// Check if a node at `depth` exceeds the depth limit
    pub fn exceeds_depth(&self, depth: u32) -> bool {
        self.max_depth.is_some_and(|max| depth > max)
    }

    /// Check if children of a node at `depth` may still be explored
    pub fn may_descend_from(&self, depth: u32) -> bool {
        self.max_depth.map_or(true, |max| depth < max)
    }
}
