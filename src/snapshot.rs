//! Persisted trees for incremental runs
//!
//! A snapshot wraps the compact tree encoding in an envelope recording the
//! parameters it was built with:
//!
//! ```json
//! {"stop_threshold": 2097152, "max_depth": null, "generated_at": "...", "tree": {...}}
//! ```
//!
//! Files ending in `.zst` are zstd-compressed. Derived fields (depth,
//! cumulative cost, root flag) are never stored and are recomputed on load.

use crate::config::CrawlConfig;
use crate::error::{SnapshotError, SnapshotResult};
use crate::tree::{recalculate, CatalogNode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// zstd level used when saving compressed snapshots
const ZSTD_LEVEL: i32 = 3;

/// A saved tree plus the crawl parameters that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub stop_threshold: u64,

    #[serde(default)]
    pub max_depth: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,

    pub tree: CatalogNode,
}

impl TreeSnapshot {
    /// Wrap a freshly built tree, stamped with the current time
    pub fn new(tree: CatalogNode, config: &CrawlConfig) -> Self {
        Self {
            stop_threshold: config.stop_threshold,
            max_depth: config.max_depth,
            generated_at: Some(Utc::now()),
            tree,
        }
    }

    /// True if this snapshot was built with the same threshold and depth limit
    pub fn matches(&self, config: &CrawlConfig) -> bool {
        self.stop_threshold == config.stop_threshold && self.max_depth == config.max_depth
    }

    /// Take the tree out, failing if the parameters differ from `config`
    pub fn into_tree_for(self, config: &CrawlConfig) -> SnapshotResult<CatalogNode> {
        if !self.matches(config) {
            return Err(SnapshotError::ParameterMismatch {
                found_threshold: self.stop_threshold,
                expected_threshold: config.stop_threshold,
                found_depth: self.max_depth,
                expected_depth: config.max_depth,
            });
        }
        Ok(self.tree)
    }

    /// Encode as JSON, optionally zstd-compressed
    pub fn to_bytes(&self, compress: bool) -> SnapshotResult<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        if !compress {
            return Ok(json);
        }
        zstd::stream::encode_all(json.as_slice(), ZSTD_LEVEL)
            .map_err(|e| SnapshotError::Compression(e.to_string()))
    }

    /// Decode JSON, optionally zstd-compressed, and recompute derived fields
    pub fn from_bytes(bytes: &[u8], compressed: bool) -> SnapshotResult<Self> {
        let mut snapshot: TreeSnapshot = if compressed {
            let json = zstd::stream::decode_all(bytes)
                .map_err(|e| SnapshotError::Compression(e.to_string()))?;
            serde_json::from_slice(&json)?
        } else {
            serde_json::from_slice(bytes)?
        };

        recalculate(&mut snapshot.tree);
        Ok(snapshot)
    }

    /// Write to `path`, compressing if it ends in `.zst`
    pub fn save(&self, path: &Path) -> SnapshotResult<()> {
        let io_error = |source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let bytes = self.to_bytes(is_compressed_path(path))?;
        fs::write(path, &bytes).map_err(io_error)?;

        debug!(path = %path.display(), bytes = bytes.len(), "Snapshot saved");
        Ok(())
    }

    /// Read from `path`, decompressing if it ends in `.zst`
    pub fn load(path: &Path) -> SnapshotResult<Self> {
        let bytes = fs::read(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(&bytes, is_compressed_path(path))
    }
}

/// True if the file name ends in `.zst`
pub fn is_compressed_path(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "zst")
}

/// Load a previous tree if it exists and was built with the same parameters.
///
/// Any failure means "no previous tree": the run proceeds as a full crawl.
pub fn load_previous_tree(path: &Path, config: &CrawlConfig) -> Option<CatalogNode> {
    if !path.exists() {
        info!(path = %path.display(), "No previous tree found, running a full crawl");
        return None;
    }

    match TreeSnapshot::load(path).and_then(|snapshot| snapshot.into_tree_for(config)) {
        Ok(tree) => {
            info!(path = %path.display(), "Loaded previous tree for incremental run");
            Some(tree)
        }
        Err(e @ SnapshotError::ParameterMismatch { .. }) => {
            info!(path = %path.display(), reason = %e, "Previous tree parameters differ, ignoring it");
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not load previous tree");
            None
        }
    }
}
