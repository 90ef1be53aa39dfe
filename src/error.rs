//! Error types for catalog-walker
//!
//! This module defines the error hierarchy used by the crawler:
//! - Repository errors (fetching, probing and listing catalogs)
//! - Configuration and CLI errors
//! - Worker thread errors
//! - Tree snapshot persistence errors
//!
//! Only root-level failures abort a crawl. Everything that goes wrong below
//! the root is logged, counted and treated as "this branch stops here".

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for catalog-walker
#[derive(Error, Debug)]
pub enum CrawlError {
    /// The root catalog (or the root hash) could not be obtained
    #[error("Root catalog unavailable: {0}")]
    RootUnavailable(#[source] RepoError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

/// Errors raised by a catalog repository
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    /// The manifest naming the root catalog could not be read
    #[error("Failed to read repository manifest: {0}")]
    Manifest(String),

    /// The object is not present in the repository
    #[error("Catalog not found: {hash}")]
    NotFound { hash: String },

    /// Transport failure while retrieving an object
    #[error("Failed to retrieve catalog {hash}: {reason}")]
    Transport { hash: String, reason: String },

    /// The catalog was retrieved but its nested references could not be listed
    #[error("Failed to list nested catalogs of {hash}: {reason}")]
    Listing { hash: String, reason: String },

    /// A listed reference cannot be placed in the tree
    #[error("Invalid catalog reference '{path}': {reason}")]
    InvalidReference { path: String, reason: String },

    /// Repository description could not be parsed
    #[error("Invalid repository description: {0}")]
    InvalidDescription(String),
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid size string
    #[error("Invalid size value '{value}': {reason}")]
    InvalidSize { value: String, reason: String },

    /// Invalid ignore path
    #[error("Invalid ignore path '{path}': {reason}")]
    InvalidIgnorePath { path: String, reason: String },

    /// Download budget too small to fetch the root catalog
    #[error("Invalid max catalogs {0}: the root catalog alone needs one download")]
    InvalidMaxCatalogs(u64),
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked outside the per-unit boundary
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Worker initialization failed
    #[error("Failed to initialize worker {id}: {reason}")]
    InitFailed { id: usize, reason: String },

    /// Work queue send failed
    #[error("Failed to send work unit: queue closed")]
    QueueSendFailed,
}

/// Tree snapshot persistence errors
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// File could not be read or written
    #[error("Snapshot I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding or decoding failed
    #[error("Snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// zstd compression or decompression failed
    #[error("Snapshot compression error: {0}")]
    Compression(String),

    /// Snapshot was produced with different crawl parameters
    #[error(
        "Snapshot parameters differ (stop threshold {found_threshold} vs {expected_threshold}, \
         max depth {found_depth:?} vs {expected_depth:?})"
    )]
    ParameterMismatch {
        found_threshold: u64,
        expected_threshold: u64,
        found_depth: Option<u32>,
        expected_depth: Option<u32>,
    },
}

/// Result type alias for CrawlError
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for RepoError
pub type RepoResult<T> = std::result::Result<T, RepoError>;

/// Result type alias for SnapshotError
pub type SnapshotResult<T> = std::result::Result<T, SnapshotError>;

/// What happened to a single catalog reference
#[derive(Debug)]
pub enum RefOutcome {
    /// Matched an ignore prefix, no node created
    Ignored { path: String },

    /// Previous subtree spliced in without fetching
    Grafted { path: String, reused: u64 },

    /// Above the stop threshold, node created without descending
    Large { path: String, size: u64 },

    /// Deeper than the configured max depth, no node created.
    ///
    /// Depth is checked before the size is resolved, so such a reference is
    /// never probed and never counted as large or skipped.
    DepthLimited { path: String, depth: u32 },

    /// Download budget exhausted, node created without fetching
    BudgetExhausted { path: String },

    /// Catalog fetched; `nested` is the number of references queued for descent
    Fetched { path: String, size: u64, nested: usize },
}

impl RefOutcome {
    /// Returns true if the catalog was downloaded
    pub fn is_fetched(&self) -> bool {
        matches!(self, RefOutcome::Fetched { .. })
    }

    /// Returns the path associated with this outcome
    pub fn path(&self) -> &str {
        match self {
            RefOutcome::Ignored { path }
            | RefOutcome::Grafted { path, .. }
            | RefOutcome::Large { path, .. }
            | RefOutcome::DepthLimited { path, .. }
            | RefOutcome::BudgetExhausted { path }
            | RefOutcome::Fetched { path, .. } => path,
        }
    }
}
