//! In-memory repository
//!
//! Holds a whole catalog graph in memory. Used by the test-suite and by the
//! binary for offline runs against a JSON description:
//!
//! ```json
//! {
//!   "root": "r0",
//!   "catalogs": {
//!     "r0": { "size": 1048576, "cached": true,
//!             "nested": [ { "path": "/sw", "hash": "c1", "size": 0 } ] },
//!     "c1": { "size": 4096, "compressed_size": 1024 }
//!   }
//! }
//! ```
//!
//! Every fetch and probe is counted, and the number of catalog handles open
//! at the same time is tracked so callers can check handles are released.

use crate::error::{RepoError, RepoResult};
use crate::repo::{Catalog, CatalogReference, CatalogSource, ObjectKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// One catalog of an in-memory repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Size of the catalog database
    pub size: u64,

    /// Size of the compressed object, reported by size probes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed_size: Option<u64>,

    /// Present in the local cache
    #[serde(default)]
    pub cached: bool,

    /// Retrieval fails with a transport error
    #[serde(default)]
    pub unreachable: bool,

    /// Retrieval succeeds but listing nested catalogs fails
    #[serde(default)]
    pub broken_listing: bool,

    #[serde(default)]
    pub nested: Vec<CatalogReference>,
}

impl CatalogEntry {
    pub fn new(size: u64) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    pub fn nested(mut self, references: Vec<CatalogReference>) -> Self {
        self.nested = references;
        self
    }

    pub fn compressed_size(mut self, size: u64) -> Self {
        self.compressed_size = Some(size);
        self
    }

    pub fn cached(mut self) -> Self {
        self.cached = true;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn broken_listing(mut self) -> Self {
        self.broken_listing = true;
        self
    }
}

#[derive(Debug, Deserialize)]
struct RepositoryDescription {
    root: String,
    catalogs: HashMap<String, CatalogEntry>,
}

#[derive(Debug, Default)]
struct Counters {
    fetches: AtomicU64,
    probes: AtomicU64,
    open: AtomicUsize,
    max_open: AtomicUsize,
}

/// Repository whose catalogs are held in memory
#[derive(Debug, Clone)]
pub struct MemoryRepository {
    root: String,
    catalogs: HashMap<String, CatalogEntry>,
    latency: Option<Duration>,
    counters: Arc<Counters>,
}

impl MemoryRepository {
    /// Create an empty repository whose root catalog has the given hash
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            catalogs: HashMap::new(),
            latency: None,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Add or replace a catalog
    pub fn with_catalog(mut self, hash: impl Into<String>, entry: CatalogEntry) -> Self {
        self.catalogs.insert(hash.into(), entry);
        self
    }

    /// Sleep this long in every retrieval
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Add or replace a catalog in place
    pub fn insert(&mut self, hash: impl Into<String>, entry: CatalogEntry) {
        self.catalogs.insert(hash.into(), entry);
    }

    /// Parse a JSON repository description
    pub fn from_json_str(json: &str) -> RepoResult<Self> {
        let description: RepositoryDescription =
            serde_json::from_str(json).map_err(|e| RepoError::InvalidDescription(e.to_string()))?;

        if !description.catalogs.contains_key(&description.root) {
            return Err(RepoError::InvalidDescription(format!(
                "root catalog '{}' is not described",
                description.root
            )));
        }

        Ok(Self {
            root: description.root,
            catalogs: description.catalogs,
            latency: None,
            counters: Arc::new(Counters::default()),
        })
    }

    /// Load a JSON repository description from disk
    pub fn from_json_file(path: &Path) -> RepoResult<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| RepoError::Manifest(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Number of catalogs described
    pub fn catalog_count(&self) -> usize {
        self.catalogs.len()
    }

    /// Number of successful and failed retrievals so far
    pub fn fetch_count(&self) -> u64 {
        self.counters.fetches.load(Ordering::SeqCst)
    }

    /// Number of size probes so far
    pub fn probe_count(&self) -> u64 {
        self.counters.probes.load(Ordering::SeqCst)
    }

    /// Catalog handles currently open
    pub fn open_handles(&self) -> usize {
        self.counters.open.load(Ordering::SeqCst)
    }

    /// Highest number of catalog handles open at the same time
    pub fn max_open_handles(&self) -> usize {
        self.counters.max_open.load(Ordering::SeqCst)
    }
}

impl CatalogSource for MemoryRepository {
    type Catalog = MemoryCatalog;

    fn root_hash(&self) -> RepoResult<String> {
        Ok(self.root.clone())
    }

    fn retrieve_catalog(&self, hash: &str) -> RepoResult<MemoryCatalog> {
        self.counters.fetches.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }

        let entry = self.catalogs.get(hash).ok_or_else(|| RepoError::NotFound {
            hash: hash.to_string(),
        })?;

        if entry.unreachable {
            return Err(RepoError::Transport {
                hash: hash.to_string(),
                reason: "connection refused".into(),
            });
        }

        let open = self.counters.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_open.fetch_max(open, Ordering::SeqCst);

        Ok(MemoryCatalog {
            hash: hash.to_string(),
            size: entry.size,
            nested: entry.nested.clone(),
            broken_listing: entry.broken_listing,
            counters: Arc::clone(&self.counters),
        })
    }

    fn probe_object_size(&self, hash: &str, kind: ObjectKind) -> RepoResult<Option<u64>> {
        self.counters.probes.fetch_add(1, Ordering::SeqCst);
        match kind {
            ObjectKind::Catalog => Ok(self.catalogs.get(hash).and_then(|e| e.compressed_size)),
        }
    }

    fn is_in_local_cache(&self, hash: &str) -> bool {
        self.catalogs.get(hash).is_some_and(|e| e.cached)
    }
}

/// An open catalog of a [`MemoryRepository`]
#[derive(Debug)]
pub struct MemoryCatalog {
    hash: String,
    size: u64,
    nested: Vec<CatalogReference>,
    broken_listing: bool,
    counters: Arc<Counters>,
}

impl Catalog for MemoryCatalog {
    fn hash(&self) -> &str {
        &self.hash
    }

    fn db_size(&self) -> u64 {
        self.size
    }

    fn list_nested(&self) -> RepoResult<Vec<CatalogReference>> {
        if self.broken_listing {
            return Err(RepoError::Listing {
                hash: self.hash.clone(),
                reason: "catalog database is malformed".into(),
            });
        }
        Ok(self.nested.clone())
    }
}

impl Drop for MemoryCatalog {
    fn drop(&mut self) {
        self.counters.open.fetch_sub(1, Ordering::SeqCst);
    }
}
