//! Repository access
//!
//! The crawler talks to a repository only through [`CatalogSource`] and
//! [`Catalog`]. Transport, on-disk caching and the catalog file format live
//! behind these traits.
//!
//! # Handle lifecycle
//!
//! ```text
//! retrieve_catalog(hash) ──► Catalog ──► list_nested() ──► close()
//!                                │                           │
//!                                └──── worker-local only ────┘
//! ```
//!
//! A catalog handle never crosses the work queue: it is listed and closed by
//! the worker that fetched it, so open handles are bounded by the worker count.

pub mod memory;

use crate::error::RepoResult;
use serde::{Deserialize, Serialize};

pub use memory::{MemoryCatalog, MemoryRepository};

/// A nested catalog reference as listed by its parent catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogReference {
    /// Absolute path the nested catalog is mounted at
    pub path: String,

    /// Content hash of the nested catalog
    pub hash: String,

    /// Size recorded by the parent, 0 if unknown
    #[serde(default, rename = "size")]
    pub size_hint: u64,
}

impl CatalogReference {
    pub fn new(path: impl Into<String>, hash: impl Into<String>, size_hint: u64) -> Self {
        Self {
            path: path.into(),
            hash: hash.into(),
            size_hint,
        }
    }
}

/// Kind of repository object, used when probing sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Compressed catalog object
    Catalog,
}

/// An opened catalog
pub trait Catalog {
    /// Content hash of this catalog
    fn hash(&self) -> &str;

    /// Size in bytes of the catalog database
    fn db_size(&self) -> u64;

    /// References to the catalogs nested directly below this one
    fn list_nested(&self) -> RepoResult<Vec<CatalogReference>>;

    /// Release the handle
    fn close(self)
    where
        Self: Sized,
    {
        drop(self)
    }
}

/// A repository the crawler can fetch catalogs from
///
/// Implementations are shared by every worker thread.
pub trait CatalogSource: Send + Sync {
    type Catalog: Catalog;

    /// Hash of the current root catalog
    fn root_hash(&self) -> RepoResult<String>;

    /// Fetch and open a catalog
    fn retrieve_catalog(&self, hash: &str) -> RepoResult<Self::Catalog>;

    /// Size of an object without retrieving it, if the repository can tell
    fn probe_object_size(&self, hash: &str, kind: ObjectKind) -> RepoResult<Option<u64>>;

    /// Whether the object already sits in the local disk cache.
    ///
    /// Best effort, only used for cache-hit accounting.
    fn is_in_local_cache(&self, _hash: &str) -> bool {
        false
    }
}
