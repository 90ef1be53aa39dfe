//! Incremental reuse of a previous run's tree
//!
//! Catalogs are content-addressed: a reference whose hash matches the node
//! recorded at the same path last time is guaranteed to describe the same
//! subtree, so the old subtree can be spliced in without fetching anything.

use crate::repo::CatalogReference;
use crate::tree::{build_lookup, count_nodes, recalculate, CatalogNode};
use std::collections::HashMap;

/// Path index over a previous tree.
///
/// Built once before workers start and only read afterwards.
#[derive(Debug, Default)]
pub struct PreviousIndex<'a> {
    lookup: HashMap<&'a str, &'a CatalogNode>,
}

impl<'a> PreviousIndex<'a> {
    pub fn new(previous: Option<&'a CatalogNode>) -> Self {
        Self {
            lookup: previous.map(build_lookup).unwrap_or_default(),
        }
    }

    /// Previous subtree that can stand in for `reference`, if unchanged
    pub fn graft_candidate(&self, reference: &CatalogReference) -> Option<&'a CatalogNode> {
        self.lookup
            .get(reference.path.as_str())
            .copied()
            .filter(|node| node.content_hash == reference.hash)
    }

    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }
}

/// True if the previous tree was built from the current root catalog
pub fn root_unchanged(previous: &CatalogNode, root_hash: &str) -> bool {
    !previous.content_hash.is_empty() && previous.content_hash == root_hash
}

/// Re-anchor a previous tree for verbatim reuse; returns its node count
pub fn reuse_whole(previous: &mut CatalogNode) -> u64 {
    recalculate(previous);
    count_nodes(previous)
}
