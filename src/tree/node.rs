//! Catalog tree node and pure tree operations
//!
//! The serialized form is compact: `path`, `hash` and `size` are
//! always written, `is_large`, `is_virtual` and `children` only when set.
//! `depth`, `cumulative_cost` and `is_root` are derivable from the shape of
//! the tree and are restored by [`recalculate`] after loading.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// A node in the catalog cost tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogNode {
    /// Absolute slash-separated path, `/` for the root
    pub path: String,

    /// Hash of the backing catalog, empty for virtual nodes
    #[serde(rename = "hash")]
    pub content_hash: String,

    /// Bytes attributed to this node alone
    #[serde(rename = "size")]
    pub size_bytes: u64,

    /// Size exceeded the stop threshold; children were not explored
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_large: bool,

    /// No catalog backs this node
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_virtual: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CatalogNode>,

    /// Sum of `size_bytes` over this node and all its ancestors
    #[serde(skip)]
    pub cumulative_cost: u64,

    #[serde(skip)]
    pub depth: u32,

    #[serde(skip)]
    pub is_root: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl CatalogNode {
    /// Create the root node of a fresh tree
    pub fn root(content_hash: impl Into<String>, size_bytes: u64, is_large: bool) -> Self {
        Self {
            path: "/".to_string(),
            content_hash: content_hash.into(),
            size_bytes,
            is_large,
            is_virtual: false,
            children: Vec::new(),
            cumulative_cost: size_bytes,
            depth: 0,
            is_root: true,
        }
    }

    /// Create a catalog-backed node with no children
    pub fn leaf(path: impl Into<String>, content_hash: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            path: path.into(),
            content_hash: content_hash.into(),
            size_bytes,
            is_large: false,
            is_virtual: false,
            children: Vec::new(),
            cumulative_cost: 0,
            depth: 0,
            is_root: false,
        }
    }

    /// Create a virtual directory marker
    pub fn virtual_dir(path: impl Into<String>) -> Self {
        Self {
            is_virtual: true,
            ..Self::leaf(path, String::new(), 0)
        }
    }

    /// Append a child and return `self` for chained construction
    pub fn with_child(mut self, child: CatalogNode) -> Self {
        self.children.push(child);
        self
    }

    /// Mark the node as large
    pub fn large(mut self) -> Self {
        self.is_large = true;
        self
    }

    /// Find a node by path in this subtree (virtual nodes included)
    pub fn find(&self, path: &str) -> Option<&CatalogNode> {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.path == path {
                return Some(node);
            }
            stack.extend(node.children.iter());
        }
        None
    }

    /// Sum of `size_bytes` over the whole subtree
    pub fn total_size(&self) -> u64 {
        let mut total = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            total += node.size_bytes;
            stack.extend(node.children.iter());
        }
        total
    }

    /// True if any node in the subtree stopped exploration because it was large
    pub fn is_incomplete(&self) -> bool {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.is_large {
                return true;
            }
            stack.extend(node.children.iter());
        }
        false
    }

    /// Sort children by path at every level
    pub fn sort_children(&mut self) {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            node.children.sort_by(|a, b| a.path.cmp(&b.path));
            stack.extend(node.children.iter_mut());
        }
    }
}

/// Number of non-virtual nodes in a subtree
pub fn count_nodes(node: &CatalogNode) -> u64 {
    let mut count = 0;
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if !current.is_virtual {
            count += 1;
        }
        stack.extend(current.children.iter());
    }
    count
}

/// Path -> node index over the non-virtual nodes of a tree, built breadth-first.
///
/// If a path occurs more than once the shallowest node wins.
pub fn build_lookup(root: &CatalogNode) -> HashMap<&str, &CatalogNode> {
    let mut lookup = HashMap::new();
    let mut queue = VecDeque::from([root]);
    while let Some(current) = queue.pop_front() {
        if !current.is_virtual {
            lookup.entry(current.path.as_str()).or_insert(current);
        }
        queue.extend(current.children.iter());
    }
    lookup
}

/// Overwrite `depth`, `cumulative_cost` and `is_root` top-down.
///
/// Grafted subtrees carry values computed against their original root; this
/// re-anchors every node on its current parent.
pub fn recalculate(root: &mut CatalogNode) {
    root.depth = 0;
    root.cumulative_cost = root.size_bytes;
    root.is_root = true;

    let mut stack = vec![root];
    while let Some(parent) = stack.pop() {
        let depth = parent.depth + 1;
        let cost = parent.cumulative_cost;
        for child in parent.children.iter_mut() {
            child.depth = depth;
            child.cumulative_cost = cost + child.size_bytes;
            child.is_root = false;
            stack.push(child);
        }
    }
}
