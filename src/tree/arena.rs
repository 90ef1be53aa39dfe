//! Mutable tree used while a crawl is running
//!
//! Nodes live in a flat arena and refer to their children by [`NodeId`], so
//! workers can hold on to a parent while other workers extend the tree. The
//! arena is never shared without the crawl lock; it has no synchronisation of
//! its own.
//!
//! Insertion resolves intermediate paths: attaching `/a/b/c` below the root
//! when neither `/a` nor `/a/b` has a catalog creates virtual nodes for both,
//! and later insertions below `/a/b` reuse them.

use crate::tree::node::CatalogNode;
use crate::tree::path::{segments, ROOT_PATH};

/// Index of a node in a [`TreeArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Default)]
struct ArenaNode {
    path: String,
    content_hash: String,
    size_bytes: u64,
    cumulative_cost: u64,
    depth: u32,
    is_large: bool,
    is_virtual: bool,
    children: Vec<NodeId>,
}

/// A real (catalog-backed) node about to be attached
#[derive(Debug, Clone)]
pub struct NewNode {
    pub path: String,
    pub content_hash: String,
    pub size_bytes: u64,
    pub is_large: bool,
}

/// Arena-backed catalog tree
#[derive(Debug, Clone)]
pub struct TreeArena {
    nodes: Vec<ArenaNode>,
}

impl TreeArena {
    /// Create an arena holding only the root node
    pub fn with_root(content_hash: impl Into<String>, size_bytes: u64, is_large: bool) -> Self {
        Self {
            nodes: vec![ArenaNode {
                path: ROOT_PATH.to_string(),
                content_hash: content_hash.into(),
                size_bytes,
                cumulative_cost: size_bytes,
                depth: 0,
                is_large,
                is_virtual: false,
                children: Vec::new(),
            }],
        }
    }

    /// Id of the root node
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Total number of nodes, virtual ones included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn path(&self, id: NodeId) -> &str {
        &self.nodes[id.0].path
    }

    pub fn depth(&self, id: NodeId) -> u32 {
        self.nodes[id.0].depth
    }

    pub fn size_bytes(&self, id: NodeId) -> u64 {
        self.nodes[id.0].size_bytes
    }

    pub fn cumulative_cost(&self, id: NodeId) -> u64 {
        self.nodes[id.0].cumulative_cost
    }

    pub fn is_large(&self, id: NodeId) -> bool {
        self.nodes[id.0].is_large
    }

    pub fn is_virtual(&self, id: NodeId) -> bool {
        self.nodes[id.0].is_virtual
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Existing child of `id` at `segment`, or one whose subtree contains it
    fn matching_child(&self, id: NodeId, segment: &str) -> Option<NodeId> {
        self.nodes[id.0].children.iter().copied().find(|child| {
            let child_path = self.nodes[child.0].path.as_str();
            child_path == segment
                || (segment.starts_with(child_path)
                    && segment[child_path.len()..].starts_with('/'))
        })
    }

    fn push_child(&mut self, parent: NodeId, node: ArenaNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Walk (and create where missing) the virtual chain towards `path`.
    ///
    /// Returns the node the final segment must be attached to.
    fn resolve_parent(&mut self, parent: NodeId, path: &str) -> NodeId {
        let parent_path = self.nodes[parent.0].path.clone();
        let segments = segments(&parent_path, path);
        let intermediates = segments.split_last().map_or(&[][..], |(_, rest)| rest);

        let mut current = parent;
        for segment in intermediates {
            current = match self.matching_child(current, segment) {
                Some(existing) => existing,
                None => {
                    let at = &self.nodes[current.0];
                    let virtual_node = ArenaNode {
                        path: segment.clone(),
                        content_hash: String::new(),
                        size_bytes: 0,
                        cumulative_cost: at.cumulative_cost,
                        depth: at.depth + 1,
                        is_large: false,
                        is_virtual: true,
                        children: Vec::new(),
                    };
                    self.push_child(current, virtual_node)
                }
            };
        }
        current
    }

    /// Depth a node at `path` would get if inserted below `parent` now.
    ///
    /// Does not modify the tree.
    pub fn planned_depth(&self, parent: NodeId, path: &str) -> u32 {
        let segments = segments(&self.nodes[parent.0].path, path);
        let intermediates = segments.split_last().map_or(&[][..], |(_, rest)| rest);

        let mut current = parent;
        for (i, segment) in intermediates.iter().enumerate() {
            match self.matching_child(current, segment) {
                Some(existing) => current = existing,
                None => {
                    // Everything from here on would be freshly created.
                    return self.nodes[current.0].depth + (segments.len() - i) as u32;
                }
            }
        }
        self.nodes[current.0].depth + 1
    }

    /// Attach a real node at `node.path`, creating virtual ancestors as needed
    pub fn insert(&mut self, parent: NodeId, node: NewNode) -> NodeId {
        let attach_to = self.resolve_parent(parent, &node.path);
        let at = &self.nodes[attach_to.0];
        let arena_node = ArenaNode {
            cumulative_cost: at.cumulative_cost + node.size_bytes,
            depth: at.depth + 1,
            path: node.path,
            content_hash: node.content_hash,
            size_bytes: node.size_bytes,
            is_large: node.is_large,
            is_virtual: false,
            children: Vec::new(),
        };
        self.push_child(attach_to, arena_node)
    }

    /// Splice a previously built subtree in at `subtree.path`.
    ///
    /// The subtree is copied as-is, stale depth and cost included; the final
    /// top-down recalculation re-anchors it.
    pub fn graft(&mut self, parent: NodeId, subtree: &CatalogNode) -> NodeId {
        let attach_to = self.resolve_parent(parent, &subtree.path);

        let mut grafted_root = None;
        let mut stack = vec![(attach_to, subtree)];
        while let Some((target, node)) = stack.pop() {
            let id = self.push_child(
                target,
                ArenaNode {
                    path: node.path.clone(),
                    content_hash: node.content_hash.clone(),
                    size_bytes: node.size_bytes,
                    cumulative_cost: node.cumulative_cost,
                    depth: node.depth,
                    is_large: node.is_large,
                    is_virtual: node.is_virtual,
                    children: Vec::with_capacity(node.children.len()),
                },
            );
            grafted_root.get_or_insert(id);
            // Reverse keeps sibling order after the stack pops them.
            stack.extend(node.children.iter().rev().map(|child| (id, child)));
        }

        grafted_root.unwrap_or(attach_to)
    }

    /// Replace a node's size with the measured one, adjusting its own cost.
    ///
    /// Returns true if the node became large as a result.
    pub fn correct_size(&mut self, id: NodeId, actual: u64, stop_threshold: u64) -> bool {
        let node = &mut self.nodes[id.0];
        let was_large = node.is_large;
        node.cumulative_cost = node.cumulative_cost - node.size_bytes + actual;
        node.size_bytes = actual;
        node.is_large = actual > stop_threshold;
        node.is_large && !was_large
    }

    /// Convert into an owned tree with children sorted by path
    pub fn into_tree(self) -> CatalogNode {
        let mut slots: Vec<Option<ArenaNode>> = self.nodes.into_iter().map(Some).collect();
        let mut root = build_owned(&mut slots, NodeId(0));
        root.is_root = true;
        root.sort_children();
        root
    }
}

fn build_owned(slots: &mut [Option<ArenaNode>], id: NodeId) -> CatalogNode {
    let node = slots[id.0].take().unwrap_or_default();
    let children = node
        .children
        .iter()
        .map(|child| build_owned(slots, *child))
        .collect();

    CatalogNode {
        path: node.path,
        content_hash: node.content_hash,
        size_bytes: node.size_bytes,
        is_large: node.is_large,
        is_virtual: node.is_virtual,
        children,
        cumulative_cost: node.cumulative_cost,
        depth: node.depth,
        is_root: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::node::count_nodes;

    fn real(path: &str, size: u64) -> NewNode {
        NewNode {
            path: path.to_string(),
            content_hash: format!("h{}", path),
            size_bytes: size,
            is_large: false,
        }
    }

    #[test]
    fn test_insert_creates_virtual_chain() {
        let mut arena = TreeArena::with_root("root", 10, false);
        let root = arena.root();
        let id = arena.insert(root, real("/a/b", 5));

        assert_eq!(arena.depth(id), 2);
        assert_eq!(arena.cumulative_cost(id), 15);

        let a = arena.children(root)[0];
        assert!(arena.is_virtual(a));
        assert_eq!(arena.path(a), "/a");
        assert_eq!(arena.cumulative_cost(a), 10);

        let tree = arena.into_tree();
        assert_eq!(count_nodes(&tree), 2);
    }

    #[test]
    fn test_shared_intermediate_created_once() {
        let mut arena = TreeArena::with_root("root", 0, false);
        let root = arena.root();
        arena.insert(root, real("/a/b/c1", 1));
        arena.insert(root, real("/a/b/c2", 1));

        assert_eq!(arena.len(), 5);
        assert_eq!(arena.children(root).len(), 1);
        let a = arena.children(root)[0];
        assert_eq!(arena.children(a).len(), 1);
        let b = arena.children(a)[0];
        assert_eq!(arena.path(b), "/a/b");
        assert_eq!(arena.children(b).len(), 2);
    }

    #[test]
    fn test_descends_through_real_ancestor() {
        let mut arena = TreeArena::with_root("root", 0, false);
        let root = arena.root();
        let a = arena.insert(root, real("/a", 3));
        // A late reference listed by the root that lies inside /a.
        let deep = arena.insert(root, real("/a/b/c", 1));

        assert_eq!(arena.children(root).len(), 1);
        assert_eq!(arena.children(a).len(), 1);
        assert_eq!(arena.depth(deep), 3);
        assert_eq!(arena.cumulative_cost(deep), 4);
    }

    #[test]
    fn test_planned_depth() {
        let mut arena = TreeArena::with_root("root", 0, false);
        let root = arena.root();
        assert_eq!(arena.planned_depth(root, "/x"), 1);
        assert_eq!(arena.planned_depth(root, "/a/b/c"), 3);

        arena.insert(root, real("/a/b/c1", 1));
        assert_eq!(arena.planned_depth(root, "/a/b/c2"), 3);
        assert_eq!(arena.len(), 4);
    }

    #[test]
    fn test_trailing_slash_child_does_not_underflow() {
        let mut arena = TreeArena::with_root("root", 0, false);
        let root = arena.root();
        let a = arena.insert(root, real("/a", 1));

        assert_eq!(arena.planned_depth(a, "/a/"), 2);
        let odd = arena.insert(a, real("/a/", 1));
        assert_eq!(arena.depth(odd), 2);
        assert_eq!(arena.children(a), &[odd]);
    }

    #[test]
    fn test_graft_copies_whole_subtree() {
        let previous = CatalogNode::leaf("/a/b", "ab", 4)
            .with_child(CatalogNode::leaf("/a/b/c", "abc", 2))
            .with_child(CatalogNode::leaf("/a/b/d", "abd", 1).large());

        let mut arena = TreeArena::with_root("root", 1, false);
        let root = arena.root();
        let grafted = arena.graft(root, &previous);

        assert_eq!(arena.path(grafted), "/a/b");
        assert_eq!(arena.children(grafted).len(), 2);

        let tree = arena.into_tree();
        assert_eq!(count_nodes(&tree), 4);
        let a = tree.find("/a").unwrap();
        assert!(a.is_virtual);
        assert!(tree.find("/a/b/d").unwrap().is_large);
    }

    #[test]
    fn test_correct_size() {
        let mut arena = TreeArena::with_root("root", 10, false);
        let root = arena.root();
        let id = arena.insert(root, real("/x", 0));
        assert_eq!(arena.cumulative_cost(id), 10);

        let became_large = arena.correct_size(id, 50, 20);
        assert!(became_large);
        assert_eq!(arena.size_bytes(id), 50);
        assert_eq!(arena.cumulative_cost(id), 60);
        assert!(arena.is_large(id));
    }

    #[test]
    fn test_into_tree_sorts_children() {
        let mut arena = TreeArena::with_root("root", 0, false);
        let root = arena.root();
        arena.insert(root, real("/z", 1));
        arena.insert(root, real("/b", 1));
        arena.insert(root, real("/m", 1));

        let tree = arena.into_tree();
        let paths: Vec<_> = tree.children.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["/b", "/m", "/z"]);
        assert!(tree.is_root);
    }
}
