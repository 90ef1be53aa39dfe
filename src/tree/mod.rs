//! Catalog cost tree
//!
//! - [`node`]: the owned result tree and its pure operations
//! - [`path`]: path segment helpers
//! - [`arena`]: the mutable tree used while a crawl is running

pub mod arena;
pub mod node;
pub mod path;

pub use arena::{NewNode, NodeId, TreeArena};
pub use node::{build_lookup, count_nodes, recalculate, CatalogNode};
