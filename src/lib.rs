//! catalog-walker - Nested Catalog Cost Mapper
//!
//! Crawls a tree of content-addressed catalogs and records, for every mount
//! path, how many bytes a client must download to reach it. The result is a
//! tree annotated with per-node size, cumulative cost and depth.
//!
//! # Features
//!
//! - **Parallel Crawling**: Worker threads fetch catalogs concurrently; only
//!   tree updates are serialised.
//!
//! - **Bounded Exploration**: Catalogs above a size threshold are recorded but
//!   not explored. Depth limits, download budgets and ignore prefixes bound the
//!   crawl further.
//!
//! - **Incremental Runs**: A tree saved from an earlier run is reused for every
//!   branch whose catalog hash is unchanged, and entirely when the root is.
//!
//! - **Virtual Directories**: Intermediate path components without a catalog
//!   of their own get placeholder nodes, so the tree mirrors the namespace.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Catalog Repository                          │
//! │             (CatalogSource: fetch / probe / list)               │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               │ retrieve, list_nested, close
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Worker Threads                             │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐      │
//! │  │Worker 1 │  │Worker 2 │  │Worker 3 │  ...    │Worker N │      │
//! │  └────┬────┘  └────┬────┘  └────┬────┘         └────┬────┘      │
//! │       │            │            │                   │           │
//! │       └────────────┼────────────┼───────────────────┘           │
//! │                    ▼            ▼                               │
//! │            ┌──────────────────────────┐                         │
//! │            │     Work Queue           │                         │
//! │            │  (crossbeam unbounded)   │                         │
//! │            │  - parent + references   │                         │
//! │            └──────────────────────────┘                         │
//! │                         │                                       │
//! │                         ▼                                       │
//! │            ┌──────────────────────────┐                         │
//! │            │  Crawl State (one lock)  │                         │
//! │            │  - tree arena            │                         │
//! │            │  - counters, in-flight   │                         │
//! │            └──────────────────────────┘                         │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//!                    ┌──────────────────┐
//!                    │   CatalogNode    │
//!                    │  (.json / .zst)  │
//!                    └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Basic crawl of a repository description
//! catalog-walker repo.json
//!
//! # Incremental run: reuse unchanged branches, then save for next time
//! catalog-walker repo.json --previous-tree tree.json.zst --save-tree tree.json.zst
//!
//! # Print the tree as JSON
//! catalog-walker repo.json -s 5MB -d 4 --json -o tree.json
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod progress;
pub mod repo;
pub mod snapshot;
pub mod tree;

pub use config::{CliArgs, CrawlConfig};
pub use crawler::{CatalogTreeBuilder, CrawlProgress, CrawlStats};
pub use error::{CrawlError, Result};
pub use repo::{Catalog, CatalogReference, CatalogSource, MemoryRepository};
pub use snapshot::TreeSnapshot;
pub use tree::CatalogNode;
