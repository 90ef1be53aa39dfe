//! Parallel catalog crawl
//!
//! This module contains the core crawling logic:
//! - `builder`: Sets up the crawl, handles the root and finalises the tree
//! - `worker`: Per-reference policy executed by worker threads
//! - `queue`: FIFO of work units shared by the workers
//! - `state`: Lock-guarded tree, counters and completion tracking
//! - `reuse`: Grafting of unchanged subtrees from a previous run
//! - `stats`: Counters and progress snapshots

pub mod builder;
pub mod queue;
pub mod reuse;
pub mod state;
pub mod stats;
pub mod worker;

pub use builder::CatalogTreeBuilder;
pub use stats::{CrawlProgress, CrawlStats, ProgressFn};
