//! Work queue for catalog references
//!
//! A unit of work is a parent node plus the references already listed from
//! that parent's catalog. The catalog itself is closed before its unit is
//! queued, so the queue never holds repository handles.
//!
//! The queue is an unbounded FIFO: its total size is unknown upfront and
//! workers must never block on enqueue. Completion is not derived from queue
//! length but from the in-flight counter kept with the crawl state.

use crate::repo::CatalogReference;
use crate::tree::NodeId;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// References listed from one catalog, waiting to be processed
#[derive(Debug, Clone)]
pub struct WorkUnit {
    /// Node of the catalog the references were listed from
    pub parent: NodeId,

    /// Nested catalog references
    pub references: Vec<CatalogReference>,
}

impl WorkUnit {
    pub fn new(parent: NodeId, references: Vec<CatalogReference>) -> Self {
        Self { parent, references }
    }
}

/// Statistics for the work queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total units enqueued
    pub enqueued: AtomicU64,

    /// Total units dequeued
    pub dequeued: AtomicU64,
}

impl QueueStats {
    /// Get queue throughput (dequeued units)
    pub fn throughput(&self) -> u64 {
        self.dequeued.load(Ordering::Relaxed)
    }
}

/// Shared FIFO of work units
pub struct WorkQueue {
    sender: Sender<WorkUnit>,
    receiver: Receiver<WorkUnit>,
    stats: Arc<QueueStats>,
}

impl WorkQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            stats: Arc::new(QueueStats::default()),
        }
    }

    /// Get a sender for this queue (clone for each worker)
    pub fn sender(&self) -> WorkQueueSender {
        WorkQueueSender {
            sender: self.sender.clone(),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Get a receiver for this queue (clone for each worker)
    pub fn receiver(&self) -> WorkQueueReceiver {
        WorkQueueReceiver {
            receiver: self.receiver.clone(),
            stats: Arc::clone(&self.stats),
        }
    }

    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for sending units to the queue
#[derive(Clone)]
pub struct WorkQueueSender {
    sender: Sender<WorkUnit>,
    stats: Arc<QueueStats>,
}

impl WorkQueueSender {
    /// Send a unit; fails only if every receiver is gone
    pub fn send(&self, unit: WorkUnit) -> Result<(), WorkUnit> {
        self.sender.send(unit).map_err(|e| e.into_inner())?;
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Handle for receiving units from the queue
#[derive(Clone)]
pub struct WorkQueueReceiver {
    receiver: Receiver<WorkUnit>,
    stats: Arc<QueueStats>,
}

impl WorkQueueReceiver {
    /// Try to receive a unit without blocking
    pub fn try_recv(&self) -> Option<WorkUnit> {
        match self.receiver.try_recv() {
            Ok(unit) => {
                self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                Some(unit)
            }
            Err(_) => None,
        }
    }

    /// Receive with timeout, so callers can re-check for completion
    pub fn recv_timeout(&self, timeout: Duration) -> Option<WorkUnit> {
        match self.receiver.recv_timeout(timeout) {
            Ok(unit) => {
                self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                Some(unit)
            }
            Err(_) => None,
        }
    }
}
