//! Recycling of queue nodes across a render (or many renders).
//!
//! Ownership is the release discipline: `acquire` hands out an owned node and
//! `release` consumes it, so a released node cannot still be read through the
//! queue that held it.

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::PoolConfig;
use crate::node::{NodeKind, QueueNode};

// Text buffers grown past this are dropped instead of being kept for reuse.
const MAX_RETAINED_TEXT_CAPACITY: usize = 64 * 1024;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub acquire_from_pool: u64,
    pub acquire_new: u64,
    pub released: u64,
    /// Releases discarded because the free lists were full.
    pub released_dropped: u64,
}

impl PoolStats {
    /// Fraction of acquisitions served from the free lists.
    pub fn hit_rate(&self) -> f64 {
        let total = self.acquire_from_pool + self.acquire_new;
        if total == 0 {
            return 0.0;
        }
        self.acquire_from_pool as f64 / total as f64
    }
}

#[derive(Debug)]
pub struct NodePool {
    free: [Vec<QueueNode>; 4],
    max_size: usize,
    track_stats: bool,
    stats: PoolStats,
    outstanding: usize,
}

/// Pool handle shared by the renders of one thread.
pub type SharedPool = Rc<RefCell<NodePool>>;

impl NodePool {
    /// `max_size` caps the nodes kept for reuse; beyond it releases are
    /// dropped and acquisitions fall back to fresh allocation.
    pub fn new(max_size: usize) -> Self {
        Self {
            free: Default::default(),
            max_size,
            track_stats: false,
            stats: PoolStats::default(),
            outstanding: 0,
        }
    }

    pub fn from_config(config: &PoolConfig) -> Self {
        let mut pool = Self::new(config.max_size);
        pool.track_stats = config.track_stats;
        pool
    }

    pub fn with_stats(mut self) -> Self {
        self.track_stats = true;
        self
    }

    pub fn into_shared(self) -> SharedPool {
        Rc::new(RefCell::new(self))
    }

    /// Hand out a node of `kind` with inert contents.
    pub fn acquire(&mut self, kind: NodeKind) -> QueueNode {
        self.outstanding += 1;
        match self.free[kind.index()].pop() {
            Some(node) => {
                if self.track_stats {
                    self.stats.acquire_from_pool += 1;
                }
                node
            }
            None => {
                if self.track_stats {
                    self.stats.acquire_new += 1;
                }
                QueueNode::blank(kind)
            }
        }
    }

    /// Take back a node whose last reader is done with it.
    pub fn release(&mut self, mut node: QueueNode) {
        self.outstanding = self.outstanding.saturating_sub(1);
        if self.available() >= self.max_size {
            log::trace!(
                target: "render.pool",
                "free lists full at {}, dropping a {:?} node",
                self.max_size,
                node.kind()
            );
            if self.track_stats {
                self.stats.released_dropped += 1;
            }
            return;
        }
        if let QueueNode::Text(text) = &mut node {
            if text.content.capacity() > MAX_RETAINED_TEXT_CAPACITY {
                text.content = String::new();
            }
        }
        node.reset();
        let index = node.kind().index();
        self.free[index].push(node);
        if self.track_stats {
            self.stats.released += 1;
        }
    }

    pub fn release_all(&mut self, nodes: impl IntoIterator<Item = QueueNode>) {
        for node in nodes {
            self.release(node);
        }
    }

    /// Nodes acquired and not yet released.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Nodes sitting in the free lists.
    pub fn available(&self) -> usize {
        self.free.iter().map(Vec::len).sum()
    }

    pub fn available_of(&self, kind: NodeKind) -> usize {
        self.free[kind.index()].len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Discard every pooled node.
    pub fn clear(&mut self) {
        log::debug!(target: "render.pool", "discarding {} pooled nodes", self.available());
        for list in &mut self.free {
            list.clear();
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = PoolStats::default();
    }
}

/// A pool for `config`, or `None` when pooling is disabled.
pub fn shared_pool(config: &PoolConfig) -> Option<SharedPool> {
    if config.max_size == 0 {
        log::debug!(target: "render.pool", "node pooling disabled");
        return None;
    }
    Some(NodePool::from_config(config).into_shared())
}

impl Default for NodePool {
    fn default() -> Self {
        Self::from_config(&PoolConfig::default())
    }
}
