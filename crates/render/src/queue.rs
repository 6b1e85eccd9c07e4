//! The ordered node queue and the arena of reserved branches spliced into it.

use std::cell::RefCell;
use std::rc::Rc;

use html::{COMMON_HTML_PATTERNS, HtmlString, HtmlStringCache, mark_html};

use crate::builder::Scope;
use crate::config::HtmlCacheConfig;
use crate::error::{RenderError, RenderResult};
use crate::node::{BranchId, NodeKind, QueueNode, Segment};
use crate::pool::SharedPool;
use crate::result::ResultHandle;

/// Cache handle shared by the renders of one thread.
pub type SharedHtmlCache = Rc<RefCell<HtmlStringCache>>;

/// A cache for `config`, pre-populated with common markup when asked to,
/// or `None` when caching is disabled.
pub fn shared_html_cache(config: &HtmlCacheConfig) -> Option<SharedHtmlCache> {
    if config.capacity == 0 {
        return None;
    }
    let mut cache = HtmlStringCache::with_capacity(config.capacity);
    if config.warm {
        cache.warm(COMMON_HTML_PATTERNS.iter().copied());
    }
    Some(Rc::new(RefCell::new(cache)))
}

/// Root queue of one render plus the per-request handles its nodes are
/// produced and recycled with.
pub struct RenderQueue {
    pub(crate) nodes: Segment,
    result: ResultHandle,
    pool: Option<SharedPool>,
    html_cache: Option<SharedHtmlCache>,
}

impl RenderQueue {
    pub fn new(
        result: ResultHandle,
        pool: Option<SharedPool>,
        html_cache: Option<SharedHtmlCache>,
    ) -> Self {
        Self {
            nodes: Segment::new(),
            result,
            pool,
            html_cache,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &QueueNode> {
        self.nodes.iter()
    }

    pub fn result(&self) -> &ResultHandle {
        &self.result
    }

    pub fn pool(&self) -> Option<&SharedPool> {
        self.pool.as_ref()
    }

    pub fn html_cache(&self) -> Option<&SharedHtmlCache> {
        self.html_cache.as_ref()
    }

    pub(crate) fn acquire(&self, kind: NodeKind) -> QueueNode {
        match &self.pool {
            Some(pool) => pool.borrow_mut().acquire(kind),
            None => QueueNode::blank(kind),
        }
    }

    pub(crate) fn release(&self, node: QueueNode) {
        if let Some(pool) = &self.pool {
            pool.borrow_mut().release(node);
        }
    }

    pub(crate) fn release_all(&self, nodes: impl IntoIterator<Item = QueueNode>) {
        match &self.pool {
            Some(pool) => pool.borrow_mut().release_all(nodes),
            None => nodes.into_iter().for_each(drop),
        }
    }

    /// Static markup as a safe string, shared through the cache when there is
    /// one.
    pub(crate) fn wrap_html(&self, raw: &str) -> HtmlString {
        match &self.html_cache {
            Some(cache) => cache.borrow_mut().wrap(raw),
            None => mark_html(raw),
        }
    }
}

impl std::fmt::Debug for RenderQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderQueue")
            .field("nodes", &self.nodes.len())
            .field("pooled", &self.pool.is_some())
            .field("cached", &self.html_cache.is_some())
            .finish()
    }
}

/// What the stream needs to report a failed branch and build its output.
pub(crate) struct PendingBranch {
    pub display_name: String,
    pub module_id: Option<String>,
    pub scope: Option<Rc<Scope>>,
}

enum BranchSlot {
    Pending(PendingBranch),
    Ready(Segment),
    // Raised when the walk reaches the branch, never earlier.
    Failed(RenderError),
    Taken,
}

pub(crate) enum BranchState {
    Pending,
    Ready,
    Failed,
}

/// Reserved output positions, indexed by [`BranchId`].
#[derive(Default)]
pub(crate) struct BranchArena {
    slots: Vec<BranchSlot>,
    pending: usize,
}

impl BranchArena {
    pub fn reserve(&mut self, branch: PendingBranch) -> BranchId {
        let id = BranchId(self.slots.len() as u32);
        self.slots.push(BranchSlot::Pending(branch));
        self.pending += 1;
        id
    }

    /// Claim a pending branch whose computation just settled.
    pub fn settle(&mut self, id: BranchId) -> RenderResult<PendingBranch> {
        let slot = self
            .slots
            .get_mut(id.0 as usize)
            .ok_or(RenderError::InvalidBranch(id.0))?;
        match std::mem::replace(slot, BranchSlot::Taken) {
            BranchSlot::Pending(branch) => {
                self.pending -= 1;
                Ok(branch)
            }
            other => {
                *slot = other;
                Err(RenderError::InvalidBranch(id.0))
            }
        }
    }

    pub fn fill(&mut self, id: BranchId, segment: Segment) -> RenderResult<()> {
        match self.slots.get_mut(id.0 as usize) {
            Some(slot) if matches!(slot, BranchSlot::Taken) => {
                *slot = BranchSlot::Ready(segment);
                Ok(())
            }
            _ => Err(RenderError::InvalidBranch(id.0)),
        }
    }

    /// Park the failure of a settled branch until the walk reaches it.
    pub fn fail(&mut self, id: BranchId, err: RenderError) -> RenderResult<()> {
        match self.slots.get_mut(id.0 as usize) {
            Some(slot) if matches!(slot, BranchSlot::Taken) => {
                *slot = BranchSlot::Failed(err);
                Ok(())
            }
            _ => Err(RenderError::InvalidBranch(id.0)),
        }
    }

    pub fn state(&self, id: BranchId) -> RenderResult<BranchState> {
        match self.slots.get(id.0 as usize) {
            Some(BranchSlot::Pending(_)) => Ok(BranchState::Pending),
            Some(BranchSlot::Ready(_)) => Ok(BranchState::Ready),
            Some(BranchSlot::Failed(_)) => Ok(BranchState::Failed),
            _ => Err(RenderError::InvalidBranch(id.0)),
        }
    }

    /// Take the output of a settled branch. A failed branch yields its
    /// parked error instead.
    pub fn take_ready(&mut self, id: BranchId) -> RenderResult<Segment> {
        let slot = self
            .slots
            .get_mut(id.0 as usize)
            .ok_or(RenderError::InvalidBranch(id.0))?;
        match std::mem::replace(slot, BranchSlot::Taken) {
            BranchSlot::Ready(segment) => Ok(segment),
            BranchSlot::Failed(err) => Err(err),
            other => {
                *slot = other;
                Err(RenderError::InvalidBranch(id.0))
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn reserved(&self) -> usize {
        self.slots.len()
    }

    /// Drop every slot, handing back the nodes of settled but unconsumed
    /// branches.
    pub fn drain_ready(&mut self) -> impl Iterator<Item = QueueNode> + '_ {
        self.pending = 0;
        self.slots.drain(..).flat_map(|slot| match slot {
            BranchSlot::Ready(segment) => segment,
            BranchSlot::Pending(_) | BranchSlot::Failed(_) | BranchSlot::Taken => Segment::new(),
        })
    }
}
