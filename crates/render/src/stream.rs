//! Pull-based, cancellable byte stream over a render queue.
//!
//! Each poll walks the queue in order: text is escaped, markup is copied,
//! instructions are resolved against the result context and components
//! either continue inline or splice in their reserved branch. The walk only
//! waits at a branch whose computation has not settled yet; before waiting it
//! flushes whatever is already encoded.

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll, Waker};

use bytes::{Bytes, BytesMut};
use futures::io::{AsyncWrite, AsyncWriteExt};
use futures::stream::{Stream, StreamExt};
use futures::task::AtomicWaker;
use html::escape_html;
use tools::utf8::Utf8Decoder;

use crate::builder::{InFlight, QueueBuilder};
use crate::config::RenderConfig;
use crate::error::{RenderError, RenderResult};
use crate::node::{Branch, BranchId, QueueNode, Segment};
use crate::pool::{SharedPool, shared_pool};
use crate::queue::{BranchArena, BranchState, RenderQueue, SharedHtmlCache, shared_html_cache};
use crate::renderable::Renderable;
use crate::result::{IslandRecord, RequestMeta, ResultContext, ResultHandle};

/// Thread-safe stop signal for a [`RenderStream`]. Cancelling wakes a stream
/// parked on a pending branch.
#[derive(Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelState>,
}

#[derive(Default)]
struct CancelState {
    cancelled: AtomicBool,
    reason: OnceLock<String>,
    waker: AtomicWaker,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the render. The first reason given is kept.
    pub fn cancel(&self, reason: impl Into<String>) {
        let _ = self.inner.reason.set(reason.into());
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.waker.wake();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    pub fn reason(&self) -> Option<&str> {
        self.inner.reason.get().map(String::as_str)
    }

    fn register(&self, waker: &Waker) {
        self.inner.waker.register(waker);
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub chunks: u64,
    pub nodes: u64,
    /// Branches reserved for pending output over the whole render.
    pub branches: u64,
    /// Polls that found nothing to emit and had to wait.
    pub waits: u64,
}

enum Phase {
    Streaming,
    // Buffered bytes go out first, then the error, then the end.
    Failing(Option<RenderError>),
    Finished,
}

enum Step {
    Chunk,
    Wait,
    End,
}

pub struct RenderStream {
    queue: RenderQueue,
    // Settled branches being emitted, innermost last; the root queue sits
    // below them.
    splices: Vec<Segment>,
    branches: BranchArena,
    in_flight: InFlight,
    config: RenderConfig,
    cancel: CancelHandle,
    buf: BytesMut,
    phase: Phase,
    bytes_emitted: u64,
    stats: StreamStats,
}

impl RenderStream {
    /// Start rendering `root` with a pool and cache private to this request.
    ///
    /// Synchronous parts of the tree are flattened right away, so a failing
    /// component there is reported here, before any byte is produced.
    pub fn new(
        root: impl Into<Renderable>,
        result: ResultHandle,
        config: RenderConfig,
    ) -> RenderResult<Self> {
        let pool = shared_pool(&config.pool);
        let html_cache = shared_html_cache(&config.html_cache);
        Self::with_shared(root, result, config, pool, html_cache)
    }

    /// Start rendering with a pool and cache that outlive this request.
    pub fn with_shared(
        root: impl Into<Renderable>,
        result: ResultHandle,
        config: RenderConfig,
        pool: Option<SharedPool>,
        html_cache: Option<SharedHtmlCache>,
    ) -> RenderResult<Self> {
        let mut stream = Self {
            queue: RenderQueue::new(result, pool, html_cache),
            splices: Vec::new(),
            branches: BranchArena::default(),
            in_flight: InFlight::new(),
            buf: BytesMut::with_capacity(config.chunk_size.max(64)),
            config,
            cancel: CancelHandle::new(),
            phase: Phase::Streaming,
            bytes_emitted: 0,
            stats: StreamStats::default(),
        };
        let root = QueueBuilder::new(&stream.queue, &mut stream.branches, &mut stream.in_flight)
            .build(root.into(), None)
            .inspect_err(|err| log::warn!(target: "render.stream", "render failed to start: {err}"))?;
        stream.queue.nodes = root;
        stream.stats.branches = stream.branches.reserved() as u64;
        log::debug!(
            target: "render.stream",
            "render started: {} queued nodes, {} pending branches",
            stream.queue.len(),
            stream.branches.pending()
        );
        Ok(stream)
    }

    /// Render a server island recorded by an earlier render as a partial
    /// response of its own.
    pub fn island(
        record: IslandRecord,
        request: RequestMeta,
        config: RenderConfig,
    ) -> RenderResult<Self> {
        let pool = shared_pool(&config.pool);
        let html_cache = shared_html_cache(&config.html_cache);
        Self::island_with_shared(record, request, config, pool, html_cache)
    }

    /// [`RenderStream::island`] with a pool and cache that outlive the
    /// request.
    pub fn island_with_shared(
        record: IslandRecord,
        request: RequestMeta,
        config: RenderConfig,
        pool: Option<SharedPool>,
        html_cache: Option<SharedHtmlCache>,
    ) -> RenderResult<Self> {
        log::debug!(target: "render.stream", "rendering server island {}", record.id);
        let result = ResultContext::new(RequestMeta {
            partial: true,
            ..request
        })
        .into_handle();
        Self::with_shared(
            Renderable::Component(record.instance),
            result,
            config,
            pool,
            html_cache,
        )
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self, reason: impl Into<String>) {
        self.cancel.cancel(reason);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Bytes handed out so far. Once this is non-zero a failure can no
    /// longer become a clean error response.
    pub fn bytes_emitted(&self) -> u64 {
        self.bytes_emitted
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    pub fn result(&self) -> &ResultHandle {
        self.queue.result()
    }

    pub fn pending_branches(&self) -> usize {
        self.branches.pending()
    }

    /// Copy the whole render into `writer`, returning the bytes written.
    pub async fn write_to<W>(mut self, writer: &mut W) -> RenderResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        while let Some(chunk) = self.next().await {
            writer.write_all(&chunk?).await?;
        }
        writer.flush().await?;
        Ok(self.bytes_emitted)
    }

    fn advance(&mut self, cx: &mut Context<'_>) -> RenderResult<Step> {
        self.settle(cx)?;
        loop {
            if !self.buf.is_empty() && self.buf.len() >= self.config.chunk_size {
                return Ok(Step::Chunk);
            }
            let Some(node) = self.next_node() else {
                return Ok(Step::End);
            };
            let reserved = match &node {
                QueueNode::Component(component) => match component.branch {
                    Branch::Reserved(id) => Some(id),
                    Branch::Inline => None,
                },
                _ => None,
            };
            match reserved {
                Some(id) => {
                    if !self.enter_branch(node, id, cx)? {
                        return Ok(Step::Wait);
                    }
                }
                None => self.encode(node),
            }
        }
    }

    /// Splice in the branch behind `node` if it has settled; otherwise put
    /// the node back and report that the walk has to wait.
    fn enter_branch(
        &mut self,
        node: QueueNode,
        id: BranchId,
        cx: &mut Context<'_>,
    ) -> RenderResult<bool> {
        let state = match self.branches.state(id) {
            Ok(state) => state,
            Err(err) => {
                log::warn!(target: "render.stream", "queue references unknown branch {id}");
                self.queue.release(node);
                return Err(err);
            }
        };
        if matches!(state, BranchState::Pending) {
            self.put_back(node);
            self.settle(cx)?;
            return match self.branches.state(id)? {
                // The node is back in place; the next step takes the branch.
                BranchState::Ready | BranchState::Failed => Ok(true),
                BranchState::Pending if self.in_flight.is_empty() => {
                    Err(RenderError::InvalidBranch(id.0))
                }
                BranchState::Pending => Ok(false),
            };
        }
        match self.branches.take_ready(id) {
            Ok(segment) => {
                log::trace!(target: "render.stream", "splicing branch {id} ({} nodes)", segment.len());
                self.queue.release(node);
                self.splices.push(segment);
                Ok(true)
            }
            Err(err) => {
                self.queue.release(node);
                Err(err)
            }
        }
    }

    /// Drive pending branch computations and build whatever settled.
    ///
    /// A branch that fails keeps its error in the arena; the stream reports
    /// it only once everything before the branch has been emitted.
    fn settle(&mut self, cx: &mut Context<'_>) -> RenderResult<()> {
        while !self.in_flight.is_empty() && !self.cancel.is_cancelled() {
            let Poll::Ready(Some((id, outcome))) = self.in_flight.poll_next_unpin(cx) else {
                break;
            };
            let branch = self.branches.settle(id)?;
            let built = match outcome {
                Ok(renderable) => {
                    QueueBuilder::new(&self.queue, &mut self.branches, &mut self.in_flight)
                        .build(renderable, branch.scope)
                }
                Err(source) => Err(RenderError::component(
                    &branch.display_name,
                    branch.module_id.as_deref(),
                    source,
                )),
            };
            match built {
                Ok(segment) => {
                    log::trace!(target: "render.stream", "branch {id} settled");
                    self.branches.fill(id, segment)?;
                }
                Err(err) => {
                    log::debug!(target: "render.stream", "branch {id} failed: {err}");
                    self.branches.fail(id, err)?;
                }
            }
            self.stats.branches = self.branches.reserved() as u64;
        }
        Ok(())
    }

    fn next_node(&mut self) -> Option<QueueNode> {
        while let Some(top) = self.splices.last_mut() {
            if let Some(node) = top.pop_front() {
                return Some(node);
            }
            self.splices.pop();
        }
        self.queue.nodes.pop_front()
    }

    fn put_back(&mut self, node: QueueNode) {
        match self.splices.last_mut() {
            Some(top) => top.push_front(node),
            None => self.queue.nodes.push_front(node),
        }
    }

    fn encode(&mut self, node: QueueNode) {
        match &node {
            QueueNode::Text(text) => {
                self.buf
                    .extend_from_slice(escape_html(&text.content).as_bytes());
            }
            QueueNode::Html(html) => self.buf.extend_from_slice(html.html.as_bytes()),
            QueueNode::Instruction(slot) => {
                if let Some(instruction) = &slot.instruction {
                    let resolved =
                        instruction.resolve(&mut self.queue.result().borrow_mut(), &self.config);
                    if let Some(html) = resolved {
                        self.buf.extend_from_slice(html.as_bytes());
                    }
                }
            }
            // Inline children follow the node itself.
            QueueNode::Component(_) => {}
        }
        self.stats.nodes += 1;
        self.queue.release(node);
    }

    fn take_chunk(&mut self) -> Bytes {
        let chunk = self.buf.split().freeze();
        self.bytes_emitted += chunk.len() as u64;
        self.stats.chunks += 1;
        chunk
    }

    /// Hand every node still queued or parked in a settled branch back to
    /// the pool and drop unfinished computations.
    fn release_all(&mut self) {
        self.in_flight = InFlight::new();
        let root = std::mem::take(&mut self.queue.nodes);
        let splices = std::mem::take(&mut self.splices);
        self.queue
            .release_all(root.into_iter().chain(splices.into_iter().flatten()));
        self.queue.release_all(self.branches.drain_ready());
    }

    fn abort(&mut self) {
        log::debug!(
            target: "render.stream",
            "render cancelled after {} bytes: {}",
            self.bytes_emitted,
            self.cancel.reason().unwrap_or("no reason given")
        );
        self.release_all();
        self.buf.clear();
        self.phase = Phase::Finished;
    }

    fn fail(&mut self, err: RenderError) {
        log::warn!(
            target: "render.stream",
            "render failed after {} bytes: {err}",
            self.bytes_emitted + self.buf.len() as u64
        );
        self.release_all();
        self.phase = Phase::Failing(Some(err));
    }

    fn finish(&mut self) {
        log::debug!(
            target: "render.stream",
            "render finished: {} bytes in {} chunks",
            self.bytes_emitted + self.buf.len() as u64,
            self.stats.chunks + u64::from(!self.buf.is_empty())
        );
        self.release_all();
        self.phase = Phase::Finished;
    }
}

impl Stream for RenderStream {
    type Item = RenderResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match this.phase {
                Phase::Finished => return Poll::Ready(None),
                Phase::Failing(_) => {
                    if !this.buf.is_empty() {
                        return Poll::Ready(Some(Ok(this.take_chunk())));
                    }
                    let phase = std::mem::replace(&mut this.phase, Phase::Finished);
                    if let Phase::Failing(Some(err)) = phase {
                        return Poll::Ready(Some(Err(err)));
                    }
                    return Poll::Ready(None);
                }
                Phase::Streaming => {}
            }

            if this.cancel.is_cancelled() {
                this.abort();
                return Poll::Ready(None);
            }
            this.cancel.register(cx.waker());

            match this.advance(cx) {
                Ok(Step::Chunk) => return Poll::Ready(Some(Ok(this.take_chunk()))),
                Ok(Step::Wait) => {
                    if this.cancel.is_cancelled() {
                        continue;
                    }
                    if !this.buf.is_empty() {
                        return Poll::Ready(Some(Ok(this.take_chunk())));
                    }
                    this.stats.waits += 1;
                    return Poll::Pending;
                }
                Ok(Step::End) => {
                    this.finish();
                    if !this.buf.is_empty() {
                        return Poll::Ready(Some(Ok(this.take_chunk())));
                    }
                    return Poll::Ready(None);
                }
                Err(err) => this.fail(err),
            }
        }
    }
}

impl Drop for RenderStream {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl fmt::Debug for RenderStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderStream")
            .field("queue", &self.queue)
            .field("pending_branches", &self.branches.pending())
            .field("bytes_emitted", &self.bytes_emitted)
            .field("cancel", &self.cancel)
            .finish()
    }
}

/// Render `root` to completion and collect the output as text.
pub async fn render_to_string(
    root: impl Into<Renderable>,
    result: ResultHandle,
    config: RenderConfig,
) -> RenderResult<String> {
    let mut stream = RenderStream::new(root, result, config)?;
    let mut decoder = Utf8Decoder::new();
    while let Some(chunk) = stream.next().await {
        decoder.push(&chunk?);
    }
    Ok(decoder.finish())
}
