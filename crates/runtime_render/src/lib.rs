//! Render worker: owns a single-threaded async runtime and serves
//! [`RenderCommand`]s from the bus, streaming each response back as
//! [`RenderEvent`]s.
//!
//! Component trees are `!Send`, so pages are registered on the worker
//! thread itself through the `routes` factory passed to
//! [`start_render_runtime`].

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::mpsc::Sender;
use std::thread;

use bus::{RenderCommand, RenderEvent};
use core_types::{IslandId, RequestId};
use futures::StreamExt;
use render::{
    CancelHandle, IslandRecord, RenderConfig, RenderResult, RenderStream, RequestMeta,
    Renderable, ResultContext, SharedHtmlCache, SharedPool, shared_html_cache, shared_pool,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::{JoinSet, LocalSet};

pub type PageFn = Rc<dyn Fn(&RequestMeta) -> Renderable>;

/// Route table of the worker.
#[derive(Clone, Default)]
pub struct Routes {
    pages: HashMap<String, PageFn>,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page<F>(mut self, route: impl Into<String>, page: F) -> Self
    where
        F: Fn(&RequestMeta) -> Renderable + 'static,
    {
        self.pages.insert(route.into(), Rc::new(page));
        self
    }

    pub fn page(&self, route: &str) -> Option<&PageFn> {
        self.pages.get(route)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Server islands of finished page renders, by page request. Holds at most
/// `limit` pages; recording another one forgets the oldest.
struct IslandStore {
    pages: HashMap<RequestId, Vec<IslandRecord>>,
    order: VecDeque<RequestId>,
    limit: usize,
}

impl IslandStore {
    fn new(limit: usize) -> Self {
        Self {
            pages: HashMap::new(),
            order: VecDeque::new(),
            limit,
        }
    }

    fn record(&mut self, page_request_id: RequestId, records: Vec<IslandRecord>) {
        self.pages.insert(page_request_id, records);
        self.order.push_back(page_request_id);
        // `order` also keeps ids already fetched or forgotten, so it bounds
        // the map and itself.
        while self.order.len() > self.limit {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(dropped) = self.pages.remove(&oldest) {
                log::debug!(
                    target: "render.runtime",
                    "forgetting {} unfetched islands of request {oldest}",
                    dropped.len()
                );
            }
        }
    }

    fn take(&mut self, page_request_id: RequestId, island: IslandId) -> Option<IslandRecord> {
        let records = self.pages.get_mut(&page_request_id)?;
        let index = records.iter().position(|record| record.id == island)?;
        let record = records.swap_remove(index);
        if records.is_empty() {
            self.pages.remove(&page_request_id);
        }
        Some(record)
    }

    fn forget(&mut self, page_request_id: RequestId) {
        self.pages.remove(&page_request_id);
    }
}

struct RuntimeState {
    config: RenderConfig,
    pool: Option<SharedPool>,
    html_cache: Option<SharedHtmlCache>,
    cancels: HashMap<RequestId, CancelHandle>,
    islands: IslandStore,
}

type State = Rc<RefCell<RuntimeState>>;

pub fn start_render_runtime<F>(
    cmd_rx: UnboundedReceiver<RenderCommand>,
    evt_tx: Sender<RenderEvent>,
    config: RenderConfig,
    routes: F,
) -> thread::JoinHandle<()>
where
    F: FnOnce() -> Routes + Send + 'static,
{
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                log::error!(target: "render.runtime", "failed to start render runtime: {err}");
                return;
            }
        };
        let local = LocalSet::new();
        local.block_on(&runtime, serve(cmd_rx, evt_tx, config, routes()));
    })
}

async fn serve(
    mut cmd_rx: UnboundedReceiver<RenderCommand>,
    evt_tx: Sender<RenderEvent>,
    config: RenderConfig,
    routes: Routes,
) {
    let state: State = Rc::new(RefCell::new(RuntimeState {
        pool: shared_pool(&config.pool),
        html_cache: shared_html_cache(&config.html_cache),
        islands: IslandStore::new(config.retained_island_pages),
        config,
        cancels: HashMap::new(),
    }));
    let mut tasks = JoinSet::new();
    log::debug!(target: "render.runtime", "render runtime up with {} routes", routes.len());

    while let Some(cmd) = cmd_rx.recv().await {
        while tasks.try_join_next().is_some() {}
        match cmd {
            RenderCommand::RenderPage {
                request_id,
                route,
                request,
            } => {
                let Some(page) = routes.page(&route) else {
                    log::debug!(target: "render.runtime", "request {request_id}: no page for {route}");
                    let _ = evt_tx.send(RenderEvent::NotFound { request_id, route });
                    continue;
                };
                let root = page(&request);
                let result = ResultContext::new(request).into_handle();
                let started = {
                    let state = state.borrow();
                    RenderStream::with_shared(
                        root,
                        result,
                        state.config.clone(),
                        state.pool.clone(),
                        state.html_cache.clone(),
                    )
                };
                if let Some(stream) = track(&state, request_id, started, &evt_tx) {
                    let _ = evt_tx.send(RenderEvent::Started { request_id, route });
                    tasks.spawn_local(drive(state.clone(), request_id, stream, evt_tx.clone()));
                }
            }
            RenderCommand::RenderIsland {
                request_id,
                page_request_id,
                island,
                request,
            } => {
                let taken = state.borrow_mut().islands.take(page_request_id, island);
                let Some(record) = taken else {
                    log::debug!(
                        target: "render.runtime",
                        "request {request_id}: no {island} recorded for request {page_request_id}"
                    );
                    let _ = evt_tx.send(RenderEvent::NotFound {
                        request_id,
                        route: format!("{}/{island}", state.borrow().config.server_island_path),
                    });
                    continue;
                };
                let route = format!(
                    "{}/{}",
                    state.borrow().config.server_island_path,
                    record.instance.display_name()
                );
                let started = {
                    let state = state.borrow();
                    RenderStream::island_with_shared(
                        record,
                        request,
                        state.config.clone(),
                        state.pool.clone(),
                        state.html_cache.clone(),
                    )
                };
                if let Some(stream) = track(&state, request_id, started, &evt_tx) {
                    let _ = evt_tx.send(RenderEvent::Started { request_id, route });
                    tasks.spawn_local(drive(state.clone(), request_id, stream, evt_tx.clone()));
                }
            }
            RenderCommand::Cancel { request_id, reason } => {
                match state.borrow().cancels.get(&request_id) {
                    Some(handle) => handle.cancel(reason),
                    None => log::debug!(
                        target: "render.runtime",
                        "request {request_id}: nothing to cancel"
                    ),
                }
            }
            RenderCommand::ForgetIslands { page_request_id } => {
                state.borrow_mut().islands.forget(page_request_id);
            }
        }
    }

    // Bus closed: stop whatever is still rendering and let it report.
    for handle in state.borrow().cancels.values() {
        handle.cancel("render runtime shutting down");
    }
    while tasks.join_next().await.is_some() {}
    log::debug!(target: "render.runtime", "render runtime stopped");
}

fn track(
    state: &State,
    request_id: RequestId,
    started: RenderResult<RenderStream>,
    evt_tx: &Sender<RenderEvent>,
) -> Option<RenderStream> {
    match started {
        Ok(stream) => {
            state
                .borrow_mut()
                .cancels
                .insert(request_id, stream.cancel_handle());
            Some(stream)
        }
        Err(err) => {
            let _ = evt_tx.send(RenderEvent::Failed {
                request_id,
                error: err.to_string(),
                bytes: 0,
            });
            None
        }
    }
}

async fn drive(
    state: State,
    request_id: RequestId,
    mut stream: RenderStream,
    evt_tx: Sender<RenderEvent>,
) {
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                if evt_tx.send(RenderEvent::Chunk { request_id, bytes }).is_err() {
                    stream.cancel("event receiver dropped");
                }
            }
            Err(err) => {
                log::warn!(target: "render.runtime", "request {request_id} failed: {err}");
                let _ = evt_tx.send(RenderEvent::Failed {
                    request_id,
                    error: err.to_string(),
                    bytes: stream.bytes_emitted(),
                });
                state.borrow_mut().cancels.remove(&request_id);
                return;
            }
        }
    }

    let bytes = stream.bytes_emitted();
    let handle = stream.cancel_handle();
    let event = if handle.is_cancelled() {
        RenderEvent::Cancelled {
            request_id,
            reason: handle.reason().unwrap_or_default().to_owned(),
            bytes,
        }
    } else {
        let records = stream.result().borrow_mut().take_islands();
        let islands = records.iter().map(|record| record.id).collect();
        if !records.is_empty() {
            state.borrow_mut().islands.record(request_id, records);
        }
        RenderEvent::Done {
            request_id,
            bytes,
            islands,
        }
    };
    state.borrow_mut().cancels.remove(&request_id);
    let _ = evt_tx.send(event);
}
