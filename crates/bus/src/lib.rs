use bytes::Bytes;
use core_types::{IslandId, RequestId};
use render::RequestMeta;
use std::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

#[derive(Debug)]
pub enum RenderCommand {
    // Page renders
    RenderPage {
        request_id: RequestId,
        route: String,
        request: RequestMeta,
    },
    // Server island content, deferred by an earlier page render
    RenderIsland {
        request_id: RequestId,
        page_request_id: RequestId,
        island: IslandId,
        request: RequestMeta,
    },
    // Client went away or a deadline passed
    Cancel {
        request_id: RequestId,
        reason: String,
    },
    // Islands of a page that will never be requested
    ForgetIslands {
        page_request_id: RequestId,
    },
}

#[derive(Debug)]
pub enum RenderEvent {
    Started {
        request_id: RequestId,
        route: String,
    },
    Chunk {
        request_id: RequestId,
        bytes: Bytes,
    },
    Done {
        request_id: RequestId,
        bytes: u64,
        islands: Vec<IslandId>,
    },
    Cancelled {
        request_id: RequestId,
        reason: String,
        bytes: u64,
    },
    /// `bytes` > 0 means part of the response is already out and only the
    /// connection can signal the failure.
    Failed {
        request_id: RequestId,
        error: String,
        bytes: u64,
    },
    NotFound {
        request_id: RequestId,
        route: String,
    },
}

impl RenderEvent {
    pub fn request_id(&self) -> RequestId {
        match self {
            Self::Started { request_id, .. }
            | Self::Chunk { request_id, .. }
            | Self::Done { request_id, .. }
            | Self::Cancelled { request_id, .. }
            | Self::Failed { request_id, .. }
            | Self::NotFound { request_id, .. } => *request_id,
        }
    }

    /// No further events follow for this request.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started { .. } | Self::Chunk { .. })
    }
}

pub struct Bus {
    pub cmd_tx: UnboundedSender<RenderCommand>,
    pub evt_rx: Receiver<RenderEvent>,
    pub evt_tx: Sender<RenderEvent>, // shareable for runtimes
}

impl Bus {
    /// A bus plus the command receiver a runtime consumes.
    pub fn new() -> (Self, UnboundedReceiver<RenderCommand>) {
        let (cmd_tx, cmd_rx) = unbounded_channel();
        let (evt_tx, evt_rx) = mpsc::channel();
        (
            Self {
                cmd_tx,
                evt_rx,
                evt_tx,
            },
            cmd_rx,
        )
    }
}
