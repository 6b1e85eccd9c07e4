//! Incremental server-side rendering: component trees in, ordered HTML
//! bytes out.
//!
//! A [`RenderStream`] flattens the synchronous part of a tree into a queue of
//! [`QueueNode`]s up front, then encodes that queue on demand. Components
//! that return [`Renderable::Deferred`] reserve their place in the queue and
//! are spliced in when they settle, so output order always follows the tree.

pub mod component;
pub mod config;
pub mod error;
pub mod instruction;
pub mod node;
pub mod pool;
pub mod queue;
pub mod renderable;
pub mod result;
pub mod stream;

mod builder;

pub use crate::component::{
    Component, ComponentCx, ComponentInstance, FnComponent, Props, ServerIsland, SlotThunk, Slots,
    component_fn,
};
pub use crate::config::{HtmlCacheConfig, PoolConfig, RenderConfig};
pub use crate::error::{RenderError, RenderResult};
pub use crate::instruction::{RenderInstruction, SERVER_ISLAND_MARKER};
pub use crate::node::{Branch, BranchId, NodeKind, QueueNode};
pub use crate::pool::{NodePool, PoolStats, SharedPool, shared_pool};
pub use crate::queue::{RenderQueue, SharedHtmlCache, shared_html_cache};
pub use crate::renderable::{DeferredRender, Renderable, SlotRef, Template};
pub use crate::result::{IslandRecord, RequestMeta, ResultContext, ResultHandle};
pub use crate::stream::{CancelHandle, RenderStream, StreamStats, render_to_string};
