//! Per-request state shared by every branch of one render.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use core_types::{HydrationId, IslandId};
use html::HtmlString;
use serde_json::{Map, Value};

use crate::component::ComponentInstance;

/// Request data supplied by the routing layer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestMeta {
    pub params: BTreeMap<String, String>,
    pub locals: Map<String, Value>,
    /// Partial renders (fragments, server islands) skip page-level head
    /// content.
    pub partial: bool,
}

impl RequestMeta {
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_local(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.locals.insert(key.into(), value.into());
        self
    }

    pub fn partial(mut self) -> Self {
        self.partial = true;
        self
    }
}

/// A server island whose real content is rendered after the main response.
#[derive(Clone, Debug)]
pub struct IslandRecord {
    pub id: IslandId,
    pub instance: ComponentInstance,
}

#[derive(Debug, Default)]
pub struct ResultContext {
    meta: RequestMeta,
    styles: Vec<HtmlString>,
    scripts: Vec<HtmlString>,
    extra_head: Vec<HtmlString>,
    // Append-only: a flushed key is never forgotten within a request.
    rendered: HashSet<String>,
    next_hydration_id: u32,
    next_island_id: u32,
    islands: Vec<IslandRecord>,
}

/// Shared handle threaded through a render. Renders are single-threaded, so
/// a `RefCell` is enough; borrows never span a component call.
pub type ResultHandle = Rc<RefCell<ResultContext>>;

impl ResultContext {
    pub fn new(meta: RequestMeta) -> Self {
        Self {
            meta,
            ..Self::default()
        }
    }

    pub fn into_handle(self) -> ResultHandle {
        Rc::new(RefCell::new(self))
    }

    pub fn meta(&self) -> &RequestMeta {
        &self.meta
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.meta.params.get(name).map(String::as_str)
    }

    pub fn local(&self, key: &str) -> Option<&Value> {
        self.meta.locals.get(key)
    }

    pub fn is_partial(&self) -> bool {
        self.meta.partial
    }

    pub fn add_style(&mut self, html: impl Into<HtmlString>) {
        push_unique(&mut self.styles, html.into());
    }

    pub fn add_script(&mut self, html: impl Into<HtmlString>) {
        push_unique(&mut self.scripts, html.into());
    }

    pub fn add_head(&mut self, html: impl Into<HtmlString>) {
        self.extra_head.push(html.into());
    }

    /// Everything hoisted into the document head so far.
    pub fn head_html(&self) -> HtmlString {
        HtmlString::concat(
            self.styles
                .iter()
                .chain(&self.scripts)
                .chain(&self.extra_head),
        )
    }

    /// Record `key` as flushed. Returns `false` if it already was, in which
    /// case the caller must not emit it again.
    pub fn try_flush(&mut self, key: &str) -> bool {
        if self.rendered.contains(key) {
            return false;
        }
        self.rendered.insert(key.to_owned())
    }

    pub fn has_flushed(&self, key: &str) -> bool {
        self.rendered.contains(key)
    }

    pub fn next_hydration_id(&mut self) -> HydrationId {
        let id = HydrationId(self.next_hydration_id);
        self.next_hydration_id += 1;
        id
    }

    pub(crate) fn register_island(&mut self, instance: ComponentInstance) -> IslandId {
        let id = IslandId(self.next_island_id);
        self.next_island_id += 1;
        self.islands.push(IslandRecord { id, instance });
        id
    }

    pub fn islands(&self) -> &[IslandRecord] {
        &self.islands
    }

    /// Hand the recorded islands to the caller for their own renders.
    pub fn take_islands(&mut self) -> Vec<IslandRecord> {
        std::mem::take(&mut self.islands)
    }
}

fn push_unique(list: &mut Vec<HtmlString>, html: HtmlString) {
    if !list.contains(&html) {
        list.push(html);
    }
}
