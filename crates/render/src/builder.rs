//! Flattens a renderable tree into queue nodes with an explicit stack.
//!
//! Children are pushed in reverse so popping restores source order. A
//! component whose render returns a pending computation gets its output
//! position reserved as a branch; the stream splices the branch in once the
//! computation settles, so completion order never leaks into the output.

use std::borrow::Cow;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use futures::stream::FuturesUnordered;
use html::HtmlString;

use crate::component::{ComponentCx, ComponentInstance, ServerIsland, Slots};
use crate::error::{RenderError, RenderResult};
use crate::instruction::{RenderInstruction, SERVER_ISLAND_MARKER};
use crate::node::{Branch, BranchId, NodeKind, QueueNode, Segment};
use crate::queue::{BranchArena, PendingBranch, RenderQueue};
use crate::renderable::{DeferredRender, Renderable, SlotRef};

/// Branch computations still running, tagged with the branch they fill.
pub(crate) type InFlight =
    FuturesUnordered<LocalBoxFuture<'static, (BranchId, anyhow::Result<Renderable>)>>;

/// The component whose output is being flattened; slot references resolve
/// against it.
pub(crate) struct Scope {
    display_name: String,
    slots: Slots,
    parent: Option<Rc<Scope>>,
}

impl Drop for Scope {
    // Deep component chains would otherwise drop their parents recursively.
    fn drop(&mut self) {
        let mut parent = self.parent.take();
        while let Some(scope) = parent {
            match Rc::try_unwrap(scope) {
                Ok(mut scope) => parent = scope.parent.take(),
                Err(_) => break,
            }
        }
    }
}

struct StackItem {
    node: Renderable,
    scope: Option<Rc<Scope>>,
}

pub(crate) struct QueueBuilder<'a> {
    queue: &'a RenderQueue,
    branches: &'a mut BranchArena,
    in_flight: &'a mut InFlight,
}

impl<'a> QueueBuilder<'a> {
    pub fn new(
        queue: &'a RenderQueue,
        branches: &'a mut BranchArena,
        in_flight: &'a mut InFlight,
    ) -> Self {
        Self {
            queue,
            branches,
            in_flight,
        }
    }

    /// Flatten `root` into an ordered segment. On failure the nodes built so
    /// far are released before the error is returned.
    pub fn build(&mut self, root: Renderable, scope: Option<Rc<Scope>>) -> RenderResult<Segment> {
        let mut out = Segment::new();
        let mut stack = vec![StackItem { node: root, scope }];
        if let Err(err) = self.drain(&mut stack, &mut out) {
            self.queue.release_all(out);
            return Err(err);
        }
        Ok(out)
    }

    fn drain(&mut self, stack: &mut Vec<StackItem>, out: &mut Segment) -> RenderResult<()> {
        while let Some(StackItem { node, scope }) = stack.pop() {
            match node {
                Renderable::Empty => {}
                Renderable::Text(text) => {
                    if !text.is_empty() {
                        out.push_back(self.text_node(text));
                    }
                }
                Renderable::Html(html) => {
                    if !html.is_empty() {
                        out.push_back(self.html_node(html));
                    }
                }
                Renderable::RawHtml(raw) => {
                    if !raw.is_empty() {
                        let html = self.queue.wrap_html(&raw);
                        out.push_back(self.html_node(html));
                    }
                }
                Renderable::Fragment(children) => push_children(stack, children, &scope),
                Renderable::Template(template) => {
                    push_children(stack, template.into_sequence(), &scope)
                }
                Renderable::Instruction(instruction) => {
                    out.push_back(self.instruction_node(instruction))
                }
                Renderable::Component(instance) => self.component(instance, scope, stack, out)?,
                Renderable::Deferred(future) => {
                    let id = self.reserve(String::new(), None, scope, future);
                    out.push_back(self.component_node("", Branch::Reserved(id)));
                }
                Renderable::Slot(slot) => expand_slot(slot, scope, stack),
                Renderable::Island(island) => self.island(island, scope, stack),
            }
        }
        Ok(())
    }

    fn component(
        &mut self,
        instance: ComponentInstance,
        scope: Option<Rc<Scope>>,
        stack: &mut Vec<StackItem>,
        out: &mut Segment,
    ) -> RenderResult<()> {
        let ComponentInstance {
            component,
            props,
            slots,
        } = instance;
        let rendered = {
            let mut cx = ComponentCx::new(&props, &slots, self.queue.result());
            component.render(&mut cx)
        };
        let output = rendered.map_err(|source| {
            RenderError::component(component.display_name(), component.module_id(), source)
        })?;

        let display_name = component.display_name();
        let child = Rc::new(Scope {
            display_name: display_name.to_owned(),
            slots,
            parent: scope,
        });
        match output {
            Renderable::Deferred(future) => {
                let module_id = component.module_id().map(str::to_owned);
                let id = self.reserve(display_name.to_owned(), module_id, Some(child), future);
                out.push_back(self.component_node(display_name, Branch::Reserved(id)));
            }
            output => {
                log::trace!(target: "render.builder", "component `{display_name}` rendered inline");
                out.push_back(self.component_node(display_name, Branch::Inline));
                stack.push(StackItem {
                    node: output,
                    scope: Some(child),
                });
            }
        }
        Ok(())
    }

    fn reserve(
        &mut self,
        display_name: String,
        module_id: Option<String>,
        scope: Option<Rc<Scope>>,
        future: DeferredRender,
    ) -> BranchId {
        let id = self.branches.reserve(PendingBranch {
            display_name,
            module_id,
            scope,
        });
        log::trace!(target: "render.builder", "reserved branch {id}");
        self.in_flight
            .push(async move { (id, future.await) }.boxed_local());
        id
    }

    fn island(&mut self, island: ServerIsland, scope: Option<Rc<Scope>>, stack: &mut Vec<StackItem>) {
        let ServerIsland { instance } = island;
        let component = instance.display_name().to_owned();
        let props = instance.props.as_map().clone();
        let fallback = instance.slots.get("fallback").cloned();
        let id = self.queue.result().borrow_mut().register_island(instance);
        log::debug!(target: "render.builder", "server island {id} ({component}) deferred");

        let fallback = fallback.map(|thunk| thunk()).unwrap_or_default();
        let sequence = [
            (Renderable::Instruction(RenderInstruction::ServerIslandRuntime), None),
            (Renderable::RawHtml(Cow::Borrowed(SERVER_ISLAND_MARKER)), None),
            (fallback, scope),
            (
                Renderable::Instruction(RenderInstruction::ServerIslandFetch {
                    island: id,
                    component,
                    props,
                }),
                None,
            ),
        ];
        for (node, scope) in sequence.into_iter().rev() {
            stack.push(StackItem { node, scope });
        }
    }

    fn text_node(&self, text: String) -> QueueNode {
        let mut node = self.queue.acquire(NodeKind::Text);
        if let QueueNode::Text(slot) = &mut node {
            // Reuse a pooled buffer when it is big enough; otherwise adopt ours.
            if slot.content.capacity() >= text.len() {
                slot.content.push_str(&text);
            } else {
                slot.content = text;
            }
        }
        node
    }

    fn html_node(&self, html: HtmlString) -> QueueNode {
        let mut node = self.queue.acquire(NodeKind::HtmlString);
        if let QueueNode::Html(slot) = &mut node {
            slot.html = html;
        }
        node
    }

    fn instruction_node(&self, instruction: RenderInstruction) -> QueueNode {
        let mut node = self.queue.acquire(NodeKind::Instruction);
        if let QueueNode::Instruction(slot) = &mut node {
            slot.instruction = Some(instruction);
        }
        node
    }

    fn component_node(&self, display_name: &str, branch: Branch) -> QueueNode {
        let mut node = self.queue.acquire(NodeKind::Component);
        if let QueueNode::Component(slot) = &mut node {
            slot.display_name.push_str(display_name);
            slot.branch = branch;
        }
        node
    }
}

fn push_children(stack: &mut Vec<StackItem>, children: Vec<Renderable>, scope: &Option<Rc<Scope>>) {
    for child in children.into_iter().rev() {
        stack.push(StackItem {
            node: child,
            scope: scope.clone(),
        });
    }
}

// Slot content was written where the component was used, so it resolves its
// own slot references against the enclosing scope.
fn expand_slot(slot: SlotRef, scope: Option<Rc<Scope>>, stack: &mut Vec<StackItem>) {
    let SlotRef { name, fallback } = slot;
    let thunk = scope.as_ref().and_then(|s| s.slots.get(&name)).cloned();
    match (thunk, scope) {
        (Some(thunk), Some(scope)) => {
            log::trace!(
                target: "render.builder",
                "expanding slot `{name}` of `{}`",
                scope.display_name
            );
            stack.push(StackItem {
                node: thunk(),
                scope: scope.parent.clone(),
            });
        }
        (_, scope) => {
            if let Some(fallback) = fallback {
                stack.push(StackItem {
                    node: *fallback,
                    scope,
                });
            }
        }
    }
}
