//! Component instances, their props and lazily evaluated slots.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use core_types::HydrationId;
use html::{HtmlString, element, mark_html};
use serde_json::{Map, Value};

use crate::instruction::RenderInstruction;
use crate::renderable::Renderable;
use crate::result::ResultHandle;

/// A render unit. Asynchronous components return [`Renderable::Deferred`];
/// that is the only point where a render waits.
pub trait Component {
    fn display_name(&self) -> &str;

    /// Source location for error messages, when known.
    fn module_id(&self) -> Option<&str> {
        None
    }

    fn render(&self, cx: &mut ComponentCx<'_>) -> anyhow::Result<Renderable>;
}

/// A component backed by a closure.
pub struct FnComponent<F> {
    name: String,
    module_id: Option<String>,
    render: F,
}

impl<F> FnComponent<F>
where
    F: Fn(&mut ComponentCx<'_>) -> anyhow::Result<Renderable>,
{
    pub fn new(name: impl Into<String>, render: F) -> Self {
        Self {
            name: name.into(),
            module_id: None,
            render,
        }
    }

    pub fn with_module_id(mut self, module_id: impl Into<String>) -> Self {
        self.module_id = Some(module_id.into());
        self
    }
}

impl<F> Component for FnComponent<F>
where
    F: Fn(&mut ComponentCx<'_>) -> anyhow::Result<Renderable>,
{
    fn display_name(&self) -> &str {
        &self.name
    }

    fn module_id(&self) -> Option<&str> {
        self.module_id.as_deref()
    }

    fn render(&self, cx: &mut ComponentCx<'_>) -> anyhow::Result<Renderable> {
        (self.render)(cx)
    }
}

pub fn component_fn<F>(name: impl Into<String>, render: F) -> Rc<dyn Component>
where
    F: Fn(&mut ComponentCx<'_>) -> anyhow::Result<Renderable> + 'static,
{
    Rc::new(FnComponent::new(name, render))
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Props(Map<String, Value>);

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Props from a JSON value; anything but an object yields no props.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Props {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Zero-argument producer of slot content; only called if the slot is
/// actually rendered.
pub type SlotThunk = Rc<dyn Fn() -> Renderable>;

#[derive(Clone, Default)]
pub struct Slots(BTreeMap<String, SlotThunk>);

impl Slots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F>(mut self, name: impl Into<String>, thunk: F) -> Self
    where
        F: Fn() -> Renderable + 'static,
    {
        self.insert(name, thunk);
        self
    }

    pub fn insert<F>(&mut self, name: impl Into<String>, thunk: F)
    where
        F: Fn() -> Renderable + 'static,
    {
        self.0.insert(name.into(), Rc::new(thunk));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&SlotThunk> {
        self.0.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Slots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

/// A component bound to its props and slots.
#[derive(Clone)]
pub struct ComponentInstance {
    pub component: Rc<dyn Component>,
    pub props: Props,
    pub slots: Slots,
}

impl ComponentInstance {
    pub fn new(component: Rc<dyn Component>) -> Self {
        Self {
            component,
            props: Props::default(),
            slots: Slots::default(),
        }
    }

    pub fn with_props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props = self.props.with(key, value);
        self
    }

    pub fn with_slot<F>(mut self, name: impl Into<String>, thunk: F) -> Self
    where
        F: Fn() -> Renderable + 'static,
    {
        self.slots.insert(name, thunk);
        self
    }

    pub fn display_name(&self) -> &str {
        self.component.display_name()
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("display_name", &self.component.display_name())
            .field("props", &self.props)
            .field("slots", &self.slots)
            .finish()
    }
}

/// A component rendered as a placeholder now and fetched after the main
/// response. Its `fallback` slot is shown until the real content arrives.
#[derive(Clone, Debug)]
pub struct ServerIsland {
    pub instance: ComponentInstance,
}

impl ServerIsland {
    pub fn new(instance: ComponentInstance) -> Self {
        Self { instance }
    }
}

/// What a component sees while rendering.
pub struct ComponentCx<'a> {
    props: &'a Props,
    slots: &'a Slots,
    result: &'a ResultHandle,
}

impl<'a> ComponentCx<'a> {
    pub(crate) fn new(props: &'a Props, slots: &'a Slots, result: &'a ResultHandle) -> Self {
        Self {
            props,
            slots,
            result,
        }
    }

    pub fn props(&self) -> &Props {
        self.props
    }

    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.props.get_str(key)
    }

    pub fn has_slot(&self, name: &str) -> bool {
        self.slots.contains(name)
    }

    /// A reference to one of this component's slots. The slot's thunk runs
    /// only if the returned value ends up in the output.
    pub fn slot(&self, name: &str) -> Renderable {
        Renderable::slot(name)
    }

    pub fn slot_or(&self, name: &str, fallback: impl Into<Renderable>) -> Renderable {
        Renderable::slot_or(name, fallback)
    }

    /// The request's result context, for work that outlives this call
    /// (e.g. a deferred render).
    pub fn result(&self) -> &ResultHandle {
        self.result
    }

    pub fn param(&self, name: &str) -> Option<String> {
        self.result.borrow().param(name).map(str::to_owned)
    }

    pub fn local(&self, key: &str) -> Option<Value> {
        self.result.borrow().local(key).cloned()
    }

    pub fn add_style(&mut self, html: impl Into<HtmlString>) {
        self.result.borrow_mut().add_style(html);
    }

    pub fn add_script(&mut self, html: impl Into<HtmlString>) {
        self.result.borrow_mut().add_script(html);
    }

    pub fn add_head(&mut self, html: impl Into<HtmlString>) {
        self.result.borrow_mut().add_head(html);
    }

    pub fn hydration_id(&mut self) -> HydrationId {
        self.result.borrow_mut().next_hydration_id()
    }

    /// Wrap server-rendered `content` for client hydration under
    /// `directive` (e.g. `load`, `idle`, `visible`).
    pub fn hydrate(
        &mut self,
        directive: &str,
        component_url: &str,
        content: impl Into<Renderable>,
    ) -> Renderable {
        let uid = self.hydration_id();
        let mut attrs = Map::new();
        attrs.insert("uid".into(), Value::from(uid.to_string()));
        attrs.insert("component-url".into(), Value::from(component_url));
        attrs.insert("client".into(), Value::from(directive));
        attrs.insert("props".into(), Value::from(Value::Object(self.props.0.clone()).to_string()));
        attrs.insert("ssr".into(), Value::from(""));
        Renderable::fragment([
            Renderable::Instruction(RenderInstruction::hydration(directive)),
            Renderable::Html(element::open_tag("ssr-island", &attrs)),
            content.into(),
            Renderable::Html(mark_html("</ssr-island>")),
        ])
    }
}
