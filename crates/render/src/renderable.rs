//! What components return: the input side of the queue builder.

use std::borrow::Cow;
use std::fmt;
use std::future::Future;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use html::HtmlString;

use crate::component::{ComponentInstance, ServerIsland};
use crate::instruction::RenderInstruction;

/// A pending computation producing more renderable content.
pub type DeferredRender = LocalBoxFuture<'static, anyhow::Result<Renderable>>;

#[derive(Default)]
pub enum Renderable {
    /// Produces no output at all.
    #[default]
    Empty,
    /// Plain text, escaped on output.
    Text(String),
    /// Markup that is already safe.
    Html(HtmlString),
    /// Static markup wrapped through the HTML-string cache when queued.
    RawHtml(Cow<'static, str>),
    Fragment(Vec<Renderable>),
    Template(Template),
    Component(ComponentInstance),
    Island(ServerIsland),
    Instruction(RenderInstruction),
    /// A named slot of the enclosing component, expanded only when reached.
    Slot(SlotRef),
    /// Output that is not ready yet; its place in the output is reserved.
    Deferred(DeferredRender),
}

/// Interleaved static markup and dynamic expressions:
/// `html_parts[0] expressions[0] html_parts[1] ...`.
#[derive(Debug, Default)]
pub struct Template {
    pub html_parts: Vec<Cow<'static, str>>,
    pub expressions: Vec<Renderable>,
}

impl Template {
    pub fn new(
        html_parts: impl IntoIterator<Item = impl Into<Cow<'static, str>>>,
        expressions: impl IntoIterator<Item = Renderable>,
    ) -> Self {
        Self {
            html_parts: html_parts.into_iter().map(Into::into).collect(),
            expressions: expressions.into_iter().collect(),
        }
    }

    /// Parts and expressions in output order.
    pub(crate) fn into_sequence(self) -> Vec<Renderable> {
        let mut out = Vec::with_capacity(self.html_parts.len() + self.expressions.len());
        let mut parts = self.html_parts.into_iter();
        let mut expressions = self.expressions.into_iter();
        loop {
            let part = parts.next();
            let expression = expressions.next();
            if part.is_none() && expression.is_none() {
                return out;
            }
            if let Some(part) = part {
                out.push(Renderable::RawHtml(part));
            }
            if let Some(expression) = expression {
                out.push(expression);
            }
        }
    }
}

#[derive(Debug)]
pub struct SlotRef {
    pub name: String,
    pub fallback: Option<Box<Renderable>>,
}

impl Renderable {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn html(html: impl Into<HtmlString>) -> Self {
        Self::Html(html.into())
    }

    pub fn raw(markup: impl Into<Cow<'static, str>>) -> Self {
        Self::RawHtml(markup.into())
    }

    pub fn fragment(children: impl IntoIterator<Item = Renderable>) -> Self {
        Self::Fragment(children.into_iter().collect())
    }

    pub fn slot(name: impl Into<String>) -> Self {
        Self::Slot(SlotRef {
            name: name.into(),
            fallback: None,
        })
    }

    pub fn slot_or(name: impl Into<String>, fallback: impl Into<Renderable>) -> Self {
        Self::Slot(SlotRef {
            name: name.into(),
            fallback: Some(Box::new(fallback.into())),
        })
    }

    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<Renderable>> + 'static,
    {
        Self::Deferred(future.boxed_local())
    }

    /// Text from untrusted bytes; invalid UTF-8 becomes U+FFFD instead of
    /// failing the render.
    pub fn from_bytes_lossy(bytes: &[u8]) -> Self {
        Self::Text(tools::utf8::decode_lossy(bytes))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(text) => text.is_empty(),
            Self::Html(html) => html.is_empty(),
            Self::RawHtml(raw) => raw.is_empty(),
            Self::Fragment(children) => children.iter().all(Renderable::is_empty),
            _ => false,
        }
    }
}

impl fmt::Debug for Renderable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Html(html) => f.debug_tuple("Html").field(html).finish(),
            Self::RawHtml(raw) => f.debug_tuple("RawHtml").field(raw).finish(),
            Self::Fragment(children) => f.debug_tuple("Fragment").field(children).finish(),
            Self::Template(template) => template.fmt(f),
            Self::Component(instance) => instance.fmt(f),
            Self::Island(island) => island.fmt(f),
            Self::Instruction(instruction) => instruction.fmt(f),
            Self::Slot(slot) => slot.fmt(f),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<&str> for Renderable {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for Renderable {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<HtmlString> for Renderable {
    fn from(html: HtmlString) -> Self {
        Self::Html(html)
    }
}

impl From<Template> for Renderable {
    fn from(template: Template) -> Self {
        Self::Template(template)
    }
}

impl From<ComponentInstance> for Renderable {
    fn from(instance: ComponentInstance) -> Self {
        Self::Component(instance)
    }
}

impl From<ServerIsland> for Renderable {
    fn from(island: ServerIsland) -> Self {
        Self::Island(island)
    }
}

impl From<RenderInstruction> for Renderable {
    fn from(instruction: RenderInstruction) -> Self {
        Self::Instruction(instruction)
    }
}

impl<T: Into<Renderable>> From<Option<T>> for Renderable {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

impl<T: Into<Renderable>> From<Vec<T>> for Renderable {
    fn from(children: Vec<T>) -> Self {
        Self::Fragment(children.into_iter().map(Into::into).collect())
    }
}

macro_rules! display_as_text {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Renderable {
            fn from(value: $ty) -> Self {
                Self::Text(value.to_string())
            }
        })*
    };
}

display_as_text!(i32, i64, u32, u64, usize, f64, char);
