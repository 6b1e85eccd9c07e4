#![allow(dead_code)]

use std::rc::Rc;
use std::time::Duration;

use html::{escape_html, mark_html};
use html_test_support::{Collected, FixtureKind, FixtureNode, collect_chunks};
use render::{
    ComponentInstance, Props, RenderConfig, RenderError, RenderStream, Renderable, ResultContext,
    ResultHandle, component_fn,
};

pub fn config(chunk_size: usize) -> RenderConfig {
    RenderConfig {
        chunk_size,
        ..RenderConfig::default()
    }
}

pub fn result() -> ResultHandle {
    ResultContext::default().into_handle()
}

pub fn stream(root: impl Into<Renderable>, config: RenderConfig) -> RenderStream {
    RenderStream::new(root, result(), config)
        .unwrap_or_else(|err| panic!("render failed to start: {err}"))
}

pub async fn render(root: impl Into<Renderable>, config: RenderConfig) -> Collected<RenderError> {
    collect_chunks(stream(root, config)).await
}

pub fn text_chunks(collected: &Collected<RenderError>) -> Vec<String> {
    collected
        .chunks
        .iter()
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect()
}

/// A component whose output settles after `ms` milliseconds.
pub fn delayed(name: &str, ms: u64, content: &'static str) -> Renderable {
    let component = component_fn(name, move |_| {
        Ok(Renderable::deferred(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(Renderable::html(mark_html(content)))
        }))
    });
    ComponentInstance::new(component).into()
}

/// A component whose output is ready without waiting.
pub fn immediate(name: &str, content: &'static str) -> Renderable {
    let component = component_fn(name, move |_| Ok(Renderable::html(mark_html(content))));
    ComponentInstance::new(component).into()
}

/// `Greeting` renders `<b>{name}</b>` from its props.
pub fn greeting(name: &str) -> Renderable {
    let component = component_fn("Greeting", |cx| {
        let name = cx.prop_str("name").unwrap_or("stranger");
        Ok(Renderable::html(mark_html(format!("<b>{}</b>", escape_html(name)))))
    });
    ComponentInstance::new(component).with_prop("name", name).into()
}

pub fn fixture_tree(nodes: &[FixtureNode]) -> Renderable {
    Renderable::fragment(nodes.iter().map(fixture_node))
}

pub fn fixture_node(node: &FixtureNode) -> Renderable {
    match node.kind() {
        FixtureKind::Text => Renderable::text(node.text.clone().unwrap_or_default()),
        FixtureKind::Html => Renderable::html(mark_html(node.html.clone().unwrap_or_default())),
        FixtureKind::Slot => Renderable::slot(node.slot.clone().unwrap_or_default()),
        FixtureKind::Fragment => fixture_tree(&node.children),
        FixtureKind::Component => fixture_component(node),
    }
}

fn fixture_component(node: &FixtureNode) -> Renderable {
    let name = node.component.clone().unwrap_or_default();
    let children = Rc::new(node.children.clone());
    let delay = Duration::from_millis(node.delay_ms);
    let component = component_fn(name, move |_| {
        let output = fixture_tree(&children);
        if delay.is_zero() {
            return Ok(output);
        }
        Ok(Renderable::deferred(async move {
            tokio::time::sleep(delay).await;
            Ok(output)
        }))
    });

    let props = serde_json::to_value(&node.props)
        .map(Props::from_json)
        .unwrap_or_default();
    let mut instance = ComponentInstance::new(component).with_props(props);
    for (name, content) in &node.slots {
        let content = Rc::new(content.clone());
        instance = instance.with_slot(name.clone(), move || fixture_tree(&content));
    }
    instance.into()
}
