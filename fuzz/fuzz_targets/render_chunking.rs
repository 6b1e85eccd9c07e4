#![no_main]

use futures::StreamExt;
use futures::executor::block_on;
use libfuzzer_sys::fuzz_target;
use render::{ComponentInstance, RenderConfig, RenderStream, Renderable, ResultContext, component_fn};

// Each input byte picks a node; the output must not depend on chunk size.
fn tree(data: &[u8]) -> Renderable {
    let children = data.iter().map(|&b| match b % 4 {
        0 => Renderable::text(char::from(b).to_string()),
        1 => Renderable::raw("<i>"),
        2 => {
            let text = format!("[{b}]");
            let component = component_fn("Byte", move |_| Ok(Renderable::text(text.clone())));
            Renderable::from(ComponentInstance::new(component))
        }
        _ => Renderable::deferred(async move { Ok(Renderable::text(format!("~{b}"))) }),
    });
    Renderable::fragment(children)
}

fn render(data: &[u8], chunk_size: usize) -> Vec<u8> {
    let config = RenderConfig {
        chunk_size,
        ..RenderConfig::default()
    };
    let Ok(stream) = RenderStream::new(tree(data), ResultContext::default().into_handle(), config)
    else {
        return Vec::new();
    };
    block_on(stream.fold(Vec::new(), |mut out, chunk| async move {
        if let Ok(bytes) = chunk {
            assert!(!bytes.is_empty());
            out.extend_from_slice(&bytes);
        }
        out
    }))
}

fuzz_target!(|data: &[u8]| {
    if data.len() > 4096 {
        return;
    }
    let whole = render(data, 64 * 1024);
    assert_eq!(render(data, 1), whole);
    assert_eq!(render(data, 7), whole);
});
