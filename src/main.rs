use std::io::Write;
use std::sync::mpsc;
use std::time::Duration;
use std::{env, fs, io};

use anyhow::{Context, bail};
use bus::{Bus, RenderCommand, RenderEvent};
use core_types::{IslandId, RequestId};
use html::mark_html;
use mimalloc::MiMalloc;
use render::{
    ComponentInstance, RenderConfig, RenderInstruction, Renderable, RequestMeta, ServerIsland,
    Template, component_fn,
};
use runtime_render::{Routes, start_render_runtime};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const EVENT_TIMEOUT: Duration = Duration::from_secs(30);

fn demo_routes() -> Routes {
    Routes::new().with_page("/", |request| {
        let title = request.params.get("title").cloned().unwrap_or_else(|| "Demo".into());
        let layout = component_fn("Layout", move |cx| {
            cx.add_style("<style>body{font-family:sans-serif}</style>");
            Ok(Template::new(
                [
                    "<!doctype html><html><head><title>",
                    "</title>",
                    "</head><body>",
                    "</body></html>",
                ],
                [
                    Renderable::text(title.clone()),
                    RenderInstruction::MaybeHead.into(),
                    cx.slot("default"),
                ],
            )
            .into())
        });
        ComponentInstance::new(layout)
            .with_slot("default", page_body)
            .into()
    })
}

fn page_body() -> Renderable {
    let forecast = component_fn("Forecast", |_| {
        Ok(Renderable::deferred(async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(Renderable::html(mark_html("<p>Sunny, 21&deg;C</p>")))
        }))
    });
    let counter = component_fn("Counter", |cx| {
        let start = cx.props().get("start").cloned().unwrap_or_default();
        let button = Renderable::html(mark_html(format!("<button>{start}</button>")));
        Ok(cx.hydrate("idle", "/components/counter.js", button))
    });
    let cart = component_fn("Cart", |_| Ok(Renderable::text("2 items in your cart")));

    Renderable::fragment([
        Renderable::html(mark_html("<h1>Weather</h1>")),
        ComponentInstance::new(forecast).into(),
        ComponentInstance::new(counter).with_prop("start", 3).into(),
        ServerIsland::new(
            ComponentInstance::new(cart).with_slot("fallback", || Renderable::text("Loading cart...")),
        )
        .into(),
    ])
}

fn load_config() -> anyhow::Result<RenderConfig> {
    let Some(path) = env::args().nth(1) else {
        return Ok(RenderConfig::default());
    };
    let text = fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    toml::from_str(&text).with_context(|| format!("parsing {path}"))
}

/// Copy the response of `request_id` to `out`, returning the ids of any
/// server islands it deferred.
fn pipe_response(
    evt_rx: &mpsc::Receiver<RenderEvent>,
    request_id: RequestId,
    out: &mut impl Write,
) -> anyhow::Result<Vec<IslandId>> {
    loop {
        let event = evt_rx
            .recv_timeout(EVENT_TIMEOUT)
            .with_context(|| format!("request {request_id} stalled"))?;
        match event {
            RenderEvent::Started { route, .. } => log::info!("rendering {route}"),
            RenderEvent::Chunk { bytes, .. } => {
                out.write_all(&bytes)?;
                out.flush()?;
            }
            RenderEvent::Done { bytes, islands, .. } => {
                log::info!("request {request_id} done: {bytes} bytes");
                return Ok(islands);
            }
            RenderEvent::Cancelled { reason, .. } => bail!("request {request_id} cancelled: {reason}"),
            RenderEvent::Failed { error, .. } => bail!("request {request_id} failed: {error}"),
            RenderEvent::NotFound { route, .. } => bail!("no page for {route}"),
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = load_config()?;

    let (bus, cmd_rx) = Bus::new();
    let worker = start_render_runtime(cmd_rx, bus.evt_tx.clone(), config, demo_routes);
    let mut stdout = io::stdout().lock();

    bus.cmd_tx.send(RenderCommand::RenderPage {
        request_id: 1,
        route: "/".into(),
        request: RequestMeta::default().with_param("title", "Weather report"),
    })?;
    let islands = pipe_response(&bus.evt_rx, 1, &mut stdout)?;

    for (offset, island) in islands.into_iter().enumerate() {
        let request_id = 2 + offset as RequestId;
        writeln!(stdout, "\n<!-- {island} -->")?;
        bus.cmd_tx.send(RenderCommand::RenderIsland {
            request_id,
            page_request_id: 1,
            island,
            request: RequestMeta::default(),
        })?;
        pipe_response(&bus.evt_rx, request_id, &mut stdout)?;
    }
    writeln!(stdout)?;

    drop(bus);
    if worker.join().is_err() {
        bail!("render worker panicked");
    }
    Ok(())
}
