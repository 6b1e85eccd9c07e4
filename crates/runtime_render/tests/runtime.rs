use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use anyhow::anyhow;
use bus::{RenderCommand, RenderEvent};
use core_types::{IslandId, RequestId};
use html::mark_html;
use render::{
    ComponentInstance, RenderConfig, Renderable, RequestMeta, ServerIsland, component_fn,
};
use runtime_render::{Routes, start_render_runtime};
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};

const TIMEOUT: Duration = Duration::from_secs(10);

fn routes() -> Routes {
    Routes::new()
        .with_page("/", |request| {
            let name = request.params.get("name").cloned().unwrap_or_default();
            let late = component_fn("Late", |_| {
                Ok(Renderable::deferred(async {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Ok(Renderable::html(mark_html("<p>late</p>")))
                }))
            });
            Renderable::fragment([
                Renderable::html(mark_html("<h1>")),
                Renderable::text(format!("hi {name}")),
                Renderable::html(mark_html("</h1>")),
                ComponentInstance::new(late).into(),
            ])
        })
        .with_page("/slow", |_| {
            let slow = component_fn("Slow", |_| {
                Ok(Renderable::deferred(async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(Renderable::Empty)
                }))
            });
            Renderable::fragment([
                Renderable::html(mark_html("<main>")),
                ComponentInstance::new(slow).into(),
            ])
        })
        .with_page("/broken", |_| {
            let broken = component_fn("Broken", |_| Err(anyhow!("no data")));
            ComponentInstance::new(broken).into()
        })
        .with_page("/cart", |_| {
            let cart = component_fn("Cart", |cx| {
                let items = cx.props().get("items").and_then(|v| v.as_u64()).unwrap_or(0);
                Ok(Renderable::text(format!("{items} items")))
            });
            let island = ServerIsland::new(
                ComponentInstance::new(cart)
                    .with_prop("items", 3)
                    .with_slot("fallback", || Renderable::text("...")),
            );
            Renderable::fragment([Renderable::html(mark_html("<aside>")), island.into()])
        })
}

type Worker = (
    UnboundedSender<RenderCommand>,
    Receiver<RenderEvent>,
    std::thread::JoinHandle<()>,
);

fn start() -> Worker {
    start_with(RenderConfig::default())
}

fn start_with(config: RenderConfig) -> Worker {
    let (cmd_tx, cmd_rx) = unbounded_channel();
    let (evt_tx, evt_rx) = mpsc::channel();
    let worker = start_render_runtime(cmd_rx, evt_tx, config, routes);
    (cmd_tx, evt_rx, worker)
}

fn render_page(cmd_tx: &UnboundedSender<RenderCommand>, request_id: RequestId, route: &str) {
    cmd_tx
        .send(RenderCommand::RenderPage {
            request_id,
            route: route.to_string(),
            request: RequestMeta::default().with_param("name", "ada"),
        })
        .unwrap();
}

/// Events of `request_id` up to and including its terminal event.
fn events_for(evt_rx: &Receiver<RenderEvent>, request_id: RequestId) -> Vec<RenderEvent> {
    let mut events = Vec::new();
    loop {
        let event = evt_rx
            .recv_timeout(TIMEOUT)
            .unwrap_or_else(|err| panic!("no event for request {request_id}: {err}"));
        if event.request_id() != request_id {
            continue;
        }
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            return events;
        }
    }
}

fn body(events: &[RenderEvent]) -> String {
    let mut out = Vec::new();
    for event in events {
        if let RenderEvent::Chunk { bytes, .. } = event {
            out.extend_from_slice(bytes);
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[test]
fn renders_a_page_as_ordered_chunks() {
    let (cmd_tx, evt_rx, worker) = start();
    render_page(&cmd_tx, 1, "/");
    let events = events_for(&evt_rx, 1);

    assert!(matches!(events.first(), Some(RenderEvent::Started { route, .. }) if route == "/"));
    assert_eq!(body(&events), "<h1>hi ada</h1><p>late</p>");
    match events.last() {
        Some(RenderEvent::Done { bytes, islands, .. }) => {
            assert_eq!(*bytes, 26);
            assert!(islands.is_empty());
        }
        other => panic!("expected Done, got {other:?}"),
    }

    drop(cmd_tx);
    worker.join().unwrap();
}

#[test]
fn unknown_routes_are_not_found() {
    let (cmd_tx, evt_rx, worker) = start();
    render_page(&cmd_tx, 2, "/missing");
    let events = events_for(&evt_rx, 2);
    assert!(matches!(events.as_slice(), [RenderEvent::NotFound { route, .. }] if route == "/missing"));
    drop(cmd_tx);
    worker.join().unwrap();
}

#[test]
fn synchronous_failures_are_reported_without_output() {
    let (cmd_tx, evt_rx, worker) = start();
    render_page(&cmd_tx, 3, "/broken");
    let events = events_for(&evt_rx, 3);
    match events.as_slice() {
        [RenderEvent::Failed { error, bytes, .. }] => {
            assert_eq!(*bytes, 0);
            assert!(error.contains("`Broken`"), "{error}");
            assert!(error.contains("no data"), "{error}");
        }
        other => panic!("expected a single Failed event, got {other:?}"),
    }
    drop(cmd_tx);
    worker.join().unwrap();
}

#[test]
fn cancel_stops_a_waiting_render() {
    let (cmd_tx, evt_rx, worker) = start();
    render_page(&cmd_tx, 4, "/slow");

    // Wait for the shell to go out before cancelling.
    loop {
        match evt_rx.recv_timeout(TIMEOUT) {
            Ok(RenderEvent::Chunk { request_id: 4, .. }) => break,
            Ok(_) => continue,
            Err(err) => panic!("render never produced output: {err}"),
        }
    }
    cmd_tx
        .send(RenderCommand::Cancel {
            request_id: 4,
            reason: "client disconnected".into(),
        })
        .unwrap();

    let events = events_for(&evt_rx, 4);
    match events.last() {
        Some(RenderEvent::Cancelled { reason, bytes, .. }) => {
            assert_eq!(reason, "client disconnected");
            assert_eq!(*bytes, 6);
        }
        other => panic!("expected Cancelled, got {other:?}"),
    }
    drop(cmd_tx);
    worker.join().unwrap();
}

#[test]
fn shutdown_cancels_renders_in_progress() {
    let (cmd_tx, evt_rx, worker) = start();
    render_page(&cmd_tx, 5, "/slow");
    drop(cmd_tx);

    let events = events_for(&evt_rx, 5);
    assert!(
        matches!(events.last(), Some(RenderEvent::Cancelled { .. })),
        "{events:?}"
    );
    worker.join().unwrap();
}

#[test]
fn server_islands_are_served_after_their_page() {
    let (cmd_tx, evt_rx, worker) = start();
    render_page(&cmd_tx, 6, "/cart");
    let events = events_for(&evt_rx, 6);
    let page = body(&events);
    assert!(page.starts_with("<aside><script>"), "{page}");
    assert!(page.contains("..."), "{page}");
    assert!(!page.contains("3 items"), "{page}");
    let islands = match events.last() {
        Some(RenderEvent::Done { islands, .. }) => islands.clone(),
        other => panic!("expected Done, got {other:?}"),
    };
    assert_eq!(islands, [IslandId(0)]);

    let island_request = |request_id| RenderCommand::RenderIsland {
        request_id,
        page_request_id: 6,
        island: IslandId(0),
        request: RequestMeta::default(),
    };
    cmd_tx.send(island_request(7)).unwrap();
    let events = events_for(&evt_rx, 7);
    assert!(
        matches!(events.first(), Some(RenderEvent::Started { route, .. }) if route == "/_server-islands/Cart")
    );
    assert_eq!(body(&events), "3 items");

    // Each recorded island is served once.
    cmd_tx.send(island_request(8)).unwrap();
    let events = events_for(&evt_rx, 8);
    assert!(matches!(events.as_slice(), [RenderEvent::NotFound { .. }]));

    drop(cmd_tx);
    worker.join().unwrap();
}

#[test]
fn unfetched_islands_of_old_pages_are_forgotten() {
    let (cmd_tx, evt_rx, worker) = start_with(RenderConfig {
        retained_island_pages: 2,
        ..RenderConfig::default()
    });
    for page in 10..13 {
        render_page(&cmd_tx, page, "/cart");
        let events = events_for(&evt_rx, page);
        assert!(matches!(events.last(), Some(RenderEvent::Done { .. })), "{events:?}");
    }

    let island_request = |request_id, page_request_id| RenderCommand::RenderIsland {
        request_id,
        page_request_id,
        island: IslandId(0),
        request: RequestMeta::default(),
    };
    cmd_tx.send(island_request(20, 10)).unwrap();
    let events = events_for(&evt_rx, 20);
    assert!(matches!(events.as_slice(), [RenderEvent::NotFound { .. }]), "{events:?}");

    for (request_id, page) in [(21, 11), (22, 12)] {
        cmd_tx.send(island_request(request_id, page)).unwrap();
        let events = events_for(&evt_rx, request_id);
        assert_eq!(body(&events), "3 items");
    }

    drop(cmd_tx);
    worker.join().unwrap();
}
