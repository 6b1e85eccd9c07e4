#[path = "common/mod.rs"]
mod support;

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use anyhow::anyhow;
use futures::StreamExt;
use html::mark_html;
use html_test_support::collect_chunks;
use render::{
    ComponentInstance, FnComponent, NodePool, RenderConfig, RenderError, RenderInstruction,
    RenderStream, Renderable, RequestMeta, ResultContext, SERVER_ISLAND_MARKER, ServerIsland,
    component_fn, render_to_string,
};
use tokio::time::Instant;

fn list_with_delays(delays: &[(&'static str, u64)]) -> Renderable {
    let mut children = vec![Renderable::html(mark_html("<ul>"))];
    for &(label, ms) in delays {
        let item = match label {
            "A" => "<li>A</li>",
            "B" => "<li>B</li>",
            _ => "<li>C</li>",
        };
        children.push(support::delayed(label, ms, item));
    }
    children.push(Renderable::html(mark_html("</ul>")));
    Renderable::fragment(children)
}

fn pending_forever(name: &str, dropped: Rc<Cell<bool>>) -> Renderable {
    struct DropFlag(Rc<Cell<bool>>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.set(true);
        }
    }

    let component = component_fn(name, move |_| {
        let flag = DropFlag(dropped.clone());
        Ok(Renderable::deferred(async move {
            let _flag = flag;
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Renderable::text("never"))
        }))
    });
    ComponentInstance::new(component).into()
}

#[tokio::test(start_paused = true)]
async fn siblings_run_concurrently_but_emit_in_tree_order() {
    let start = Instant::now();
    let root = list_with_delays(&[("A", 30), ("B", 10), ("C", 20)]);
    let collected = support::render(root, RenderConfig::default()).await;

    assert!(collected.error.is_none(), "{:?}", collected.error);
    assert_eq!(
        support::text_chunks(&collected),
        ["<ul>", "<li>A</li><li>B</li><li>C</li></ul>"]
    );
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(30), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(60), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn buffered_output_is_flushed_before_waiting() {
    let start = Instant::now();
    let mut stream = support::stream(list_with_delays(&[("A", 50)]), RenderConfig::default());

    let first = stream.next().await;
    let first = first.map(|chunk| chunk.map(|bytes| bytes.to_vec()));
    assert!(
        matches!(&first, Some(Ok(bytes)) if bytes.as_slice() == b"<ul>"),
        "{first:?}"
    );
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(stream.bytes_emitted(), 4);
    assert_eq!(stream.pending_branches(), 1);

    let rest = collect_chunks(stream).await;
    assert_eq!(rest.text(), "<li>A</li></ul>");
}

#[tokio::test(start_paused = true)]
async fn nested_pending_components_splice_in_place() {
    let outer = component_fn("Outer", |_| {
        Ok(Renderable::deferred(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(Renderable::fragment([
                Renderable::html(mark_html("<div>")),
                support::delayed("Inner", 5, "<i>in</i>"),
                Renderable::html(mark_html("</div>")),
            ]))
        }))
    });
    let root = Renderable::fragment([
        Renderable::text("before "),
        ComponentInstance::new(outer).into(),
        Renderable::text(" after"),
    ]);

    let collected = support::render(root, RenderConfig::default()).await;
    assert!(collected.error.is_none(), "{:?}", collected.error);
    assert_eq!(collected.text(), "before <div><i>in</i></div> after");
}

#[tokio::test(start_paused = true)]
async fn greeting_renders_end_to_end() {
    let root = Renderable::fragment([
        Renderable::text("Hello "),
        support::greeting("<World>"),
        Renderable::text("!"),
    ]);
    let html = render_to_string(root, support::result(), RenderConfig::default()).await;
    let html = html.unwrap_or_else(|err| panic!("render failed: {err}"));
    assert_eq!(html, "Hello <b>&lt;World&gt;</b>!");
}

#[tokio::test(start_paused = true)]
async fn unused_slots_are_never_evaluated() {
    let used = Rc::new(Cell::new(0));
    let unused = Rc::new(Cell::new(0));
    let card = component_fn("Card", |cx| {
        Ok(Renderable::fragment([
            Renderable::html(mark_html("<div>")),
            cx.slot("header"),
            Renderable::html(mark_html("</div>")),
        ]))
    });
    let instance = {
        let used = used.clone();
        let unused = unused.clone();
        ComponentInstance::new(card)
            .with_slot("header", move || {
                used.set(used.get() + 1);
                Renderable::text("title")
            })
            .with_slot("footer", move || {
                unused.set(unused.get() + 1);
                Renderable::text("never")
            })
    };

    let collected = support::render(instance, RenderConfig::default()).await;
    assert_eq!(collected.text(), "<div>title</div>");
    assert_eq!(used.get(), 1);
    assert_eq!(unused.get(), 0);
}

#[tokio::test(start_paused = true)]
async fn a_shared_pool_gets_every_node_back() {
    let pool = NodePool::new(256).with_stats().into_shared();
    let config = RenderConfig::default();

    for round in 0..20u64 {
        let root = Renderable::fragment([
            Renderable::text(format!("round {round}")),
            list_with_delays(&[("A", 3), ("B", 1)]),
            support::immediate("Footer", "<footer></footer>"),
        ]);
        let stream = RenderStream::with_shared(
            root,
            support::result(),
            config.clone(),
            Some(pool.clone()),
            None,
        );
        let stream = stream.unwrap_or_else(|err| panic!("render failed to start: {err}"));
        let collected = collect_chunks(stream).await;
        assert!(collected.error.is_none(), "{:?}", collected.error);
        assert_eq!(pool.borrow().outstanding(), 0, "round {round}");
    }

    let stats = pool.borrow().stats();
    assert!(stats.acquire_from_pool > 0);
    assert!(stats.hit_rate() > 0.5, "{stats:?}");
    assert_eq!(stats.released, stats.acquire_from_pool + stats.acquire_new);
}

#[tokio::test(start_paused = true)]
async fn cancelled_and_failed_renders_do_not_leak_nodes() {
    let pool = NodePool::new(64).into_shared();

    let dropped = Rc::new(Cell::new(false));
    let root = Renderable::fragment([
        Renderable::text("a"),
        pending_forever("Slow", dropped.clone()),
        Renderable::text("b"),
    ]);
    let mut stream = RenderStream::with_shared(
        root,
        support::result(),
        RenderConfig::default(),
        Some(pool.clone()),
        None,
    )
    .unwrap_or_else(|err| panic!("render failed to start: {err}"));
    assert!(stream.next().await.is_some());
    stream.cancel("test");
    assert!(stream.next().await.is_none());
    assert_eq!(pool.borrow().outstanding(), 0);
    assert!(dropped.get());
    drop(stream);

    let broken = component_fn("Broken", |_| {
        Ok(Renderable::deferred(async {
            tokio::time::sleep(Duration::from_millis(2)).await;
            Err(anyhow!("lost connection"))
        }))
    });
    let root = Renderable::fragment([
        Renderable::text("x"),
        ComponentInstance::new(broken).into(),
        Renderable::text("y"),
    ]);
    let stream = RenderStream::with_shared(
        root,
        support::result(),
        RenderConfig::default(),
        Some(pool.clone()),
        None,
    )
    .unwrap_or_else(|err| panic!("render failed to start: {err}"));
    let collected = collect_chunks(stream).await;
    assert!(collected.error.is_some());
    assert_eq!(pool.borrow().outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_between_pulls_ends_the_stream() {
    let root = Renderable::fragment((0..10).map(|i| Renderable::text(i.to_string())));
    let mut stream = support::stream(root, support::config(1));

    let mut seen = Vec::new();
    for _ in 0..3 {
        match stream.next().await {
            Some(Ok(chunk)) => seen.push(String::from_utf8_lossy(&chunk).into_owned()),
            other => panic!("expected a chunk, got {other:?}"),
        }
    }
    stream.cancel("client disconnected");
    assert!(stream.next().await.is_none());
    assert!(stream.next().await.is_none());
    assert_eq!(seen, ["0", "1", "2"]);
    assert_eq!(stream.bytes_emitted(), 3);
}

#[tokio::test(start_paused = true)]
async fn cancel_wakes_a_waiting_stream_and_drops_pending_work() {
    let start = Instant::now();
    let dropped = Rc::new(Cell::new(false));
    let root = Renderable::fragment([
        Renderable::html(mark_html("<p>")),
        pending_forever("Forever", dropped.clone()),
        Renderable::html(mark_html("</p>")),
    ]);
    let stream = support::stream(root, RenderConfig::default());
    let handle = stream.cancel_handle();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel("deadline exceeded");
    });

    let collected = collect_chunks(stream).await;
    assert!(collected.error.is_none(), "cancellation is not an error");
    assert_eq!(support::text_chunks(&collected), ["<p>"]);
    assert!(dropped.get(), "pending computation outlived the stream");
    assert!(start.elapsed() < Duration::from_secs(1));
    canceller
        .await
        .unwrap_or_else(|err| panic!("canceller panicked: {err}"));
}

#[tokio::test(start_paused = true)]
async fn the_first_cancel_reason_wins() {
    let stream = support::stream(Renderable::text("x"), RenderConfig::default());
    let handle = stream.cancel_handle();
    handle.cancel("first");
    stream.cancel("second");
    assert!(stream.is_cancelled());
    assert_eq!(handle.reason(), Some("first"));
    assert!(collect_chunks(stream).await.chunks.is_empty());
}

#[tokio::test(start_paused = true)]
async fn a_late_failure_follows_the_partial_output() {
    let fails = component_fn("Reviews", |_| {
        Ok(Renderable::deferred(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Err(anyhow!("reviews service unavailable"))
        }))
    });
    let root = Renderable::fragment([
        Renderable::html(mark_html("<article>")),
        ComponentInstance::new(fails).into(),
        Renderable::html(mark_html("</article>")),
    ]);

    let collected = support::render(root, RenderConfig::default()).await;
    assert_eq!(support::text_chunks(&collected), ["<article>"]);
    assert_eq!(collected.after_error, 0);
    let err = collected
        .error
        .unwrap_or_else(|| panic!("expected the render to fail"));
    assert_eq!(err.display_name(), Some("Reviews"));
    let message = err.to_string();
    assert!(message.contains("`Reviews`"), "{message}");
    assert!(message.contains("reviews service unavailable"), "{message}");
}

#[tokio::test(start_paused = true)]
async fn an_early_failure_waits_for_earlier_siblings() {
    let start = Instant::now();
    let fails = component_fn("Fails", |_| {
        Ok(Renderable::deferred(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Err(anyhow!("boom"))
        }))
    });
    let root = Renderable::fragment([
        support::delayed("A", 30, "<li>A</li>"),
        ComponentInstance::new(fails).into(),
        Renderable::html(mark_html("<li>never</li>")),
    ]);

    let collected = support::render(root, RenderConfig::default()).await;
    assert_eq!(support::text_chunks(&collected), ["<li>A</li>"]);
    assert!(start.elapsed() >= Duration::from_millis(30));
    let err = collected
        .error
        .unwrap_or_else(|| panic!("expected the render to fail"));
    assert_eq!(err.to_string(), "component `Fails` failed to render: boom");
}

#[tokio::test(start_paused = true)]
async fn a_failed_branch_releases_its_nodes() {
    let pool = NodePool::new(64).into_shared();
    let fails_inside = component_fn("Wrapper", |_| {
        Ok(Renderable::deferred(async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            let broken = FnComponent::new("Inner", |_| Err(anyhow!("bad props")));
            Ok(Renderable::fragment([
                Renderable::text("inside"),
                ComponentInstance::new(Rc::new(broken)).into(),
            ]))
        }))
    });
    let root = Renderable::fragment([
        support::delayed("Slow", 10, "<p>slow</p>"),
        ComponentInstance::new(fails_inside).into(),
    ]);
    let stream = RenderStream::with_shared(
        root,
        support::result(),
        RenderConfig::default(),
        Some(pool.clone()),
        None,
    )
    .unwrap_or_else(|err| panic!("render failed to start: {err}"));

    let collected = collect_chunks(stream).await;
    assert_eq!(collected.text(), "<p>slow</p>");
    let err = collected
        .error
        .unwrap_or_else(|| panic!("expected the render to fail"));
    assert_eq!(err.display_name(), Some("Inner"));
    assert_eq!(pool.borrow().outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn synchronous_failures_surface_before_any_output() {
    let broken = FnComponent::new("Broken", |_| Err(anyhow!("boom"))).with_module_id("src/broken.astro");
    let root = Renderable::fragment([
        Renderable::text("never sent"),
        ComponentInstance::new(Rc::new(broken)).into(),
    ]);

    let err = RenderStream::new(root, support::result(), RenderConfig::default())
        .err()
        .unwrap_or_else(|| panic!("expected the render to fail"));
    assert!(matches!(err, RenderError::Component { .. }));
    assert_eq!(
        err.to_string(),
        "component `Broken` (src/broken.astro) failed to render: boom"
    );
}

#[tokio::test(start_paused = true)]
async fn server_islands_render_a_placeholder_then_their_own_response() {
    let cart = component_fn("Cart", |cx| {
        let user = cx.prop_str("user").unwrap_or("anonymous").to_owned();
        Ok(Renderable::deferred(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(Renderable::text(format!("cart for {user}")))
        }))
    });
    let island = ServerIsland::new(
        ComponentInstance::new(cart)
            .with_prop("user", "ada")
            .with_slot("fallback", || Renderable::html(mark_html("<span>loading</span>"))),
    );
    let root = Renderable::fragment([
        Renderable::html(mark_html("<nav>")),
        island.into(),
        Renderable::html(mark_html("</nav>")),
    ]);

    let result = support::result();
    let page = render_to_string(root, result.clone(), RenderConfig::default()).await;
    let page = page.unwrap_or_else(|err| panic!("render failed: {err}"));
    assert!(page.starts_with("<nav><script>"), "{page}");
    assert!(page.contains("replaceServerIsland"), "{page}");
    assert!(!page.contains("cart for"), "island content leaked: {page}");
    let marker = page.find(SERVER_ISLAND_MARKER).unwrap_or(usize::MAX);
    let fallback = page.find("<span>loading</span>").unwrap_or(0);
    let fetch = page.find("data-island-id=\"island-0\"").unwrap_or(0);
    assert!(marker < fallback && fallback < fetch, "{page}");
    assert!(page.contains("\"/_server-islands/Cart\""), "{page}");
    assert!(page.ends_with("</nav>"), "{page}");

    let mut islands = result.borrow_mut().take_islands();
    assert_eq!(islands.len(), 1);
    let record = islands.remove(0);
    assert_eq!(record.id.to_string(), "island-0");

    let stream = RenderStream::island(record, RequestMeta::default(), RenderConfig::default())
        .unwrap_or_else(|err| panic!("island failed to start: {err}"));
    assert!(stream.result().borrow().is_partial());
    let collected = collect_chunks(stream).await;
    assert!(collected.error.is_none(), "{:?}", collected.error);
    assert_eq!(collected.text(), "cart for ada");
}

#[tokio::test(start_paused = true)]
async fn islands_can_reuse_a_shared_pool() {
    let pool = NodePool::new(64).with_stats().into_shared();
    let badge = component_fn("Badge", |_| {
        Ok(Renderable::fragment([
            Renderable::html(mark_html("<em>")),
            Renderable::text("new"),
            Renderable::html(mark_html("</em>")),
        ]))
    });
    let root = Renderable::from(ServerIsland::new(ComponentInstance::new(badge)));
    let result = support::result();
    let page = RenderStream::with_shared(
        root,
        result.clone(),
        RenderConfig::default(),
        Some(pool.clone()),
        None,
    )
    .unwrap_or_else(|err| panic!("render failed to start: {err}"));
    assert!(collect_chunks(page).await.error.is_none());
    let before = pool.borrow().stats();

    let record = result.borrow_mut().take_islands().remove(0);
    let stream = RenderStream::island_with_shared(
        record,
        RequestMeta::default(),
        RenderConfig::default(),
        Some(pool.clone()),
        None,
    )
    .unwrap_or_else(|err| panic!("island failed to start: {err}"));
    assert!(stream.result().borrow().is_partial());
    let collected = collect_chunks(stream).await;
    assert_eq!(collected.text(), "<em>new</em>");

    let after = pool.borrow().stats();
    assert!(after.acquire_from_pool > before.acquire_from_pool, "{after:?}");
    assert_eq!(pool.borrow().outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn head_content_is_hoisted_and_flushed_once() {
    let styled = component_fn("Styled", |cx| {
        cx.add_style("<style>.card{}</style>");
        cx.add_style("<style>.card{}</style>");
        Ok(Renderable::html(mark_html("<div class=\"card\"></div>")))
    });
    let late = component_fn("Late", |_| {
        Ok(Renderable::deferred(async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            Ok(Renderable::Empty)
        }))
    });
    let root = Renderable::fragment([
        Renderable::html(mark_html("<html><head>")),
        RenderInstruction::Head.into(),
        Renderable::html(mark_html("</head><body>")),
        ComponentInstance::new(styled).into(),
        ComponentInstance::new(late).into(),
        RenderInstruction::MaybeHead.into(),
        Renderable::html(mark_html("</body></html>")),
    ]);

    let html = render_to_string(root, support::result(), RenderConfig::default()).await;
    let html = html.unwrap_or_else(|err| panic!("render failed: {err}"));
    assert_eq!(
        html,
        "<html><head><style>.card{}</style></head><body><div class=\"card\"></div></body></html>"
    );
}

#[tokio::test(start_paused = true)]
async fn partial_renders_skip_page_head() {
    let styled = component_fn("Styled", |cx| {
        cx.add_style("<style>p{}</style>");
        Ok(Renderable::text("fragment"))
    });
    let root = Renderable::fragment([
        Renderable::from(RenderInstruction::MaybeHead),
        ComponentInstance::new(styled).into(),
    ]);
    let result = ResultContext::new(RequestMeta::default().partial()).into_handle();
    let html = render_to_string(root, result, RenderConfig::default()).await;
    assert_eq!(html.ok().as_deref(), Some("fragment"));
}

#[tokio::test(start_paused = true)]
async fn hydration_runtime_is_emitted_once_per_request() {
    let counter = component_fn("Counter", |cx| {
        let content = Renderable::html(mark_html("<button>0</button>"));
        Ok(cx.hydrate("load", "/components/counter.js", content))
    });
    let root = Renderable::fragment([
        Renderable::from(ComponentInstance::new(counter.clone()).with_prop("start", 1)),
        ComponentInstance::new(counter).with_prop("start", 2).into(),
    ]);

    let html = render_to_string(root, support::result(), RenderConfig::default()).await;
    let html = html.unwrap_or_else(|err| panic!("render failed: {err}"));
    assert_eq!(html.matches("/_hydration/runtime.js").count(), 1, "{html}");
    assert_eq!(html.matches("/_hydration/load.js").count(), 1, "{html}");
    assert_eq!(html.matches("<ssr-island").count(), 2, "{html}");
    assert_eq!(html.matches("<button>0</button>").count(), 2, "{html}");
    assert!(html.contains("uid=\"0\""), "{html}");
    assert!(html.contains("uid=\"1\""), "{html}");
}

#[tokio::test(start_paused = true)]
async fn request_params_reach_components() {
    let page = component_fn("Post", |cx| {
        let slug = cx.param("slug").unwrap_or_default();
        Ok(Renderable::text(format!("post {slug}")))
    });
    let result = ResultContext::new(RequestMeta::default().with_param("slug", "hello-world"))
        .into_handle();
    let html = render_to_string(ComponentInstance::new(page), result, RenderConfig::default()).await;
    assert_eq!(html.ok().as_deref(), Some("post hello-world"));
}

#[tokio::test(start_paused = true)]
async fn write_to_copies_the_whole_render() {
    let root = Renderable::fragment([
        Renderable::text("a"),
        support::delayed("Mid", 5, "<hr>"),
        Renderable::text("b"),
    ]);
    let mut out = futures::io::Cursor::new(Vec::new());
    let written = support::stream(root, support::config(2))
        .write_to(&mut out)
        .await
        .unwrap_or_else(|err| panic!("write failed: {err}"));
    assert_eq!(written, 6);
    assert_eq!(out.into_inner(), b"a<hr>b");
}
