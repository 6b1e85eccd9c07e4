use criterion::{Criterion, black_box, criterion_group, criterion_main};
use futures::executor::block_on;
use render::{
    ComponentInstance, NodePool, RenderConfig, RenderStream, Renderable, ResultContext, Template,
    component_fn, shared_html_cache,
};

const ROWS: usize = 2_000;

fn row_template(i: usize) -> Renderable {
    Template::new(
        ["<tr><td>", "</td><td>", "</td></tr>"],
        [Renderable::from(i), Renderable::text(format!("item <{i}> & co"))],
    )
    .into()
}

fn table() -> Renderable {
    let row = component_fn("Row", |cx| {
        let index = cx.props().get("index").and_then(|v| v.as_u64()).unwrap_or(0);
        Ok(row_template(index as usize))
    });
    let rows = (0..ROWS)
        .map(|i| Renderable::from(ComponentInstance::new(row.clone()).with_prop("index", i as u64)));
    Renderable::fragment(
        std::iter::once(Renderable::raw("<table>"))
            .chain(rows)
            .chain(std::iter::once(Renderable::raw("</table>"))),
    )
}

fn drain(stream: RenderStream) -> usize {
    block_on(stream.fold(0, |len, chunk| async move {
        len + chunk.map(|bytes| bytes.len()).unwrap_or(0)
    }))
}

fn bench_render_table_fresh(c: &mut Criterion) {
    let config = RenderConfig::default();
    c.bench_function("bench_render_table_fresh", |b| {
        b.iter(|| {
            let result = ResultContext::default().into_handle();
            let started = RenderStream::new(table(), result, config.clone());
            black_box(started.map(drain).unwrap_or(0));
        });
    });
}

fn bench_render_table_shared_pool(c: &mut Criterion) {
    let config = RenderConfig::default();
    let pool = NodePool::from_config(&config.pool).into_shared();
    let cache = shared_html_cache(&config.html_cache);
    c.bench_function("bench_render_table_shared_pool", |b| {
        b.iter(|| {
            let result = ResultContext::default().into_handle();
            let started = RenderStream::with_shared(
                table(),
                result,
                config.clone(),
                Some(pool.clone()),
                cache.clone(),
            );
            black_box(started.map(drain).unwrap_or(0));
        });
    });
}

fn bench_small_chunks(c: &mut Criterion) {
    let config = RenderConfig {
        chunk_size: 256,
        ..RenderConfig::default()
    };
    c.bench_function("bench_render_table_small_chunks", |b| {
        b.iter(|| {
            let result = ResultContext::default().into_handle();
            let started = RenderStream::new(table(), result, config.clone());
            black_box(started.map(drain).unwrap_or(0));
        });
    });
}

criterion_group!(
    benches,
    bench_render_table_fresh,
    bench_render_table_shared_pool,
    bench_small_chunks
);
criterion_main!(benches);
