use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hfvtx::{
    NoopSink, SyntheticConfig, SyntheticEvents, ThreadPolicy, Vertexer, VertexerConfig,
};

const N_EVENTS: usize = 64;

fn vertexer_benchmark(c: &mut Criterion) {
    let events = SyntheticEvents::new(SyntheticConfig {
        n_events: N_EVENTS,
        ..Default::default()
    })
    .unwrap()
    .generate();
    let mut group = c.benchmark_group("vertexer");
    group.throughput(Throughput::Elements(N_EVENTS as u64));
    for thread_policy in [ThreadPolicy::Single, ThreadPolicy::GlobalPool] {
        let vertexer = Vertexer::new(VertexerConfig {
            thread_policy,
            ..Default::default()
        })
        .unwrap();
        group.bench_with_input(
            BenchmarkId::new("process_events", thread_policy),
            &vertexer,
            |b, vertexer| b.iter(|| black_box(vertexer.process_events(&events, &NoopSink))),
        );
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(10));
    targets = vertexer_benchmark
}
criterion_main!(benches);
