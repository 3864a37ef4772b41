use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lazyscope::api::*;
use std::time::Duration;

#[derive(Default)]
struct Payload {
    bytes: Vec<u8>,
}

fn benchmark_local_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_lookup");

    let scope = ScopeNode::builder()
        .detached()
        .seed(Payload { bytes: vec![0; 64] })
        .build()
        .unwrap();

    group.bench_function("get_local", |b| {
        b.iter(|| {
            let value = scope.get::<Payload>().unwrap();
            black_box(value.bytes.len())
        });
    });

    group.bench_function("find_local", |b| {
        b.iter(|| black_box(scope.find::<Payload>().unwrap()));
    });

    group.finish();
}

fn benchmark_chain_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_depth");
    group.measurement_time(Duration::from_secs(5));

    // Values live at the top; lookups start at the bottom
    for depth in [1usize, 4, 16, 64].iter() {
        let top = ScopeNode::builder()
            .detached()
            .seed(Payload::default())
            .build()
            .unwrap();
        let mut guards = vec![top.enter().unwrap()];
        for _ in 1..*depth {
            guards.push(ScopeNode::new().enter().unwrap());
        }
        let bottom = current_scope();

        group.bench_with_input(BenchmarkId::new("find_uncached", depth), &bottom, |b, node| {
            b.iter(|| black_box(node.find::<Payload>().unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("get_cached", depth), &bottom, |b, node| {
            b.iter(|| black_box(node.get::<Payload>().unwrap()));
        });

        while let Some(guard) = guards.pop() {
            guard.exit().unwrap();
        }
    }

    group.finish();
}

fn benchmark_activation(c: &mut Criterion) {
    let mut group = c.benchmark_group("activation");

    let scope = ScopeNode::new();
    group.bench_function("enter_exit", |b| {
        b.iter(|| {
            let guard = scope.enter().unwrap();
            guard.exit().unwrap();
        });
    });

    let template = ScopeNode::builder()
        .copy_as_template(true)
        .seed(Payload::default())
        .build()
        .unwrap();
    group.bench_function("enter_template_copy", |b| {
        b.iter(|| template.run(|node| black_box(node.id())).unwrap());
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_local_lookup,
    benchmark_chain_depth,
    benchmark_activation
);
criterion_main!(benches);
