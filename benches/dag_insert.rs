//! request dag insert benches
#[macro_use]
extern crate criterion;

use criterion::Criterion;
use layerbuild::dag::RequestDag;
use layerbuild::vfs::Request;

fn build_request_set(size: usize, seed: usize) -> std::collections::BTreeSet<Request> {
    (0..size).map(|i| Request::Path(format!("/webapp/resource-{}.js", (i + seed) % (size * 2)))).collect()
}

fn insert_growing_overlapping_sets(c: &mut Criterion) {
    let mut group = c.benchmark_group("dag insert");
    group.bench_function("1000 overlapping nodes", |b| {
        b.iter(|| {
            let mut dag = RequestDag::new();
            for seed in 0..1000 {
                let requests = build_request_set(20, seed);
                dag.add_request_set(requests, serde_json::Value::Null);
            }
        });
    });

    group.bench_function("find_exact_match on a populated dag", |b| {
        let mut dag = RequestDag::new();
        let mut last = build_request_set(20, 0);
        for seed in 0..1000 {
            last = build_request_set(20, seed);
            dag.add_request_set(last.clone(), serde_json::Value::Null);
        }
        b.iter(|| dag.find_exact_match(&last));
    });
}

criterion_group!(benches, insert_growing_overlapping_sets);
criterion_main!(benches);
