//! Benchmarks for pipeline construction and derivation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dagrun::pipeline::Pipeline;
use dagrun::testing::fixtures::chain;
use std::collections::HashSet;

fn pipeline_benchmark(c: &mut Criterion) {
    let (desc, uuids) = chain(100);

    c.bench_function("build_chain_100", |b| {
        b.iter(|| black_box(Pipeline::build(&desc).unwrap()))
    });

    let pipeline = Pipeline::build(&desc).unwrap();
    let tail: HashSet<_> = uuids.iter().rev().take(1).copied().collect();

    c.bench_function("ancestors_of_chain_tail", |b| {
        b.iter(|| black_box(pipeline.ancestors_of(&tail, false)))
    });

    let half: HashSet<_> = uuids.iter().step_by(2).copied().collect();

    c.bench_function("induced_subgraph_half", |b| {
        b.iter(|| black_box(pipeline.induced_subgraph(&half)))
    });
}

criterion_group!(benches, pipeline_benchmark);
criterion_main!(benches);
