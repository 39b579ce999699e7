//! Benchmarks for visible range computation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use seal_virtual_core::{
    compute_visible_range, find_index_at_offset, FnHeights, HeightCache, HeightIndex, HeightModel,
    MeasuredHeights,
};

const ITEMS: usize = 100_000;

fn variable(i: usize) -> f32 {
    [48.0, 80.0, 120.0, 64.0][i % 4]
}

fn bench_constant_height(c: &mut Criterion) {
    let model = HeightModel::fixed(80.0);
    let cache = HeightCache::new();
    let heights = MeasuredHeights::new(&model, &cache);

    c.bench_function("range_constant_100k", |b| {
        b.iter(|| compute_visible_range(black_box(4_000_000.0), 800.0, ITEMS, &heights, 5))
    });
}

fn bench_linear_scan(c: &mut Criterion) {
    let heights = FnHeights(variable);

    c.bench_function("range_linear_100k_mid", |b| {
        b.iter(|| compute_visible_range(black_box(3_500_000.0), 800.0, ITEMS, &heights, 5))
    });
}

fn bench_prefix_index(c: &mut Criterion) {
    let index = HeightIndex::build(ITEMS, &FnHeights(variable));

    c.bench_function("range_indexed_100k_mid", |b| {
        b.iter(|| compute_visible_range(black_box(3_500_000.0), 800.0, ITEMS, &index, 5))
    });
}

fn bench_index_update(c: &mut Criterion) {
    let mut index = HeightIndex::build(ITEMS, &FnHeights(variable));

    c.bench_function("index_set_100k", |b| {
        b.iter(|| index.set(black_box(ITEMS / 2), black_box(96.0)))
    });
}

fn bench_find_index(c: &mut Criterion) {
    let index = HeightIndex::build(ITEMS, &FnHeights(variable));

    c.bench_function("find_index_indexed_100k", |b| {
        b.iter(|| find_index_at_offset(black_box(5_000_000.0), ITEMS, &index))
    });
}

criterion_group!(
    benches,
    bench_constant_height,
    bench_linear_scan,
    bench_prefix_index,
    bench_index_update,
    bench_find_index,
);
criterion_main!(benches);
