//! Benchmarks for the fair quota allocator.

use criterion::{Criterion, criterion_group, criterion_main};
use matfed::{CapacityTable, allocate};
use std::hint::black_box;

fn flat_table(sources: usize, cap: usize) -> CapacityTable {
    let mut table = CapacityTable::new();
    for i in 0..sources {
        table.insert_flat(format!("src{i}"), cap + i % 7);
    }
    table
}

fn nested_table(sources: usize, subs: usize, cap: usize) -> CapacityTable {
    let mut table = CapacityTable::new();
    for i in 0..sources {
        for j in 0..subs {
            table.insert(format!("src{i}"), format!("sub{j}"), cap + (i + j) % 5);
        }
    }
    table
}

fn bench_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate");

    let small = flat_table(4, 10);
    group.bench_function("flat_4_sources", |b| {
        b.iter(|| allocate(black_box(&small), black_box(20)));
    });

    let wide = flat_table(64, 100);
    group.bench_function("flat_64_sources", |b| {
        b.iter(|| allocate(black_box(&wide), black_box(500)));
    });

    let nested = nested_table(8, 16, 50);
    group.bench_function("nested_8x16", |b| {
        b.iter(|| allocate(black_box(&nested), black_box(400)));
    });

    // Heavy water-filling: one source holds nearly all the capacity.
    let mut skewed = CapacityTable::new();
    skewed.insert_flat("big", 10_000);
    for i in 0..15 {
        skewed.insert_flat(format!("small{i}"), 2);
    }
    group.bench_function("skewed_water_fill", |b| {
        b.iter(|| allocate(black_box(&skewed), black_box(1_000)));
    });

    group.finish();
}

criterion_group!(benches, bench_allocate);
criterion_main!(benches);
