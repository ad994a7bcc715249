//! Query and view benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tabula_bench::{columns, open_db, populate};
use tabula_core::{Case, Durability, Order};

const SIZES: [usize; 3] = [1_000, 10_000, 100_000];

/// Benchmark a range query producing a view.
fn bench_find_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_all_range");

    for rows in SIZES {
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, _| {
            let (_dir, db) = open_db(Durability::MemOnly);
            populate(&db, "bench", rows);
            let rt = db.begin_read().unwrap();
            let t = rt.get_table("bench").unwrap();
            b.iter(|| {
                let view = t
                    .where_()
                    .unwrap()
                    .between(columns::SCORE, 250, 750)
                    .unwrap()
                    .find_all()
                    .unwrap();
                black_box(view.size().unwrap());
            });
        });
    }
    group.finish();
}

/// Benchmark an OR group with a string predicate.
fn bench_compound(c: &mut Criterion) {
    let mut group = c.benchmark_group("compound_count");

    for rows in SIZES {
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, _| {
            let (_dir, db) = open_db(Durability::MemOnly);
            populate(&db, "bench", rows);
            let rt = db.begin_read().unwrap();
            let t = rt.get_table("bench").unwrap();
            b.iter(|| {
                let count = t
                    .where_()
                    .unwrap()
                    .group()
                    .unwrap()
                    .less_than(columns::SCORE, 100)
                    .unwrap()
                    .or()
                    .unwrap()
                    .greater_than(columns::RATIO, 0.9)
                    .unwrap()
                    .end_group()
                    .unwrap()
                    .ends_with(columns::NAME, "7", Case::Sensitive)
                    .unwrap()
                    .count()
                    .unwrap();
                black_box(count);
            });
        });
    }
    group.finish();
}

/// Benchmark sorting a table view.
fn bench_sorted_view(c: &mut Criterion) {
    let mut group = c.benchmark_group("sorted_view");

    for rows in SIZES {
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, _| {
            let (_dir, db) = open_db(Durability::MemOnly);
            populate(&db, "bench", rows);
            let rt = db.begin_read().unwrap();
            let t = rt.get_table("bench").unwrap();
            b.iter(|| {
                let view = t.get_sorted_view(columns::SCORE, Order::Descending).unwrap();
                black_box(view.get_long(columns::SCORE, 0).unwrap());
            });
        });
    }
    group.finish();
}

/// Benchmark aggregates over a view.
fn bench_aggregates(c: &mut Criterion) {
    c.bench_function("view_aggregates_10000", |b| {
        let (_dir, db) = open_db(Durability::MemOnly);
        populate(&db, "bench", 10_000);
        let rt = db.begin_read().unwrap();
        let view = rt
            .get_table("bench")
            .unwrap()
            .where_()
            .unwrap()
            .greater_than(columns::SCORE, 500)
            .unwrap()
            .find_all()
            .unwrap();
        b.iter(|| {
            black_box(view.sum_int(columns::SCORE).unwrap());
            black_box(view.average_double(columns::RATIO).unwrap());
            black_box(view.max_int(columns::SCORE).unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_find_all,
    bench_compound,
    bench_sorted_view,
    bench_aggregates,
);
criterion_main!(benches);
