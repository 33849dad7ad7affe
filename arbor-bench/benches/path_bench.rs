//! Path resolution benchmarks.

use arbor_core::Chart;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};

/// A complete tree with `width` children per compound state.
fn wide_def(width: usize, depth: usize) -> Value {
    fn level(name: String, width: usize, depth: usize) -> Value {
        if depth == 0 {
            return Value::String(name);
        }
        let states: Vec<Value> = (0..width)
            .map(|i| level(format!("n{depth}_{i}"), width, depth - 1))
            .collect();
        json!({"name": name, "states": states})
    }
    let states: Vec<Value> = (0..width)
        .map(|i| level(format!("top_{i}"), width, depth))
        .collect();
    json!({"states": states})
}

fn bench_get_state(c: &mut Criterion) {
    let mut group = c.benchmark_group("path_get_state");

    for width in [2, 4, 8] {
        let chart = Chart::<()>::from_json(&wide_def(width, 3)).unwrap();
        let deepest = chart.nodes().last().unwrap().id();
        let path = chart.path_of(deepest);
        let name = chart.node(deepest).name().to_string();

        group.bench_with_input(BenchmarkId::new("dotted", width), &path, |b, path| {
            b.iter(|| black_box(chart.get_state(path).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("bare_name", width), &name, |b, name| {
            b.iter(|| black_box(chart.get_state(name).unwrap()))
        });
    }

    group.finish();
}

fn bench_relpath(c: &mut Criterion) {
    let mut group = c.benchmark_group("path_relpath");

    for width in [2, 4, 8] {
        let chart = Chart::<()>::from_json(&wide_def(width, 3)).unwrap();
        let first = chart.nodes().nth(4).unwrap().id();
        let last = chart.nodes().last().unwrap().id();

        group.bench_with_input(BenchmarkId::new("compute", width), &width, |b, _| {
            b.iter(|| black_box(chart.relpath(last, first).unwrap()))
        });

        let relpath = chart.relpath(last, first).unwrap();
        group.bench_with_input(BenchmarkId::new("walk", width), &width, |b, _| {
            b.iter(|| black_box(chart.walk(first, &relpath).unwrap()))
        });

        let text = relpath.to_string();
        group.bench_with_input(BenchmarkId::new("resolve", width), &text, |b, text| {
            b.iter(|| black_box(chart.resolve(text, first).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_get_state, bench_relpath);
criterion_main!(benches);
