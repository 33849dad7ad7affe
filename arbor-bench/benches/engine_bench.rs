//! Chart and instance benchmarks.

use arbor_core::{Chart, Instance};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Value};

fn player_def() -> Value {
    json!({
        "name": "player",
        "initial": "stopped",
        "states": [
            {"name": "stopped", "transitions": [{"event": "play", "target": "active.playing"}]},
            {"name": "active", "states": [
                {"name": "playing", "transitions": [{"event": "pause", "target": "..paused"}]},
                {"name": "paused", "transitions": [{"event": "play", "target": "..playing"}]}
            ], "transitions": [{"event": "stop", "target": "stopped"}]}
        ]
    })
}

/// A chain of `depth` nested compound states, each with a sibling leaf.
fn deep_def(depth: usize) -> Value {
    let mut state = json!({"name": format!("s{depth}"), "states": ["x", "y"]});
    for i in (0..depth).rev() {
        state = json!({"name": format!("s{i}"), "states": [state, format!("leaf_{i}")]});
    }
    json!({
        "states": [state, "out"],
        "transitions": [{"event": "jump", "target": "out"}]
    })
}

fn bench_build_chart(c: &mut Criterion) {
    let mut group = c.benchmark_group("chart_build");

    let player = player_def();
    group.bench_function("player", |b| {
        b.iter(|| black_box(Chart::<()>::from_json(&player).unwrap()))
    });

    for depth in [4, 16, 64] {
        let def = deep_def(depth);
        group.bench_with_input(BenchmarkId::new("deep", depth), &def, |b, def| {
            b.iter(|| black_box(Chart::<()>::from_json(def).unwrap()))
        });
    }

    group.finish();
}

fn bench_construct_instance(c: &mut Criterion) {
    let mut group = c.benchmark_group("instance_construct");
    group.throughput(Throughput::Elements(1));

    let chart = Chart::<()>::from_json(&player_def()).unwrap();
    group.bench_function("player", |b| {
        b.iter(|| black_box(Instance::new(&chart, ()).unwrap()))
    });

    group.finish();
}

fn bench_fire_event(c: &mut Criterion) {
    let mut group = c.benchmark_group("instance_fire");
    group.throughput(Throughput::Elements(1));

    let chart = Chart::<()>::from_json(&player_def()).unwrap();
    group.bench_function("pause_play", |b| {
        let mut instance = Instance::new(&chart, ()).unwrap();
        instance.fire_event("play", &[]).unwrap();
        b.iter(|| {
            instance.fire_event("pause", &[]).unwrap();
            black_box(instance.fire_event("play", &[]).unwrap())
        });
    });

    for depth in [4, 16, 64] {
        let chart = Chart::<()>::from_json(&deep_def(depth)).unwrap();
        group.bench_with_input(BenchmarkId::new("deep_jump", depth), &chart, |b, chart| {
            b.iter(|| {
                let mut instance =
                    Instance::construct(chart, (), Some("x"), Default::default()).unwrap();
                black_box(instance.fire_event("jump", &[]).unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_build_chart,
    bench_construct_instance,
    bench_fire_event
);
criterion_main!(benches);
