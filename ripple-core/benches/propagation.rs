//! Benchmark: flush cost for chains, fan-out and diamonds

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ripple_core::reactive::{configure, run_until_idle, Effect, Memo, Signal};
use ripple_core::{Propagation, RuntimeConfig};

/// A leaf followed by `depth` memos, each adding one to the previous.
fn build_chain(depth: usize) -> (Signal<u64>, Memo<u64>) {
    let source = Signal::new(0_u64).unwrap();
    let reader = source.clone();
    let mut tail = Memo::new(move || reader.get()).unwrap();
    for _ in 0..depth {
        let prev = tail.clone();
        tail = Memo::new(move || prev.get() + 1).unwrap();
    }
    (source, tail)
}

/// A leaf read by `width` effects.
fn build_fan_out(width: usize) -> (Signal<u64>, Vec<Effect>) {
    let source = Signal::new(0_u64).unwrap();
    let effects = (0..width)
        .map(|_| {
            let reader = source.clone();
            Effect::new(move || {
                black_box(reader.get());
            })
            .unwrap()
        })
        .collect();
    (source, effects)
}

/// `layers` stacked diamonds: each layer reads the previous one twice.
fn build_diamonds(layers: usize) -> (Signal<u64>, Memo<u64>) {
    let source = Signal::new(0_u64).unwrap();
    let reader = source.clone();
    let mut bottom = Memo::new(move || reader.get()).unwrap();
    for _ in 0..layers {
        let (l, r) = (bottom.clone(), bottom.clone());
        let left = Memo::new(move || l.get() + 1).unwrap();
        let right = Memo::new(move || r.get() + 2).unwrap();
        bottom = Memo::new(move || left.get() + right.get()).unwrap();
    }
    (source, bottom)
}

fn benchmark_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain");
    for depth in [10, 100, 1000] {
        let (source, tail) = build_chain(depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| {
                source.update(|v| v + 1);
                run_until_idle();
                black_box(tail.get_untracked())
            });
        });
        tail.detach();
    }
    group.finish();
}

fn benchmark_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    for width in [10, 100, 1000] {
        let (source, effects) = build_fan_out(width);
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| {
                source.update(|v| v + 1);
                run_until_idle()
            });
        });
        for effect in &effects {
            effect.detach();
        }
    }
    group.finish();
}

fn benchmark_diamonds(c: &mut Criterion) {
    let mut group = c.benchmark_group("diamonds");
    for (name, propagation) in [
        ("lifo", Propagation::Lifo),
        ("deduplicated", Propagation::Deduplicated),
    ] {
        configure(RuntimeConfig {
            propagation,
            ..RuntimeConfig::default()
        })
        .unwrap();

        // LIFO work doubles per layer, so keep the stack shallow.
        let (source, bottom) = build_diamonds(8);
        group.bench_function(name, |b| {
            b.iter(|| {
                source.update(|v| v + 1);
                run_until_idle();
                black_box(bottom.get_untracked())
            });
        });
    }
    configure(RuntimeConfig::default()).unwrap();
    group.finish();
}

criterion_group!(benches, benchmark_chain, benchmark_fan_out, benchmark_diamonds);
criterion_main!(benches);
