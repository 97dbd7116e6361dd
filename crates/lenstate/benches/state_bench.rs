//! Benchmarks for tracing and state propagation.
//!
//! Hot paths:
//! - tracing a one-element change in a large array,
//! - a lens write fanning out across many sibling lenses.
//!
//! Run with: cargo bench -p lenstate --bench state_bench

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use lenstate::stream::{Message, Source, sink};
use lenstate::{Change, Key, Trace, Traceable, Value, post_trace, state, trace};

fn numbers(len: usize) -> Value {
    Value::array((0..len).map(Value::from))
}

// =============================================================================
// Tracer
// =============================================================================

fn bench_trace(c: &mut Criterion) {
    let mut group = c.benchmark_group("trace/array");

    for len in [100_usize, 1_000, 10_000] {
        let before = numbers(len);
        let mut after = before.clone();
        after.set_child(&Key::index(len / 2), Some(Value::from(-1)));

        group.bench_with_input(BenchmarkId::new("one_changed", len), &len, |b, _| {
            b.iter(|| black_box(trace(Some(black_box(&before)), Some(black_box(&after)))))
        });

        group.bench_with_input(BenchmarkId::new("identical", len), &len, |b, _| {
            b.iter(|| black_box(trace(Some(black_box(&before)), Some(black_box(&before)))))
        });

        group.bench_with_input(BenchmarkId::new("post_trace", len), &len, |b, _| {
            b.iter(|| {
                let change = Change::new(
                    Some(after.clone()),
                    Some(Trace::leaf(Some(before.clone()), Some(after.clone()))),
                );
                black_box(post_trace(change))
            })
        });
    }

    group.finish();
}

// =============================================================================
// Lens fan-out
// =============================================================================

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("state/fan_out");

    for len in [100_usize, 1_000] {
        let root = state(numbers(len));
        let lenses: Vec<_> = (0..len).map(|i| root.sub(i)).collect();
        for lens in &lenses {
            lens.open(sink(|m: Message<Option<Value>>| {
                black_box(m);
            }));
        }

        let target = &lenses[len / 2];
        let mut n = 0_i32;
        group.bench_with_input(BenchmarkId::new("lens_write", len), &len, |b, _| {
            b.iter(|| {
                n += 1;
                target.set(Value::from(n));
            })
        });

        group.bench_with_input(BenchmarkId::new("root_write", len), &len, |b, _| {
            b.iter(|| {
                n += 1;
                let mut next = root.get().unwrap_or_default();
                next.set_child(&Key::index(0), Some(Value::from(n)));
                root.set(next);
            })
        });

        root.clear();
    }

    group.finish();
}

criterion_group!(benches, bench_trace, bench_fan_out);
criterion_main!(benches);
