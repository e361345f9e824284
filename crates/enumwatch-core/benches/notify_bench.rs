//! Benchmarks for change-cycle delivery cost.
//!
//! Run with: cargo bench -p enumwatch-core -- notify

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::rc::Rc;

use enumwatch_core::{
    ChangeNotifier, MutationDescriptor, ObservableVec, PropertyKey, PropertyTable, observer_fn,
};

#[derive(Debug)]
struct Subject;

// ---------------------------------------------------------------------------
// 1. begin/end with an empty registry vs N observers
// ---------------------------------------------------------------------------

fn bench_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("notify/cycle");

    for count in [0u64, 1, 16, 256] {
        group.throughput(Throughput::Elements(count.max(1)));

        let notifier: ChangeNotifier<Subject, u32> = ChangeNotifier::new();
        let observers: Vec<_> = (0..count)
            .map(|_| {
                Rc::new(observer_fn(
                    |_: &Subject, _: &MutationDescriptor<u32>| Ok(()),
                    |_: &Subject, _: &MutationDescriptor<u32>| Ok(()),
                ))
            })
            .collect();
        for obs in &observers {
            notifier.add_observer(obs);
        }

        group.bench_with_input(BenchmarkId::new("counts", count), &(), |b, _| {
            b.iter(|| {
                let _ = notifier.begin(&Subject, MutationDescriptor::<u32>::counts(0, 1));
                let _ = notifier.end(&Subject, MutationDescriptor::<u32>::counts(0, 1));
                black_box(notifier.is_pending())
            })
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// 2. Property invalidation through the bridge
// ---------------------------------------------------------------------------

fn bench_invalidation(c: &mut Criterion) {
    let mut group = c.benchmark_group("notify/invalidation");

    let props = PropertyTable::new();
    let notifier: ChangeNotifier<Subject, u32> =
        ChangeNotifier::new().with_invalidator(Rc::new(props.clone()));

    group.bench_function("unspecified", |b| {
        b.iter(|| {
            let _ = notifier.announce(&Subject, ());
            black_box(props.is_dirty(PropertyKey::Length))
        })
    });
    group.bench_function("same_length", |b| {
        b.iter(|| {
            let _ = notifier.announce(&Subject, MutationDescriptor::<u32>::counts(1, 1));
            black_box(props.is_dirty(PropertyKey::Contents))
        })
    });
    group.finish();
}

// ---------------------------------------------------------------------------
// 3. Container mutation end to end
// ---------------------------------------------------------------------------

fn bench_vec_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("notify/vec_push");

    for batch in [16u64, 1_024] {
        group.throughput(Throughput::Elements(batch));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            b.iter(|| {
                let vec: ObservableVec<u64> = ObservableVec::new();
                for i in 0..batch {
                    let _ = vec.push(i);
                }
                black_box(vec.into_vec())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_cycle, bench_invalidation, bench_vec_push);
criterion_main!(benches);
