use std::sync::Arc;
use crossbeam::queue::SegQueue;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use splitqueue::SplitQueue;
use splitqueue_bench::{run_mpmc, BenchQueue, LockedQueue};

fn push_pop<Q: BenchQueue<u64>>(queue: &Q, size: u64) {
    for i in 0..size {
        queue.push(i);
    }
    for _ in 0..size {
        black_box(queue.pop());
    }
}

fn single_threaded_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("Push then pop, single-threaded");
    for &size in &[100u64, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("splitqueue", size), &size, |b, &size| {
            let queue = SplitQueue::new();
            b.iter(|| push_pop(&queue, size));
        });
        group.bench_with_input(BenchmarkId::new("SegQueue", size), &size, |b, &size| {
            let queue = SegQueue::new();
            b.iter(|| push_pop(&queue, size));
        });
        group.bench_with_input(BenchmarkId::new("Mutex<VecDeque>", size), &size, |b, &size| {
            let queue = LockedQueue::default();
            b.iter(|| push_pop(&queue, size));
        });
    }
    group.finish();
}

fn empty_pop_bench(c: &mut Criterion) {
    let queue = SplitQueue::<u64>::new();
    c.bench_function("splitqueue empty pop", |b| b.iter(||{
        _ = black_box(queue.pop());
    }));
}

fn mpmc_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("MPMC, 4 producers, 4 consumers");
    group.sample_size(10);
    const PER_PRODUCER: u64 = 2_500;
    group.bench_function("splitqueue", |b| b.iter(||{
        black_box(run_mpmc(Arc::new(SplitQueue::new()), 4, 4, PER_PRODUCER))
    }));
    group.bench_function("SegQueue", |b| b.iter(||{
        black_box(run_mpmc(Arc::new(SegQueue::new()), 4, 4, PER_PRODUCER))
    }));
    group.bench_function("Mutex<VecDeque>", |b| b.iter(||{
        black_box(run_mpmc(Arc::new(LockedQueue::default()), 4, 4, PER_PRODUCER))
    }));
    group.finish();
}

criterion_group!(benches, single_threaded_bench, empty_pop_bench, mpmc_bench);
criterion_main!(benches);
