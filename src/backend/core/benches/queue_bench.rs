//! Benchmarks for the priority queue and scheduler admission path.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;
use trackq_core::jobs::{
    JobContext, JobError, JobId, JobPriority, JobRecord, JobSpec, PriorityQueue, Scheduler,
    SchedulerConfig,
};

fn noop_spec(id: String) -> JobSpec {
    JobSpec::new(id, |_ctx: JobContext| async { Ok::<_, JobError>(serde_json::Value::Null) })
}

fn record(i: usize) -> JobRecord {
    let priority = JobPriority::clamped((i % 3) as i64, 3);
    JobRecord::new(noop_spec(format!("job-{i}")), priority, Duration::from_secs(60), i as u64)
}

fn filled_queue(n: usize) -> PriorityQueue {
    let mut queue = PriorityQueue::new();
    for i in 0..n { queue.enqueue(record(i)); }
    queue
}

fn bench_enqueue(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_enqueue");
    for size in [100, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &n| {
            b.iter(|| black_box(filled_queue(n)));
        });
    }
    group.finish();
}

fn bench_dequeue(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_dequeue_up_to");
    for size in [100, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &n| {
            b.iter_batched(
                || filled_queue(n),
                |mut queue| { while !queue.is_empty() { black_box(queue.dequeue_up_to(8)); } },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_lookup");
    for size in [100, 1_000, 10_000] {
        let queue = filled_queue(size);
        let last = JobId::new(format!("job-{}", size - 1));
        group.bench_with_input(BenchmarkId::new("position_of", size), &size, |b, _| {
            b.iter(|| black_box(queue.position_of(&last)));
        });
        group.bench_with_input(BenchmarkId::new("counts_by_priority", size), &size, |b, _| {
            b.iter(|| black_box(queue.counts_by_priority()));
        });
    }
    group.finish();
}

fn bench_scheduler_submit(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("scheduler_submit");
    group.sample_size(20);
    for size in [100, 1_000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &n| {
            b.to_async(&runtime).iter(|| async move {
                let scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
                scheduler.pause();
                for i in 0..n { scheduler.submit(noop_spec(format!("job-{i}"))).unwrap(); }
                black_box(scheduler.clear(false))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_enqueue, bench_dequeue, bench_lookup, bench_scheduler_submit);
criterion_main!(benches);
