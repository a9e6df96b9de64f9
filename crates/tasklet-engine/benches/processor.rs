//! Processor benchmarks
//!
//! Measures the driving loop on synthetic coroutines:
//! - Intake of submission batches
//! - Compute-only bursts (Continue until finished)
//! - Suspension staging and bulk handoff to a worker

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use parking_lot::Mutex;
use std::sync::Arc;
use tasklet_engine::{Coroutine, Decision, IoWait, Processor, ReadyFlag, TaskQueue, Worker, WorkerKind};

struct Countdown(u32);

impl Coroutine for Countdown {
    fn step(&mut self) -> Decision {
        self.0 -= 1;
        Decision::Continue
    }

    fn finished(&self) -> bool {
        self.0 == 0
    }
}

/// Suspends on I/O once, then finishes
struct SuspendOnce {
    wait: Option<IoWait>,
}

impl Coroutine for SuspendOnce {
    fn step(&mut self) -> Decision {
        match self.wait.take() {
            Some(wait) => Decision::SuspendOnIo(wait),
            None => Decision::Continue,
        }
    }

    fn finished(&self) -> bool {
        self.wait.is_none()
    }
}

/// Keeps whatever it is handed
#[derive(Default)]
struct Sink {
    held: Mutex<TaskQueue>,
}

impl Worker for Sink {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Io
    }

    fn push_tasks(&self, tasks: &mut TaskQueue) {
        self.held.lock().append(tasks);
    }
}

// =============================================================================
// INTAKE
// =============================================================================

fn bench_intake(c: &mut Criterion) {
    let mut group = c.benchmark_group("processor/intake");

    for count in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let processor = Processor::new();
                    for _ in 0..count {
                        processor.submit(|| Countdown(1));
                    }
                    processor
                },
                |mut processor| {
                    black_box(processor.iterate(0).ok());
                    processor
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

// =============================================================================
// COMPUTE BURSTS
// =============================================================================

fn bench_compute(c: &mut Criterion) {
    let mut group = c.benchmark_group("processor/compute");

    for steps in [1u32, 10, 100] {
        let tasks = 100u64;
        group.throughput(Throughput::Elements(tasks * u64::from(steps)));
        group.bench_with_input(BenchmarkId::new("steps", steps), &steps, |b, &steps| {
            b.iter_batched(
                || {
                    let processor = Processor::new();
                    for _ in 0..tasks {
                        processor.submit(move || Countdown(steps));
                    }
                    processor
                },
                |mut processor| {
                    while let Ok(true) = processor.iterate(100) {}
                    processor
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

// =============================================================================
// SUSPENSION
// =============================================================================

fn bench_suspend(c: &mut Criterion) {
    let mut group = c.benchmark_group("processor/suspend");
    let flag = ReadyFlag::new();

    for workers in [1usize, 4] {
        group.bench_with_input(BenchmarkId::new("workers", workers), &workers, |b, &workers| {
            b.iter_batched(
                || {
                    let mut processor = Processor::new();
                    let sinks: Vec<Arc<Sink>> = (0..workers).map(|_| Arc::new(Sink::default())).collect();
                    for sink in &sinks {
                        processor.register_worker(sink.clone());
                    }
                    for _ in 0..1000 {
                        let wait = IoWait::read(flag.clone());
                        processor.submit(move || SuspendOnce { wait: Some(wait) });
                    }
                    (processor, sinks)
                },
                |(mut processor, sinks)| {
                    black_box(processor.iterate(200).ok());
                    (processor, sinks)
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_intake, bench_compute, bench_suspend);
criterion_main!(benches);
