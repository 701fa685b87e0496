//! Benchmarks for the run-loop scheduler.
//!
//! Benchmarks cover:
//! - Queue push/flush and coalescing
//! - Sorted timer insertion
//! - End-to-end turns across several queues

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::seq::SliceRandom;
use std::hint::black_box;
use std::rc::Rc;

use prometheus_runloop::core::{FlushContext, Method, Queue, QueueHooks, Scheduler};
use prometheus_runloop::platform::ManualPlatform;
use serde_json::{json, Value};

// ============================================================================
// Helper Functions
// ============================================================================

fn scheduler() -> (Scheduler, Rc<ManualPlatform>) {
    let platform = Rc::new(ManualPlatform::new());
    let scheduler = Scheduler::builder(["sync", "actions", "render"])
        .platform(platform.clone())
        .build()
        .expect("valid scheduler");
    (scheduler, platform)
}

fn noop() -> Method {
    Method::new(|args| Ok(black_box(args.first().cloned().unwrap_or(Value::Null))))
}

// ============================================================================
// Queue Benchmarks
// ============================================================================

fn bench_queue_push_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_push_flush");

    for size in [100u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let method = noop();
            b.iter(|| {
                let q = Queue::new("actions", QueueHooks::default());
                for i in 0..size {
                    q.push(None, method.clone(), vec![json!(i)], None);
                }
                black_box(q.flush(true, FlushContext::default()).expect("flush"));
            });
        });
    }
    group.finish();
}

fn bench_queue_push_unique(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_push_unique");

    for distinct in [10usize, 100, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(distinct), &distinct, |b, &distinct| {
            let methods: Vec<Method> = (0..distinct).map(|_| noop()).collect();
            b.iter(|| {
                let q = Queue::new("actions", QueueHooks::default());
                for round in 0..10 {
                    for m in &methods {
                        q.push_unique(None, m.clone(), vec![json!(round)], None);
                    }
                }
                black_box(q.pending_len());
            });
        });
    }
    group.finish();
}

// ============================================================================
// Timer Benchmarks
// ============================================================================

fn bench_later_insertion(c: &mut Criterion) {
    let mut group = c.benchmark_group("later_insertion");

    for size in [100u64, 1_000, 5_000] {
        let mut waits: Vec<u64> = (0..size).collect();
        waits.shuffle(&mut rand::rng());
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &waits, |b, waits| {
            let method = noop();
            b.iter(|| {
                let (bb, platform) = scheduler();
                for wait in waits {
                    bb.later(&method, vec![], *wait).expect("later");
                }
                platform.advance(size).expect("advance");
            });
        });
    }
    group.finish();
}

// ============================================================================
// End-to-End Scenario
// ============================================================================

fn bench_end_to_end_turn(c: &mut Criterion) {
    let mut group = c.benchmark_group("end_to_end_turn");
    let (bb, _platform) = scheduler();
    let render = noop();
    let sync = noop();
    let inner = bb.clone();
    let action = Method::new(move |args| {
        inner.schedule_once("render", &render, args.to_vec())?;
        inner.schedule("sync", &sync, vec![])?;
        Ok(Value::Null)
    });

    group.bench_function("run_100_actions", |b| {
        b.iter(|| {
            let outer = bb.clone();
            let action = action.clone();
            bb.run(
                Method::new(move |_| {
                    for i in 0..100 {
                        outer.schedule("actions", &action, vec![json!(i)])?;
                    }
                    Ok(Value::Null)
                }),
                vec![],
            )
            .expect("turn");
        });
    });
    group.finish();
}

criterion_group!(queue_benches, bench_queue_push_flush, bench_queue_push_unique);
criterion_group!(timer_benches, bench_later_insertion);
criterion_group!(scenario_benches, bench_end_to_end_turn);
criterion_main!(queue_benches, timer_benches, scenario_benches);
