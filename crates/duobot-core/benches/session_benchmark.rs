//! Session Management Benchmarks
//!
//! Measures performance of session operations including:
//! - Turn appends with window trimming
//! - Session lookup
//! - Idle sweeps

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use duobot_core::session::{Clock, ManualClock, Role, SessionStore, SessionSweeper};

fn store_with_clock(window: usize) -> (Arc<SessionStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(SessionStore::with_options(window, clock.clone() as Arc<dyn Clock>));
    (store, clock)
}

/// Benchmark appends to a single session
fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_turn");

    for window in [4usize, 20, 100] {
        group.bench_with_input(BenchmarkId::new("full_window", window), &window, |b, &window| {
            let (store, _clock) = store_with_clock(window);
            for i in 0..window {
                store.append_turn("user", Role::Participant, format!("message {}", i)).unwrap();
            }

            b.iter(|| {
                store
                    .append_turn(black_box("user"), Role::Participant, "Hello, world!")
                    .unwrap()
            })
        });
    }

    group.finish();
}

/// Benchmark session lookup
fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");

    let (store, _clock) = store_with_clock(20);
    for i in 0..1000 {
        store.append_turn(&format!("user-{}", i), Role::Participant, "hi").unwrap();
    }

    group.bench_function("get_or_create_existing", |b| {
        b.iter(|| store.get_or_create(black_box("user-500")))
    });

    group.bench_function("window_existing", |b| {
        b.iter(|| store.window(black_box("user-500")))
    });

    group.finish();
}

/// Benchmark sweeps over stores of different sizes, half of them idle
fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep");

    for size in [100usize, 1000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("half_idle", size), &size, |b, &size| {
            b.iter_with_setup(
                || {
                    let (store, clock) = store_with_clock(20);
                    for i in 0..size / 2 {
                        store.append_turn(&format!("old-{}", i), Role::Participant, "hi").unwrap();
                    }
                    clock.advance(Duration::from_secs(120));
                    for i in 0..size / 2 {
                        store.append_turn(&format!("new-{}", i), Role::Participant, "hi").unwrap();
                    }
                    SessionSweeper::with_settings(store, Duration::from_secs(60), Duration::from_secs(10))
                },
                |sweeper| black_box(sweeper.sweep()),
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_append, bench_lookup, bench_sweep);
criterion_main!(benches);
