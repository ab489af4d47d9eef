//! Dispatch and Poll Benchmarks
//!
//! Measures the hot paths of the server:
//! - Broadcast fan-out over a populated registry
//! - Late-joiner polls that materialize broadcast records
//! - Polls of already-served clients

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use bmsg_core::{ClientRegistry, Database, Dispatcher, MessageStore, ReceiptTracker};

struct Engine {
    registry: Arc<ClientRegistry>,
    store: Arc<MessageStore>,
    dispatcher: Dispatcher,
    tracker: ReceiptTracker,
}

fn engine() -> Engine {
    let db = Arc::new(Database::in_memory().unwrap());
    let registry = Arc::new(ClientRegistry::new(Arc::clone(&db)));
    let store = Arc::new(MessageStore::new(db, Arc::clone(&registry)));
    Engine {
        dispatcher: Dispatcher::new(Arc::clone(&registry), Arc::clone(&store)),
        tracker: ReceiptTracker::new(Arc::clone(&registry), Arc::clone(&store)),
        registry,
        store,
    }
}

/// Benchmark broadcast fan-out
fn bench_broadcast(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast");

    for clients in [10usize, 100, 1000] {
        let e = engine();
        for i in 0..clients {
            e.registry.register_or_touch(&format!("m-{}", i), None, None).unwrap();
        }

        group.bench_with_input(BenchmarkId::new("fan_out", clients), &clients, |b, _| {
            b.iter(|| e.dispatcher.broadcast("https://example.com/x", "hello").unwrap())
        });
    }

    group.finish();
}

/// Benchmark client polls
fn bench_poll(c: &mut Criterion) {
    let mut group = c.benchmark_group("poll");

    group.bench_function("late_joiner_50_broadcasts", |b| {
        b.iter_with_setup(
            || {
                let e = engine();
                for i in 0..50 {
                    e.dispatcher
                        .broadcast(&format!("https://example.com/{}", i), "hello")
                        .unwrap();
                }
                e
            },
            |e| black_box(e.tracker.on_poll("late", None, None).unwrap()),
        )
    });

    group.bench_function("idle_client", |b| {
        let e = engine();
        for i in 0..50 {
            e.dispatcher
                .broadcast(&format!("https://example.com/{}", i), "hello")
                .unwrap();
        }
        e.tracker.on_poll("m-1", None, None).unwrap();

        b.iter(|| e.tracker.on_poll(black_box("m-1"), None, None).unwrap())
    });

    group.bench_function("pending_for", |b| {
        let e = engine();
        e.dispatcher.broadcast("https://example.com/x", "hello").unwrap();

        b.iter(|| e.store.pending_for(black_box("m-1")).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_broadcast, bench_poll);
criterion_main!(benches);
