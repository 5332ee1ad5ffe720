//! # Swarm Bus Benchmarks
//!
//! | Path | What is measured |
//! |------|------------------|
//! | `publish` | Synchronous fan-out to N handlers |
//! | `publish_async` | Enqueue cost on the publisher's thread |
//! | `round_trip` | Enqueue until the dispatch thread has delivered |
//! | `subscribe` | Subscribe + unsubscribe on a busy topic |

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use swarm_bus::{BusConfig, MessageBus};

const PAYLOAD: &str = "{\"seq\":1,\"module\":\"bench\"}";

fn started_bus() -> MessageBus {
    let bus = MessageBus::with_config(BusConfig::with_poll_interval(Duration::from_millis(1)));
    bus.start();
    bus
}

fn counting_handlers(bus: &MessageBus, topic: &str, count: usize) -> Arc<AtomicU64> {
    let hits = Arc::new(AtomicU64::new(0));
    for _ in 0..count {
        let hits = Arc::clone(&hits);
        bus.subscribe(topic, move |_, payload| {
            hits.fetch_add(payload.len() as u64, Ordering::Relaxed);
        });
    }
    hits
}

// ============================================================================
// SYNCHRONOUS FAN-OUT
// ============================================================================

fn bench_publish_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("swarm-bus-publish");

    for subscribers in [1usize, 8, 64] {
        let bus = started_bus();
        counting_handlers(&bus, "bench.topic", subscribers);

        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_with_input(
            BenchmarkId::new("publish", subscribers),
            &subscribers,
            |b, _| b.iter(|| black_box(bus.publish("bench.topic", PAYLOAD))),
        );
    }

    group.finish();
}

// ============================================================================
// ASYNCHRONOUS DELIVERY
// ============================================================================

fn bench_publish_async(c: &mut Criterion) {
    let mut group = c.benchmark_group("swarm-bus-async");
    group.measurement_time(Duration::from_secs(5));

    let bus = started_bus();
    counting_handlers(&bus, "bench.async", 4);
    group.bench_function("publish_async_enqueue", |b| {
        b.iter(|| bus.publish_async(black_box("bench.async"), black_box(PAYLOAD)))
    });

    for batch in [10u64, 100] {
        let bus = started_bus();
        counting_handlers(&bus, "bench.round_trip", 1);

        group.throughput(Throughput::Elements(batch));
        group.bench_with_input(BenchmarkId::new("round_trip", batch), &batch, |b, &batch| {
            b.iter(|| {
                let target = bus.message_count() + batch;
                for _ in 0..batch {
                    bus.publish_async("bench.round_trip", PAYLOAD);
                }
                while bus.message_count() < target {
                    std::thread::yield_now();
                }
            })
        });
    }

    group.finish();
}

// ============================================================================
// SUBSCRIPTION CHURN
// ============================================================================

fn bench_subscribe_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("swarm-bus-subscribe");

    let bus = MessageBus::new();
    counting_handlers(&bus, "bench.busy", 256);
    group.bench_function("subscribe_unsubscribe", |b| {
        b.iter(|| {
            let id = bus.subscribe("bench.busy", |_, _| {});
            black_box(bus.unsubscribe(id))
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_publish_fan_out,
    bench_publish_async,
    bench_subscribe_churn
);
criterion_main!(benches);
