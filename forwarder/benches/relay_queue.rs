//! Relay queue benchmarks
//!
//! Measures offer/take cost of the relay queue, including the drop path when
//! the queue is full.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use system_metrics_forwarder::mapper::Mapper;
use system_metrics_forwarder::proto::definitions::{event, heartbeat, Event, Heartbeat};
use system_metrics_forwarder::proto::loggregator_v2::Envelope;
use system_metrics_forwarder::relay::RelayQueue;

fn make_envelope() -> Envelope {
    let event = Event {
        id: "bench".to_string(),
        timestamp: 1499293724,
        deployment: "loggregator".to_string(),
        message: Some(event::Message::Heartbeat(Heartbeat {
            job: "consul".to_string(),
            instance_id: "6f60a3ce-9e4d-477f-ba45-7d29bcfab5b9".to_string(),
            metrics: vec![heartbeat::Metric {
                name: "system.healthy".to_string(),
                value: 1.0,
                ..Default::default()
            }],
            ..Default::default()
        })),
    };
    match Mapper::new().map(&event) {
        Ok(envelope) => envelope,
        Err(_) => Envelope::default(),
    }
}

fn bench_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("relay_push");

    for count in [10, 100, 1000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_function(format!("push_{count}"), |b| {
            let envelope = make_envelope();
            b.iter_batched(
                || RelayQueue::new(count),
                |queue| {
                    for _ in 0..count {
                        let _ = queue.try_push(envelope.clone());
                    }
                    queue
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_push_full(c: &mut Criterion) {
    let mut group = c.benchmark_group("relay_push_full");
    group.throughput(Throughput::Elements(1));

    group.bench_function("drop_newest", |b| {
        let queue = RelayQueue::new(1);
        let _ = queue.try_push(make_envelope());
        let envelope = make_envelope();
        b.iter(|| queue.try_push(envelope.clone()).is_err())
    });

    group.finish();
}

fn bench_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("relay_push_pop");
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(_) => return,
    };

    for count in [100, 1000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_function(format!("roundtrip_{count}"), |b| {
            let envelope = make_envelope();
            b.to_async(&runtime).iter(|| {
                let envelope = envelope.clone();
                async move {
                    let queue = RelayQueue::new(count);
                    for _ in 0..count {
                        let _ = queue.try_push(envelope.clone());
                    }
                    queue.close();
                    let mut taken = 0;
                    while queue.pop().await.is_some() {
                        taken += 1;
                    }
                    taken
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_push, bench_push_full, bench_push_pop);
criterion_main!(benches);
