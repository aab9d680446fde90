use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use kinbus::{impl_message, pubsub::Mailbox, Bus, ChannelId, Envelope, MessageKind};
use tokio::runtime::Runtime;

#[derive(Debug)]
struct Sample(u64);
impl_message!(Sample, 1);

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Публикация в N подписчиков с последующим разбором их ящиков.
fn bench_publish_fan_out(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("publish_fan_out");

    for subscribers in [1usize, 4, 16] {
        let (bus, endpoints) = rt.block_on(async {
            let bus = Bus::new();
            let mut endpoints = Vec::new();
            for _ in 0..subscribers {
                let ep = bus.new_endpoint(64).await.unwrap();
                ep.subscribe(MessageKind::new(1), |s: &Sample| {
                    black_box(s.0);
                })
                .await
                .unwrap();
                endpoints.push(ep);
            }
            (bus, endpoints)
        });

        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, _| {
                b.to_async(&rt).iter(|| async {
                    bus.publish(Sample(1)).await.unwrap();
                    for ep in &endpoints {
                        ep.try_dispatch().await;
                    }
                })
            },
        );
    }
    group.finish();
}

fn bench_try_publish_no_subscribers(c: &mut Criterion) {
    let rt = runtime();
    let bus = rt.block_on(async { Bus::new() });

    c.bench_function("try_publish_no_subscribers", |b| {
        b.to_async(&rt).iter(|| async {
            let _ = black_box(bus.try_publish(Sample(0)).await);
        })
    });
}

fn bench_mailbox_push_pop(c: &mut Criterion) {
    let rt = runtime();
    let mailbox = Mailbox::new(ChannelId::new(1), 128);
    let envelope = Envelope::new(Sample(7));

    c.bench_function("mailbox_push_pop", |b| {
        b.to_async(&rt).iter(|| async {
            mailbox.push(envelope.clone()).await.unwrap();
            black_box(mailbox.pop().await);
        })
    });
}

fn bench_register_unregister(c: &mut Criterion) {
    let rt = runtime();
    let (bus, endpoint) = rt.block_on(async {
        let bus = Bus::new();
        let ep = bus.new_endpoint(1).await.unwrap();
        (bus, ep)
    });
    let kind = MessageKind::new(42);

    c.bench_function("register_unregister_interest", |b| {
        b.to_async(&rt).iter(|| async {
            bus.register_interest(kind, &endpoint).await.unwrap();
            bus.unregister_interest(kind, &endpoint).await.unwrap();
        })
    });
}

criterion_group!(
    benches,
    bench_publish_fan_out,
    bench_try_publish_no_subscribers,
    bench_mailbox_push_pop,
    bench_register_unregister
);
criterion_main!(benches);
