//! # Selector Benchmarks
//!
//! The selection and resolution hot path: one cursor advance per request, plus the
//! registry snapshot and URI rewrite around it.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use tokio::runtime::Runtime;

use service_dispatch::load_balancing::{InstanceSelector, RandomSelector, RoundRobinSelector};
use service_dispatch::{LogicalRequest, RequestResolver, ServiceInstance, StaticRegistry};

fn pool(size: usize) -> Vec<ServiceInstance> {
    (0..size)
        .map(|i| ServiceInstance::new("api", format!("10.0.{}.{}", i / 250, i % 250 + 1), 8080))
        .collect()
}

fn benchmark_selectors(c: &mut Criterion) {
    let mut group = c.benchmark_group("selector_choose");
    group.throughput(Throughput::Elements(1));

    for size in [1usize, 8, 64, 512] {
        let instances = pool(size);

        let round_robin = RoundRobinSelector::new();
        group.bench_with_input(BenchmarkId::new("round_robin", size), &instances, |b, instances| {
            b.iter(|| black_box(round_robin.choose("api", instances)))
        });

        let random = RandomSelector::new();
        group.bench_with_input(BenchmarkId::new("random", size), &instances, |b, instances| {
            b.iter(|| black_box(random.choose("api", instances)))
        });
    }

    group.finish();
}

fn benchmark_contended_round_robin(c: &mut Criterion) {
    let selector = Arc::new(RoundRobinSelector::new());
    let instances = Arc::new(pool(8));

    c.bench_function("round_robin_4_threads_x_1000", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let selector = Arc::clone(&selector);
                    let instances = Arc::clone(&instances);
                    std::thread::spawn(move || {
                        for _ in 0..1000 {
                            black_box(selector.choose("api", &instances));
                        }
                    })
                })
                .collect();
            for handle in handles {
                let _ = handle.join();
            }
        })
    });
}

fn benchmark_resolution(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let registry = StaticRegistry::new();
    registry.set_instances("api", pool(8));
    let resolver = RequestResolver::new(Arc::new(registry), Arc::new(RoundRobinSelector::new()));

    c.bench_function("resolve_logical_request", |b| {
        b.iter(|| {
            rt.block_on(async {
                let request = LogicalRequest::get("http://api/greetings?lang=en").unwrap();
                black_box(resolver.resolve(request).await.unwrap())
            })
        })
    });
}

criterion_group!(benches, benchmark_selectors, benchmark_contended_round_robin, benchmark_resolution);
criterion_main!(benches);
