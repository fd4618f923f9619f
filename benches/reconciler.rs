//! Benchmarks for lbwatch components.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use lbwatch::health::{classify, fleet_summary};
use lbwatch::live::decode_event;
use lbwatch::model::{Address, BackendPool, Service};
use lbwatch::state::ServiceStore;

fn create_service(index: usize, pools: usize, addresses: usize) -> Service {
    let pools = (0..pools)
        .map(|p| {
            let addresses = (0..addresses)
                .map(|a| {
                    let state = if (index + p + a) % 7 == 0 { "Failed" } else { "Succeeded" };
                    Address::new(state)
                })
                .collect();
            BackendPool::new(format!("pool{}", p), addresses)
        })
        .collect();
    Service::new("rg-bench", format!("lb{}", index)).with_pools(pools)
}

fn create_fleet(size: usize) -> Vec<Service> {
    (0..size).map(|i| create_service(i, 2, 8)).collect()
}

fn benchmark_classify(c: &mut Criterion) {
    let service = create_service(3, 4, 16);

    c.bench_function("classify_service", |b| {
        b.iter(|| {
            black_box(classify(black_box(&service)));
        })
    });
}

fn benchmark_fleet_summary(c: &mut Criterion) {
    let fleet = create_fleet(500);

    let mut group = c.benchmark_group("fleet_summary");
    group.throughput(Throughput::Elements(fleet.len() as u64));

    group.bench_function("500_services", |b| {
        b.iter(|| {
            black_box(fleet_summary(black_box(&fleet)));
        })
    });

    group.finish();
}

fn benchmark_store(c: &mut Criterion) {
    let store = ServiceStore::new();
    store.load_snapshot(create_fleet(500));

    let mut group = c.benchmark_group("store");
    group.throughput(Throughput::Elements(1));

    let existing = create_service(250, 2, 8);
    group.bench_function("apply_update_replace", |b| {
        b.iter(|| {
            black_box(store.apply_update(existing.clone()));
        })
    });

    group.bench_function("snapshot_view", |b| {
        b.iter(|| {
            black_box(store.snapshot_view());
        })
    });

    let fleet = create_fleet(500);
    group.bench_function("load_snapshot_500", |b| {
        b.iter(|| {
            store.load_snapshot(black_box(fleet.clone()));
        })
    });

    group.finish();
}

fn benchmark_decode(c: &mut Criterion) {
    let frame = serde_json::json!({
        "type": "HEALTH_UPDATE",
        "data": create_service(1, 2, 8),
    })
    .to_string();

    c.bench_function("decode_health_update", |b| {
        b.iter(|| {
            black_box(decode_event(black_box(&frame)).ok());
        })
    });
}

criterion_group!(
    benches,
    benchmark_classify,
    benchmark_fleet_summary,
    benchmark_store,
    benchmark_decode,
);

criterion_main!(benches);
